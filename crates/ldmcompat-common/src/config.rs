//! Configuration types for ldmcompat
//!
//! The command line front end reads an optional TOML file into [`Config`];
//! every field has a default so an empty file is valid.

use crate::error::{Error, Result};
use crate::types::DEFAULT_PARTITION_LIMIT;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root configuration for ldmcompat
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Device configuration
    #[serde(default)]
    pub device: DeviceConfig,
    /// Scan window configuration
    #[serde(default)]
    pub scan: ScanConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::configuration(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&text)
            .map_err(|e| Error::configuration(format!("{}: {}", path.display(), e)))
    }

    /// Parse configuration from TOML text
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::configuration(e.to_string()))
    }
}

/// Device selection
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Block device or image file to open read-only
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Limits handed to partition decoders
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Highest sector index (exclusive) a decoder may read; `None` means
    /// the whole device
    #[serde(default)]
    pub sector_limit: Option<u64>,
    /// Number of partition slots
    #[serde(default = "default_partition_limit")]
    pub partition_limit: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            sector_limit: None,
            partition_limit: default_partition_limit(),
        }
    }
}

fn default_partition_limit() -> usize {
    DEFAULT_PARTITION_LIMIT
}

/// Logging configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// tracing filter directive
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Verbose kernel log output (disables printk suppression)
    #[serde(default)]
    pub debug: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            debug: false,
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert!(config.device.path.is_none());
        assert_eq!(config.scan.sector_limit, None);
        assert_eq!(config.scan.partition_limit, DEFAULT_PARTITION_LIMIT);
        assert_eq!(config.logging.level, "warn");
        assert!(!config.logging.debug);
    }

    #[test]
    fn test_partial_config() {
        let config = Config::from_toml(
            r#"
            [device]
            path = "/dev/sdb"

            [scan]
            sector_limit = 2048

            [logging]
            debug = true
            "#,
        )
        .unwrap();
        assert_eq!(config.device.path, Some(PathBuf::from("/dev/sdb")));
        assert_eq!(config.scan.sector_limit, Some(2048));
        assert_eq!(config.scan.partition_limit, DEFAULT_PARTITION_LIMIT);
        assert!(config.logging.debug);
    }

    #[test]
    fn test_invalid_config() {
        let err = Config::from_toml("[scan]\nsector_limit = \"lots\"").unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[scan]\npartition_limit = 4").unwrap();
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.scan.partition_limit, 4);

        assert!(Config::load("/nonexistent/ldmcompat.toml").is_err());
    }
}
