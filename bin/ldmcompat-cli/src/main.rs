//! ldmcompat CLI - sector inspection
//!
//! Opens a device or image read-only, installs it as the process-wide
//! device and reads sectors through the same kernel-named entry points a
//! partition decoder uses.

mod dump;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use ldmcompat_common::Config;
use ldmcompat_kernel::{
    BlockDevice, ParsedPartitions, RawDevice, SectorSlot, install_device, mem_stats,
    put_dev_sector, read_part_sector, remove_device, set_debug,
};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "ldmcompat")]
#[command(about = "Read disk sectors through the kernel block I/O emulation layer")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, env = "LDMCOMPAT_CONFIG")]
    config: Option<PathBuf>,

    /// Print suppressed kernel log output and allocator statistics
    #[arg(short, long)]
    debug: bool,

    /// Print allocator statistics as JSON (statistics are printed even
    /// without --debug)
    #[arg(long)]
    json: bool,

    /// Log level (overrides the config file)
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

impl Args {
    /// Allocator statistics are printed with `--debug`, `--json` or
    /// `debug = true` in the config file
    fn show_stats(&self, config: &Config) -> bool {
        self.debug || self.json || config.logging.debug
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show device size
    Info {
        /// Device or image file
        device: Option<PathBuf>,
    },
    /// Hex dump sectors
    Dump {
        /// Device or image file
        device: Option<PathBuf>,
        /// First sector to read
        #[arg(short, long, default_value = "0")]
        sector: u64,
        /// Number of sectors to read
        #[arg(short = 'n', long, default_value = "1")]
        count: u64,
        /// Sectors at or past this index are not read
        #[arg(long)]
        scan_limit: Option<u64>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    let log_level = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    set_debug(args.debug || config.logging.debug);
    let show_stats = args.show_stats(&config);

    match args.command {
        Commands::Info { device } => {
            let path = resolve_device(device, &config)?;
            let dev = RawDevice::open(&path)?;
            println!("path:    {}", dev.path());
            println!("size:    {} bytes", dev.size());
            println!("sectors: {}", dev.sector_count());
        }
        Commands::Dump {
            device,
            sector,
            count,
            scan_limit,
        } => {
            let path = resolve_device(device, &config)?;
            let failed = dump_sectors(&path, &config, sector, count, scan_limit)?;
            if failed > 0 {
                warn!("{} sector(s) could not be read", failed);
            }
        }
    }

    if show_stats {
        let stats = mem_stats();
        if args.json {
            println!("{}", serde_json::to_string_pretty(&stats)?);
        } else {
            print!("{}", dump::format_stats(&stats));
        }
        if stats.has_leaks() {
            eprintln!("memory leak: {} block(s), {} bytes", stats.count, stats.size);
            std::process::exit(1);
        }
    }

    Ok(())
}

/// Device from the command line, falling back to the config file
fn resolve_device(arg: Option<PathBuf>, config: &Config) -> Result<PathBuf> {
    match arg.or_else(|| config.device.path.clone()) {
        Some(path) => Ok(path),
        None => bail!("no device given on the command line or in the config file"),
    }
}

/// Read and print `count` sectors starting at `first`, returning how many
/// failed
fn dump_sectors(
    path: &Path,
    config: &Config,
    first: u64,
    count: u64,
    scan_limit: Option<u64>,
) -> Result<u64> {
    let dev = RawDevice::open(path)?;
    let dev = install_device(dev).context("installing device")?;

    let scan_limit = scan_limit
        .or(config.scan.sector_limit)
        .unwrap_or_else(|| dev.sector_count());
    let name = path
        .file_name()
        .map_or_else(|| dev.path().to_string(), |n| n.to_string_lossy().into_owned());
    let state = ParsedPartitions::new(
        BlockDevice::new(name, 0),
        config.scan.partition_limit,
        scan_limit,
    );
    info!(
        device = dev.path(),
        first,
        count,
        scan_limit,
        "dumping sectors"
    );

    let mut slot: SectorSlot = None;
    let mut failed = 0;
    let end = first.saturating_add(count);
    for n in first..end {
        match read_part_sector(&state, n, &mut slot) {
            Some(data) => print!("{}", dump::format_sector(n, data)),
            None if n >= state.scan_limit() => {
                // Every later sector is outside the window too
                warn!(sector = n, limit = state.scan_limit(), "stopping at scan limit");
                failed += end - n;
                break;
            }
            None => {
                debug!(sector = n, "sector read failed");
                failed += 1;
            }
        }
        put_dev_sector(&mut slot);
    }

    remove_device();
    Ok(failed)
}
