//! The process-wide device handle
//!
//! Decoders never name the device they read from; every sector request goes
//! to the one device installed here.

use crate::raw_io::RawDevice;
use ldmcompat_common::{Error, Result};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::info;

static DEVICE: RwLock<Option<Arc<RawDevice>>> = parking_lot::const_rwlock(None);

/// Install `dev` as the process-wide device. Fails if one is installed.
pub fn install_device(dev: RawDevice) -> Result<Arc<RawDevice>> {
    let mut slot = DEVICE.write();
    if let Some(current) = slot.as_ref() {
        return Err(Error::storage(format!(
            "device already installed: {}",
            current.path()
        )));
    }
    info!(path = dev.path(), size = dev.size(), "installed device");
    let dev = Arc::new(dev);
    *slot = Some(Arc::clone(&dev));
    Ok(dev)
}

/// The installed device, if any
pub fn current_device() -> Option<Arc<RawDevice>> {
    DEVICE.read().clone()
}

/// The installed device, or [`Error::NoDevice`]
pub fn require_device() -> Result<Arc<RawDevice>> {
    current_device().ok_or(Error::NoDevice)
}

/// Uninstall the device, returning it
pub fn remove_device() -> Option<Arc<RawDevice>> {
    DEVICE.write().take()
}
