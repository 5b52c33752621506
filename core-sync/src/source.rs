//! Where a sync run gets its backup from.

use crate::types::SyncOptions;
use std::path::PathBuf;

/// Backup source for one run: acquire a fresh backup from the device, or
/// reuse a completed one already on disk.
#[derive(Debug, Clone)]
pub enum BackupSource {
    /// Run the acquisition engine against a connected device.
    Fresh { options: SyncOptions },
    /// Parse an existing backup directory without touching the device.
    Existing {
        udid: String,
        path: PathBuf,
        password: Option<String>,
    },
}

impl BackupSource {
    pub fn udid(&self) -> &str {
        match self {
            BackupSource::Fresh { options } => &options.udid,
            BackupSource::Existing { udid, .. } => udid,
        }
    }

    pub fn password(&self) -> Option<&str> {
        match self {
            BackupSource::Fresh { options } => options.password.as_deref(),
            BackupSource::Existing { password, .. } => password.as_deref(),
        }
    }
}
