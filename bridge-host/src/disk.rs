//! Disk Probe Implementation using sysinfo

use async_trait::async_trait;
use bridge_traits::{
    disk::DiskProbe,
    error::{BridgeError, Result},
};
use std::path::{Path, PathBuf};
use sysinfo::Disks;
use tracing::debug;

/// sysinfo-based free-space probe
///
/// Resolves the volume containing a path by longest mount-point prefix over
/// the refreshed disk list. The refresh reads system tables, so it runs on
/// the blocking pool.
pub struct SysinfoDiskProbe;

impl SysinfoDiskProbe {
    pub fn new() -> Self {
        Self
    }

    /// Walk up to the nearest ancestor that exists on disk
    fn nearest_existing(path: &Path) -> PathBuf {
        let mut current = path;
        loop {
            if current.exists() {
                return current.to_path_buf();
            }
            match current.parent() {
                Some(parent) => current = parent,
                None => return PathBuf::from("/"),
            }
        }
    }

    fn best_match(disks: &Disks, target: &Path) -> Option<u64> {
        disks
            .list()
            .iter()
            .filter(|disk| target.starts_with(disk.mount_point()))
            .max_by_key(|disk| disk.mount_point().as_os_str().len())
            .map(|disk| disk.available_space())
    }
}

impl Default for SysinfoDiskProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DiskProbe for SysinfoDiskProbe {
    async fn available_space(&self, path: &Path) -> Result<u64> {
        let target = Self::nearest_existing(path);

        let resolved = tokio::task::spawn_blocking(move || {
            let target = target.canonicalize().unwrap_or(target);
            let disks = Disks::new_with_refreshed_list();
            (Self::best_match(&disks, &target), target)
        })
        .await
        .map_err(|e| BridgeError::OperationFailed(format!("Disk probe task failed: {e}")))?;

        let (space, target) = resolved;
        match space {
            Some(bytes) => {
                debug!(path = ?target, available = bytes, "Probed free disk space");
                Ok(bytes)
            }
            None => Err(BridgeError::OperationFailed(format!(
                "No mounted volume contains {}",
                target.display()
            ))),
        }
    }
}
