//! Disk Space Probing
//!
//! Free-space queries for the pre-backup disk check.

use async_trait::async_trait;
use std::path::Path;

use crate::error::Result;

/// Disk probe trait
///
/// Answers how many bytes are free on the volume that contains `path`.
/// The path itself does not have to exist yet; implementations should walk
/// up to the nearest existing ancestor when resolving the mount.
#[async_trait]
pub trait DiskProbe: Send + Sync {
    /// Bytes available on the volume containing `path`
    async fn available_space(&self, path: &Path) -> Result<u64>;
}
