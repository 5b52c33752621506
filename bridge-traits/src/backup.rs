//! Backup Acquisition and File Layout
//!
//! The backup engine contract plus the content-addressed layout used by
//! every component that reads files out of an acquired backup.
//!
//! ## Layout
//!
//! A backup directory does not mirror the device file system. Each file is
//! stored under the hex SHA-1 of `"<domain>-<relative_path>"`, in a
//! subdirectory named after the first two hex characters:
//!
//! ```text
//! <backup>/31/31bb7ba8914766d4ba40d6dfb6113c8b614be442
//! ```
//!
//! Consumers that know a file's domain and path derive its on-disk location
//! with [`backup_file_path`]; consumers with a precomputed hash constant use
//! [`path_for_hash`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

use crate::error::Result;

// ============================================================================
// File Layout
// ============================================================================

/// Hex SHA-1 hash naming the backup file for `(domain, relative_path)`
pub fn hashed_file_name(domain: &str, relative_path: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(domain.as_bytes());
    hasher.update(b"-");
    hasher.update(relative_path.as_bytes());
    hex::encode(hasher.finalize())
}

/// On-disk location of a backup file given its precomputed hash
///
/// The two-character subdirectory shards backups across 256 directories.
pub fn path_for_hash(backup_root: &Path, hash: &str) -> PathBuf {
    backup_root.join(&hash[..2]).join(hash)
}

/// On-disk location of the backup file for `(domain, relative_path)`
pub fn backup_file_path(backup_root: &Path, domain: &str, relative_path: &str) -> PathBuf {
    path_for_hash(backup_root, &hashed_file_name(domain, relative_path))
}

// ============================================================================
// Engine Contract
// ============================================================================

/// Input to one backup acquisition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupOptions {
    /// Unique identifier of the device to back up
    pub udid: String,
    /// Force a full backup even when an incremental one would do
    pub force_full: bool,
}

/// Events the engine reports while a backup is running.
///
/// Sent on the channel passed to [`BackupEngine::start_backup`]; the engine
/// must stop sending once `start_backup` returns.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum BackupEvent {
    /// Transfer progress as reported by the device protocol
    Progress {
        /// Engine-reported completion, 0-100
        percent: u8,
        /// Bytes copied so far, when the protocol reports them
        bytes_transferred: Option<u64>,
        /// Engine's own estimate of the total transfer, when known
        total_bytes: Option<u64>,
        /// Raw progress line from the underlying tool
        detail: Option<String>,
    },
    /// The backup is encrypted and the engine needs a password to continue
    PasswordRequired,
    /// The device is asking the user to confirm with their passcode
    WaitingForPasscode,
    /// The user entered the passcode; transfer resumes
    PasscodeEntered,
}

/// Result of one backup acquisition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupOutcome {
    pub success: bool,
    /// Directory holding the acquired backup, present on success
    pub backup_path: Option<PathBuf>,
    /// Whether the acquired backup is protected by a backup password
    pub is_encrypted: bool,
    pub error: Option<String>,
}

/// State of a previously acquired backup on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackupStatus {
    pub exists: bool,
    pub is_complete: bool,
    pub is_corrupted: bool,
    pub size_bytes: u64,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Backup engine trait
///
/// Drives the device backup protocol. Acquisition is long-running; progress
/// and interactive prompts are reported as [`BackupEvent`]s on the channel
/// supplied by the caller. Cancellation is cooperative: `cancel_backup`
/// requests that an in-flight `start_backup` stop as soon as the protocol
/// allows, after which `start_backup` returns an unsuccessful outcome.
#[async_trait]
pub trait BackupEngine: Send + Sync {
    /// Acquire a backup of the device named in `options`
    ///
    /// # Errors
    ///
    /// Returns an error only for failures to run at all; a backup that
    /// starts and then fails is reported through [`BackupOutcome`].
    async fn start_backup(
        &self,
        options: BackupOptions,
        events: mpsc::Sender<BackupEvent>,
    ) -> Result<BackupOutcome>;

    /// Inspect any existing backup for `udid` without touching the device
    async fn check_backup_status(&self, udid: &str) -> Result<BackupStatus>;

    /// Request cancellation of an in-flight `start_backup`
    async fn cancel_backup(&self) -> Result<()>;
}
