//! Backup Decryption
//!
//! Contract for the collaborator that turns an encrypted backup into a
//! readable one.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Result of one decryption run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecryptionOutcome {
    pub success: bool,
    /// Directory holding the decrypted copy; `None` when decryption happened
    /// in place
    pub decrypted_path: Option<PathBuf>,
    pub error: Option<String>,
}

/// Backup decryptor trait
///
/// Implementations may decrypt into a separate working directory; when they
/// do, the caller owns that directory's lifetime and must hand it back via
/// [`cleanup`](BackupDecryptor::cleanup) once parsing is done.
#[async_trait]
pub trait BackupDecryptor: Send + Sync {
    /// Decrypt the backup at `backup_path` with the supplied password
    ///
    /// A wrong password is not an `Err`; it is an unsuccessful
    /// [`DecryptionOutcome`] carrying the underlying message.
    async fn decrypt_backup(&self, backup_path: &Path, password: &str)
        -> Result<DecryptionOutcome>;

    /// Whether the backup at `backup_path` is password-protected
    async fn is_backup_encrypted(&self, backup_path: &Path) -> Result<bool>;

    /// Remove a decrypted working directory produced by `decrypt_backup`
    async fn cleanup(&self, decrypted_path: &Path) -> Result<()>;
}
