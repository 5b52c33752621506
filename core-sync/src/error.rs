use bridge_traits::BridgeError;
use core_contacts::ContactStoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Sync already in progress")]
    AlreadyRunning,

    #[error("Sync cancelled by user")]
    Cancelled,

    #[error("Password required for encrypted backup")]
    PasswordRequired,

    #[error("Insufficient disk space. Required: {required_gb:.1} GB, Available: {available_gb:.1} GB")]
    InsufficientDiskSpace { required_gb: f64, available_gb: f64 },

    #[error("No completed backup found for device {udid}")]
    NoBackupFound { udid: String },

    #[error("{0}")]
    Backup(String),

    #[error("{0}")]
    Decryption(String),

    #[error("Invalid sync phase: {0}")]
    InvalidPhase(String),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error(transparent)]
    Contacts(#[from] ContactStoreError),

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

pub type Result<T> = std::result::Result<T, SyncError>;
