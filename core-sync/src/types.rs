//! Request and result types for sync runs.

use bridge_traits::messages::{Conversation, Message};
use core_contacts::Contact;
use serde::{Deserialize, Serialize};

/// Parameters for a fresh device sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOptions {
    /// Device to back up.
    pub udid: String,
    /// Backup password, required only when the device backup is encrypted.
    pub password: Option<String>,
    /// Skip incremental acquisition and take a full backup.
    pub force_full_backup: bool,
}

impl SyncOptions {
    pub fn new(udid: impl Into<String>) -> Self {
        Self {
            udid: udid.into(),
            password: None,
            force_full_backup: false,
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_force_full_backup(mut self, force: bool) -> Self {
        self.force_full_backup = force;
        self
    }
}

/// Outcome of one sync run.
///
/// Every exit path produces one of these; `error` carries the failure
/// message verbatim when `success` is false.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncResult {
    pub success: bool,
    pub messages: Vec<Message>,
    pub contacts: Vec<Contact>,
    pub conversations: Vec<Conversation>,
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl SyncResult {
    pub fn completed(
        messages: Vec<Message>,
        contacts: Vec<Contact>,
        conversations: Vec<Conversation>,
        duration_ms: u64,
    ) -> Self {
        Self {
            success: true,
            messages,
            contacts,
            conversations,
            error: None,
            duration_ms,
        }
    }

    pub fn failed(error: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            success: false,
            messages: Vec::new(),
            contacts: Vec::new(),
            conversations: Vec::new(),
            error: Some(error.into()),
            duration_ms,
        }
    }
}
