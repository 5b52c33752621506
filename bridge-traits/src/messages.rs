//! Message Database Parsing
//!
//! Contract for the collaborator that decodes the message database out of a
//! backup, plus the records it produces. The sync pipeline treats these
//! records as opaque payloads except for the handle fields, which the name
//! resolution pass rewrites against parsed contacts.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;

/// One conversation (chat thread) from the message database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Source-database row id of the chat
    pub chat_id: i64,
    /// Chat name when the user set one (group chats), else `None`
    pub display_name: Option<String>,
    /// Participant handles (phone numbers or email addresses). Name
    /// resolution replaces entries in place with contact display names
    /// where a match exists; unmatched entries stay raw handles.
    pub participants: Vec<String>,
}

/// One message row from the message database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Source-database row id of the message
    pub id: i64,
    /// Chat this message belongs to
    pub chat_id: i64,
    /// Raw sender handle; `None` for messages sent from the device itself
    pub sender: Option<String>,
    /// Resolved sender display name, filled by the name resolution pass
    pub sender_name: Option<String>,
    pub text: Option<String>,
    /// Unix timestamp in seconds
    pub timestamp: i64,
    pub is_from_me: bool,
}

/// Message store trait
///
/// Stateful handle over the message database inside one backup: `open`
/// before any query, `close` when done. The sync pipeline owns the handle
/// for the duration of one run and closes it on every exit path.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Open the message database inside the backup at `backup_path`
    async fn open(&self, backup_path: &Path) -> Result<()>;

    /// All conversations, unordered
    async fn conversations(&self) -> Result<Vec<Conversation>>;

    /// All messages belonging to `chat_id`
    async fn messages(&self, chat_id: i64) -> Result<Vec<Message>>;

    /// Close the handle; must be safe to call more than once
    async fn close(&self) -> Result<()>;
}
