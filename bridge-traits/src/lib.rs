//! # External Collaborator Traits
//!
//! Trait contracts for every capability the sync pipeline consumes but does
//! not implement itself.
//!
//! ## Overview
//!
//! This crate defines the seam between the core crates and the host
//! application. Each trait represents one external collaborator: a subprocess
//! runner for the device CLI tools, a disk-space probe, the backup engine
//! that talks the device transfer protocol, the backup decryptor, and the
//! message-database parser. The core never spawns a process, inspects a
//! mount, or touches a backup transfer directly; it only calls these traits.
//!
//! ## Traits
//!
//! ### Host Infrastructure
//! - [`CommandRunner`](command::CommandRunner) - Run an external CLI tool, capture its output
//! - [`DiskProbe`](disk::DiskProbe) - Free-space queries for the preflight check
//!
//! ### Backup Pipeline Collaborators
//! - [`BackupEngine`](backup::BackupEngine) - Acquire a device backup, report progress, cancel
//! - [`BackupDecryptor`](decrypt::BackupDecryptor) - Decrypt an encrypted backup, clean up after it
//! - [`MessageStore`](messages::MessageStore) - Parse the message database out of a backup
//!
//! ## Backup File Layout
//!
//! Files inside a backup directory are content-addressed: the file for
//! `(domain, relative_path)` lives at `<backup>/<hash[0..2]>/<hash>` where
//! `hash` is the hex SHA-1 of `"<domain>-<relative_path>"`. The
//! [`backup`] module provides the layout helpers shared by every consumer.
//!
//! ## Error Handling
//!
//! All traits use [`BridgeError`](error::BridgeError). Implementations
//! should:
//!
//! - Convert host-specific errors to `BridgeError`
//! - Distinguish "tool not installed" ([`BridgeError::NotAvailable`]) from
//!   a tool that ran and failed
//! - Include context (program names, paths) in messages
//!
//! ## Thread Safety
//!
//! All traits require `Send + Sync` so implementations can be shared across
//! async tasks behind `Arc`.
//!
//! ## Examples
//!
//! ### Implementing CommandRunner
//!
//! ```ignore
//! use bridge_traits::command::{CommandOutput, CommandRunner};
//! use bridge_traits::error::Result;
//! use async_trait::async_trait;
//!
//! pub struct MyRunner;
//!
//! #[async_trait]
//! impl CommandRunner for MyRunner {
//!     async fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
//!         // Spawn, wait, capture stdout/stderr
//!         todo!()
//!     }
//! }
//! ```

pub mod backup;
pub mod command;
pub mod decrypt;
pub mod disk;
pub mod error;
pub mod messages;

pub use error::BridgeError;

// Re-export commonly used types
pub use backup::{
    backup_file_path, hashed_file_name, path_for_hash, BackupEngine, BackupEvent, BackupOptions,
    BackupOutcome, BackupStatus,
};
pub use command::{CommandOutput, CommandRunner};
pub use decrypt::{BackupDecryptor, DecryptionOutcome};
pub use disk::DiskProbe;
pub use messages::{Conversation, Message, MessageStore};
