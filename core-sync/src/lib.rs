//! # Sync Workflow Module
//!
//! Orchestrates one device sync from backup acquisition to parsed data.
//!
//! ## Overview
//!
//! This module manages the lifecycle of a sync run, including:
//! - Checking disk headroom before acquisition starts
//! - Driving the backup engine and forwarding its progress
//! - Decrypting encrypted backups through the decryptor bridge
//! - Parsing contacts and messages out of the backup
//! - Resolving raw handles to contact display names
//! - Emitting phase, progress, and completion events
//!
//! ## Components
//!
//! - **Phase State Machine** (`phase`): Validated phase transitions plus the single-flight flag
//! - **Configuration** (`config`): Backup root, disk thresholds, and progress weights
//! - **Orchestrator** (`orchestrator`): Runs the pipeline against the bridge collaborators
//! - **Run Types** (`types`): Sync options and the per-run result
//! - **Backup Source** (`source`): Fresh acquisition versus an existing on-disk backup

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod phase;
pub mod source;
pub mod types;

pub use config::{
    PhaseWeights, SyncConfig, DEFAULT_DISK_FLOOR_BYTES, DEFAULT_DISK_HEADROOM_FACTOR,
    DEFAULT_PROGRESS_STRIDE,
};
pub use error::{Result, SyncError};
pub use orchestrator::SyncOrchestrator;
pub use phase::{SyncPhase, SyncState};
pub use source::BackupSource;
pub use types::{SyncOptions, SyncResult};
