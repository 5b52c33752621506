//! # Sync Configuration Module
//!
//! Tuning knobs for [`SyncOrchestrator`](crate::SyncOrchestrator): where
//! backups live, how much disk headroom a run must have, and how per-phase
//! progress maps onto the overall 0-100 scale.

use crate::phase::SyncPhase;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default multiplier applied to the estimated backup size when checking
/// free disk space.
pub const DEFAULT_DISK_HEADROOM_FACTOR: f64 = 2.0;

/// Disk space required when no backup size estimate is available (10 GB).
pub const DEFAULT_DISK_FLOOR_BYTES: u64 = 10_000_000_000;

/// Emit a message-parsing progress event every this many conversations.
pub const DEFAULT_PROGRESS_STRIDE: usize = 10;

// ============================================================================
// Phase weights
// ============================================================================

/// Share of the overall progress bar assigned to each pipeline phase.
///
/// Weights are percentage points and sum to 100. A phase that gets skipped
/// (decrypting for unencrypted backups, backup for existing-backup runs)
/// simply makes the bar jump past its slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseWeights {
    pub backup: u8,
    pub decrypting: u8,
    pub parsing_contacts: u8,
    pub parsing_messages: u8,
    pub resolving: u8,
    pub cleanup: u8,
}

impl PhaseWeights {
    /// Width of the overall-progress slice owned by `phase`.
    pub fn weight(&self, phase: SyncPhase) -> u8 {
        match phase {
            SyncPhase::Backup => self.backup,
            SyncPhase::Decrypting => self.decrypting,
            SyncPhase::ParsingContacts => self.parsing_contacts,
            SyncPhase::ParsingMessages => self.parsing_messages,
            SyncPhase::Resolving => self.resolving,
            SyncPhase::Cleanup => self.cleanup,
            SyncPhase::Idle | SyncPhase::Complete | SyncPhase::Error => 0,
        }
    }

    /// Overall percentage at which the slice for `phase` begins.
    pub fn start(&self, phase: SyncPhase) -> u8 {
        match phase {
            SyncPhase::Idle => 0,
            SyncPhase::Backup => 0,
            SyncPhase::Decrypting => self.backup,
            SyncPhase::ParsingContacts => self.backup + self.decrypting,
            SyncPhase::ParsingMessages => {
                self.backup + self.decrypting + self.parsing_contacts
            }
            SyncPhase::Resolving => {
                self.backup + self.decrypting + self.parsing_contacts + self.parsing_messages
            }
            SyncPhase::Cleanup => {
                self.backup
                    + self.decrypting
                    + self.parsing_contacts
                    + self.parsing_messages
                    + self.resolving
            }
            SyncPhase::Complete => 100,
            // Progress is never reported from the error phase.
            SyncPhase::Error => 0,
        }
    }

    /// Map a phase-local percentage onto the overall 0-100 scale.
    pub fn overall(&self, phase: SyncPhase, phase_percent: u8) -> u8 {
        let start = self.start(phase) as f64;
        let weight = self.weight(phase) as f64;
        let fraction = phase_percent.min(100) as f64 / 100.0;
        let overall = (start + fraction * weight).round() as u8;
        overall.min(100)
    }
}

impl Default for PhaseWeights {
    fn default() -> Self {
        Self {
            backup: 60,
            decrypting: 10,
            parsing_contacts: 5,
            parsing_messages: 15,
            resolving: 5,
            cleanup: 5,
        }
    }
}

// ============================================================================
// Sync configuration
// ============================================================================

/// Configuration for [`SyncOrchestrator`](crate::SyncOrchestrator).
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Directory that holds per-device backup subdirectories (named by UDID).
    pub backup_root: PathBuf,
    /// Overall-progress slice per phase.
    pub weights: PhaseWeights,
    /// Multiplier applied to the estimated backup size during preflight.
    pub disk_headroom_factor: f64,
    /// Required free space when no size estimate exists.
    pub disk_floor_bytes: u64,
    /// Conversations between message-parsing progress events.
    pub progress_stride: usize,
    /// Rewrite message sender handles to contact display names.
    pub resolve_message_senders: bool,
}

impl SyncConfig {
    /// Create a configuration with defaults and the given backup root.
    pub fn new(backup_root: impl Into<PathBuf>) -> Self {
        Self {
            backup_root: backup_root.into(),
            ..Default::default()
        }
    }

    pub fn with_weights(mut self, weights: PhaseWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_disk_headroom_factor(mut self, factor: f64) -> Self {
        self.disk_headroom_factor = factor;
        self
    }

    pub fn with_disk_floor_bytes(mut self, bytes: u64) -> Self {
        self.disk_floor_bytes = bytes;
        self
    }

    pub fn with_progress_stride(mut self, stride: usize) -> Self {
        self.progress_stride = stride.max(1);
        self
    }

    pub fn with_resolve_message_senders(mut self, enabled: bool) -> Self {
        self.resolve_message_senders = enabled;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            backup_root: PathBuf::from("backups"),
            weights: PhaseWeights::default(),
            disk_headroom_factor: DEFAULT_DISK_HEADROOM_FACTOR,
            disk_floor_bytes: DEFAULT_DISK_FLOOR_BYTES,
            progress_stride: DEFAULT_PROGRESS_STRIDE,
            resolve_message_senders: true,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
