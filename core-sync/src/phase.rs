//! # Sync Phase State Machine
//!
//! Tracks where one sync run is in the pipeline and validates every phase
//! transition against an explicit table.
//!
//! ## State Machine
//!
//! ```text
//! Idle → Backup → Decrypting → ParsingContacts → ParsingMessages
//!   │       │          │              ↑
//!   │       └──────────┼──────────────┤        (decrypting skipped for
//!   └──────────────────┴──────────────┘         unencrypted backups;
//!                                               existing-backup runs
//!                                               enter past Backup)
//!
//! ParsingMessages → Resolving → Cleanup → Complete → Idle
//!
//! every non-terminal phase → Error → Idle
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_sync::{SyncPhase, SyncState};
//!
//! let mut state = SyncState::new();
//! state.begin()?;
//! state.transition_to(SyncPhase::Backup)?;
//! state.transition_to(SyncPhase::ParsingContacts)?;
//! ```

use crate::error::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

// ============================================================================
// Phase
// ============================================================================

/// The pipeline phase a sync run is currently in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncPhase {
    /// No sync running
    Idle,
    /// Acquiring a backup from the device (includes the preflight checks)
    Backup,
    /// Decrypting an encrypted backup
    Decrypting,
    /// Decoding the address book database
    ParsingContacts,
    /// Decoding conversations and messages
    ParsingMessages,
    /// Rewriting handles to contact display names
    Resolving,
    /// Closing parsers and removing temporary data
    Cleanup,
    /// Sync finished successfully
    Complete,
    /// Sync finished with an error
    Error,
}

impl SyncPhase {
    /// Whether this phase ends a run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncPhase::Complete | SyncPhase::Error)
    }

    /// Kebab-case name used in events and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncPhase::Idle => "idle",
            SyncPhase::Backup => "backup",
            SyncPhase::Decrypting => "decrypting",
            SyncPhase::ParsingContacts => "parsing-contacts",
            SyncPhase::ParsingMessages => "parsing-messages",
            SyncPhase::Resolving => "resolving",
            SyncPhase::Cleanup => "cleanup",
            SyncPhase::Complete => "complete",
            SyncPhase::Error => "error",
        }
    }
}

impl FromStr for SyncPhase {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "idle" => Ok(SyncPhase::Idle),
            "backup" => Ok(SyncPhase::Backup),
            "decrypting" => Ok(SyncPhase::Decrypting),
            "parsing-contacts" => Ok(SyncPhase::ParsingContacts),
            "parsing-messages" => Ok(SyncPhase::ParsingMessages),
            "resolving" => Ok(SyncPhase::Resolving),
            "cleanup" => Ok(SyncPhase::Cleanup),
            "complete" => Ok(SyncPhase::Complete),
            "error" => Ok(SyncPhase::Error),
            _ => Err(SyncError::InvalidPhase(s.to_string())),
        }
    }
}

impl std::fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// State
// ============================================================================

/// Mutex-guarded state of one orchestrator: current phase plus the
/// single-flight flag.
///
/// The running flag is claimed by [`begin`](Self::begin) and released by
/// [`finish`](Self::finish); phase moves only through
/// [`transition_to`](Self::transition_to), which rejects anything not in the
/// transition table. [`force_reset`](Self::force_reset) bypasses both,
/// existing solely to recover a stuck machine.
#[derive(Debug, Clone)]
pub struct SyncState {
    phase: SyncPhase,
    running: bool,
}

impl SyncState {
    /// Create an idle state.
    pub fn new() -> Self {
        Self {
            phase: SyncPhase::Idle,
            running: false,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    /// Whether a sync currently holds the single-flight slot.
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Claim the single-flight slot for a new run.
    ///
    /// A leftover terminal phase from the previous run is folded back to
    /// idle first.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::AlreadyRunning`] if a run is already active.
    pub fn begin(&mut self) -> Result<()> {
        if self.running {
            return Err(SyncError::AlreadyRunning);
        }
        if self.phase.is_terminal() {
            self.transition_to(SyncPhase::Idle)?;
        }
        self.running = true;
        Ok(())
    }

    /// Release the single-flight slot.
    pub fn finish(&mut self) {
        self.running = false;
    }

    /// Move to `to`, validating against the transition table.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidStateTransition`] for any pair not in
    /// the table.
    pub fn transition_to(&mut self, to: SyncPhase) -> Result<()> {
        let valid = match (self.phase, to) {
            // Pipeline entry; existing-backup runs start past Backup
            (SyncPhase::Idle, SyncPhase::Backup) => true,
            (SyncPhase::Idle, SyncPhase::Decrypting) => true,
            (SyncPhase::Idle, SyncPhase::ParsingContacts) => true,

            // Decrypting is skipped for unencrypted backups
            (SyncPhase::Backup, SyncPhase::Decrypting) => true,
            (SyncPhase::Backup, SyncPhase::ParsingContacts) => true,
            (SyncPhase::Decrypting, SyncPhase::ParsingContacts) => true,

            (SyncPhase::ParsingContacts, SyncPhase::ParsingMessages) => true,
            (SyncPhase::ParsingMessages, SyncPhase::Resolving) => true,
            (SyncPhase::Resolving, SyncPhase::Cleanup) => true,
            (SyncPhase::Cleanup, SyncPhase::Complete) => true,

            // Any non-terminal phase can fail
            (from, SyncPhase::Error) => !from.is_terminal(),

            // Terminal phases only fold back to idle
            (SyncPhase::Complete, SyncPhase::Idle) => true,
            (SyncPhase::Error, SyncPhase::Idle) => true,

            _ => false,
        };

        if !valid {
            return Err(SyncError::InvalidStateTransition {
                from: self.phase.as_str().to_string(),
                to: to.as_str().to_string(),
            });
        }

        self.phase = to;
        Ok(())
    }

    /// Unconditionally clear the running flag and reset the phase to idle.
    ///
    /// Escape hatch for a machine stuck by an orphaned external process;
    /// skips transition validation on purpose.
    pub fn force_reset(&mut self) {
        self.phase = SyncPhase::Idle;
        self.running = false;
    }
}

impl Default for SyncState {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================
