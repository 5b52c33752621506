//! # Sync Orchestrator
//!
//! Drives one device sync from backup acquisition to parsed data.
//!
//! ## Overview
//!
//! The `SyncOrchestrator` is the central workflow engine. It coordinates
//! between the collaborators behind the bridge traits to:
//! - Check disk headroom before any data moves
//! - Acquire a device backup via `BackupEngine`
//! - Decrypt encrypted backups via `BackupDecryptor`
//! - Parse contacts with `ContactStore` and messages with `MessageStore`
//! - Rewrite raw handles to contact display names
//! - Emit phase and weighted progress events via `EventBus`
//!
//! One orchestrator runs at most one sync at a time. A second request while
//! a run is active is rejected without disturbing the active run.
//!
//! ## Workflow
//!
//! ### Fresh sync
//! 1. Claim the single-flight slot and enter the backup phase
//! 2. Estimate the backup size (existing backup, then device storage)
//! 3. Verify free disk space against the estimate
//! 4. Run the backup engine, forwarding its progress events
//! 5. Decrypt when the backup is encrypted (password required)
//! 6. Parse contacts, then conversations and messages
//! 7. Resolve participant and sender handles against contacts
//! 8. Close parsers, remove temporary data, emit completion
//!
//! ### Existing backup
//! Same pipeline minus acquisition: the backup directory under the
//! configured root is validated and parsed in place.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_sync::{SyncConfig, SyncOptions, SyncOrchestrator};
//! use std::sync::Arc;
//!
//! # async fn example(orchestrator: Arc<SyncOrchestrator>) {
//! let result = orchestrator
//!     .sync(SyncOptions::new("00008030-000C2DE40C29802E"))
//!     .await;
//!
//! if result.success {
//!     println!("{} messages from {} conversations",
//!         result.messages.len(), result.conversations.len());
//! }
//! # }
//! ```

use crate::{
    config::SyncConfig,
    error::{Result, SyncError},
    phase::{SyncPhase, SyncState},
    source::BackupSource,
    types::{SyncOptions, SyncResult},
};
use bridge_traits::{
    backup::{BackupEngine, BackupEvent, BackupOptions},
    decrypt::BackupDecryptor,
    disk::DiskProbe,
    messages::{Conversation, Message, MessageStore},
};
use core_contacts::ContactStore;
use core_device::DeviceWatcher;
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Buffer for engine progress events between the engine task and the
/// forwarder.
const BACKUP_EVENT_BUFFER: usize = 64;

/// Byte-ratio progress inside the backup phase is capped below 100; the
/// phase reads complete only once the engine has returned.
const BACKUP_PROGRESS_CAP: u8 = 99;

// ============================================================================
// Helpers
// ============================================================================

fn bytes_to_gb(bytes: u64) -> f64 {
    bytes as f64 / 1e9
}

/// Free space a run must see before acquisition starts.
fn required_disk_bytes(estimate: Option<u64>, headroom: f64, floor: u64) -> u64 {
    match estimate {
        Some(bytes) if bytes > 0 => (bytes as f64 * headroom) as u64,
        _ => floor,
    }
}

/// Phase-local backup percentage, preferring the byte ratio over the
/// engine's own percent when both sides of the ratio are known.
fn backup_phase_percent(
    engine_percent: u8,
    bytes_transferred: Option<u64>,
    estimated_total: Option<u64>,
) -> u8 {
    let percent = match (bytes_transferred, estimated_total) {
        (Some(bytes), Some(total)) if total > 0 => ((bytes as f64 / total as f64) * 100.0) as u8,
        _ => engine_percent,
    };
    percent.min(BACKUP_PROGRESS_CAP)
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Sync orchestrator for one device at a time.
pub struct SyncOrchestrator {
    /// Configuration
    config: SyncConfig,

    /// Backup acquisition engine
    backup_engine: Arc<dyn BackupEngine>,

    /// Backup decryptor
    decryptor: Arc<dyn BackupDecryptor>,

    /// Message database parser
    message_store: Arc<dyn MessageStore>,

    /// Device watcher, queried for backup size estimates
    device_watcher: Arc<DeviceWatcher>,

    /// Free-space probe for the preflight check
    disk_probe: Arc<dyn DiskProbe>,

    /// Event bus for phase and progress events
    event_bus: EventBus,

    /// Phase machine plus the single-flight flag
    state: Arc<Mutex<SyncState>>,

    /// Cancellation token of the active run, if any
    cancel: Arc<Mutex<Option<CancellationToken>>>,
}

impl SyncOrchestrator {
    /// Create a new orchestrator.
    ///
    /// # Arguments
    ///
    /// * `config` - Sync configuration
    /// * `backup_engine` - Backup acquisition engine
    /// * `decryptor` - Backup decryptor
    /// * `message_store` - Message database parser
    /// * `device_watcher` - Device watcher for storage estimates
    /// * `disk_probe` - Free-space probe
    /// * `event_bus` - Event bus for sync events
    pub fn new(
        config: SyncConfig,
        backup_engine: Arc<dyn BackupEngine>,
        decryptor: Arc<dyn BackupDecryptor>,
        message_store: Arc<dyn MessageStore>,
        device_watcher: Arc<DeviceWatcher>,
        disk_probe: Arc<dyn DiskProbe>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            config,
            backup_engine,
            decryptor,
            message_store,
            device_watcher,
            disk_probe,
            event_bus,
            state: Arc::new(Mutex::new(SyncState::new())),
            cancel: Arc::new(Mutex::new(None)),
        }
    }

    /// Run a full sync: acquire a backup from the device, then parse it.
    ///
    /// Returns when the run is over; progress arrives on the event bus.
    /// Every outcome, including rejection while another run is active, is
    /// reported as a [`SyncResult`].
    #[instrument(skip(self, options), fields(udid = %options.udid))]
    pub async fn sync(&self, options: SyncOptions) -> SyncResult {
        self.run(BackupSource::Fresh { options }).await
    }

    /// Parse an existing backup for `udid` without touching the device.
    ///
    /// The backup is expected under the configured backup root, in a
    /// directory named after the UDID.
    #[instrument(skip(self, password))]
    pub async fn process_existing_backup(&self, udid: &str, password: Option<String>) -> SyncResult {
        let path = self.config.backup_root.join(udid);
        self.run(BackupSource::Existing {
            udid: udid.to_string(),
            path,
            password,
        })
        .await
    }

    /// Request cancellation of the active run.
    ///
    /// Cooperative: the run stops at its next cancellation check and
    /// reports a failed result. No-op when nothing is running.
    pub async fn cancel_sync(&self) {
        let cancel = self.cancel.lock().await;
        match cancel.as_ref() {
            Some(token) => {
                info!("Cancelling active sync");
                token.cancel();
            }
            None => debug!("No active sync to cancel"),
        }
    }

    /// Forcibly clear the running flag and reset the phase to idle.
    ///
    /// Recovery hatch for a machine left stuck by an orphaned external
    /// process; any active token is cancelled first.
    pub async fn force_reset(&self) {
        warn!("Force resetting sync state");
        {
            let mut cancel = self.cancel.lock().await;
            if let Some(token) = cancel.take() {
                token.cancel();
            }
        }
        let mut state = self.state.lock().await;
        state.force_reset();
    }

    /// Current pipeline phase.
    pub async fn current_phase(&self) -> SyncPhase {
        self.state.lock().await.phase()
    }

    /// Whether a run currently holds the single-flight slot.
    pub async fn is_running(&self) -> bool {
        self.state.lock().await.is_running()
    }

    // ========================================================================
    // Run lifecycle
    // ========================================================================

    #[instrument(skip(self, source), fields(udid = %source.udid()))]
    async fn run(&self, source: BackupSource) -> SyncResult {
        let started = Instant::now();
        let sync_id = Uuid::new_v4().to_string();

        // Claim the single-flight slot. Rejection must not disturb the
        // active run, so it skips phase transitions and cleanup entirely.
        {
            let mut state = self.state.lock().await;
            if let Err(e) = state.begin() {
                warn!("Rejected sync request for {}: {}", source.udid(), e);
                self.emit_failed(&sync_id, &e.to_string());
                return SyncResult::failed(e.to_string(), started.elapsed().as_millis() as u64);
            }
        }

        let token = CancellationToken::new();
        {
            let mut cancel = self.cancel.lock().await;
            *cancel = Some(token.clone());
        }

        info!("Sync {} started", sync_id);
        let outcome = self.execute(&sync_id, &source, &token, started).await;

        {
            let mut cancel = self.cancel.lock().await;
            *cancel = None;
        }

        let result = match outcome {
            Ok(result) => result,
            Err(e) => {
                error!("Sync {} failed: {}", sync_id, e);
                self.to_error_phase().await;
                self.emit_failed(&sync_id, &e.to_string());
                SyncResult::failed(e.to_string(), started.elapsed().as_millis() as u64)
            }
        };

        let mut state = self.state.lock().await;
        state.finish();
        result
    }

    #[instrument(skip(self, source, token, started))]
    async fn execute(
        &self,
        sync_id: &str,
        source: &BackupSource,
        token: &CancellationToken,
        started: Instant,
    ) -> Result<SyncResult> {
        let (backup_path, encrypted) = self.acquire(sync_id, source, token).await?;

        // Password gate before anything opens the backup.
        let mut decrypted_path: Option<PathBuf> = None;
        let mut effective_path = backup_path.clone();
        if encrypted {
            let Some(password) = source.password() else {
                warn!("Backup for {} is encrypted and no password was given", source.udid());
                self.event_bus
                    .emit(CoreEvent::Sync(SyncEvent::PasswordRequired {
                        sync_id: sync_id.to_string(),
                        udid: source.udid().to_string(),
                    }))
                    .ok();
                return Err(SyncError::PasswordRequired);
            };

            self.check_cancelled(token)?;
            self.transition(sync_id, SyncPhase::Decrypting).await?;
            self.emit_progress(sync_id, SyncPhase::Decrypting, 0, "Decrypting backup", None, None);

            let outcome = self.decryptor.decrypt_backup(&backup_path, password).await?;
            if !outcome.success {
                return Err(SyncError::Decryption(
                    outcome
                        .error
                        .unwrap_or_else(|| "Backup decryption failed".to_string()),
                ));
            }
            if let Some(path) = outcome.decrypted_path {
                // Separate working copy; hand it back to the decryptor
                // once parsing is done.
                decrypted_path = Some(path.clone());
                effective_path = path;
            }
            self.emit_progress(sync_id, SyncPhase::Decrypting, 100, "Backup decrypted", None, None);
        }

        let contact_store = ContactStore::new();
        let extraction = self
            .extract(sync_id, token, &contact_store, &effective_path)
            .await;

        // Parsers close and temporary data goes away on every exit path,
        // success or not.
        contact_store.close().await;
        if let Err(e) = self.message_store.close().await {
            warn!("Failed to close message store: {}", e);
        }
        if let Some(path) = &decrypted_path {
            if let Err(e) = self.decryptor.cleanup(path).await {
                warn!("Failed to remove decrypted backup copy: {}", e);
            }
        }

        let (contacts, conversations, messages) = extraction?;

        self.transition(sync_id, SyncPhase::Complete).await?;
        let duration_ms = started.elapsed().as_millis() as u64;
        info!(
            "Sync {} completed: {} messages, {} contacts, {} conversations in {} ms",
            sync_id,
            messages.len(),
            contacts.len(),
            conversations.len(),
            duration_ms
        );
        self.event_bus
            .emit(CoreEvent::Sync(SyncEvent::Completed {
                sync_id: sync_id.to_string(),
                message_count: messages.len() as u64,
                contact_count: contacts.len() as u64,
                conversation_count: conversations.len() as u64,
                duration_ms,
            }))
            .ok();

        Ok(SyncResult::completed(messages, contacts, conversations, duration_ms))
    }

    /// Produce a readable backup directory: run the engine for fresh syncs,
    /// validate the on-disk directory for existing-backup runs.
    ///
    /// Returns the backup path and whether it is encrypted.
    async fn acquire(
        &self,
        sync_id: &str,
        source: &BackupSource,
        token: &CancellationToken,
    ) -> Result<(PathBuf, bool)> {
        match source {
            BackupSource::Fresh { options } => self.acquire_fresh(sync_id, options, token).await,
            BackupSource::Existing { udid, path, .. } => {
                let status = self.backup_engine.check_backup_status(udid).await?;
                if !status.exists || !status.is_complete || status.is_corrupted {
                    return Err(SyncError::NoBackupFound { udid: udid.clone() });
                }
                let encrypted = self.decryptor.is_backup_encrypted(path).await?;
                info!(
                    "Reusing existing backup at {} (encrypted: {})",
                    path.display(),
                    encrypted
                );
                Ok((path.clone(), encrypted))
            }
        }
    }

    async fn acquire_fresh(
        &self,
        sync_id: &str,
        options: &SyncOptions,
        token: &CancellationToken,
    ) -> Result<(PathBuf, bool)> {
        self.transition(sync_id, SyncPhase::Backup).await?;
        self.emit_progress(sync_id, SyncPhase::Backup, 0, "Preparing backup", None, None);

        // Size estimate: a completed previous backup predicts the refreshed
        // one best; otherwise fall back to the device's own storage numbers.
        let mut estimate: Option<u64> = None;
        match self.backup_engine.check_backup_status(&options.udid).await {
            Ok(status) if status.exists && status.is_complete => {
                info!(
                    "Existing backup found ({} bytes); engine refreshes it incrementally",
                    status.size_bytes
                );
                if status.size_bytes > 0 {
                    estimate = Some(status.size_bytes);
                }
            }
            Ok(_) => debug!("No reusable backup for {}", options.udid),
            Err(e) => warn!("Could not check existing backup status: {}", e),
        }
        if estimate.is_none() {
            if let Some(storage) = self.device_watcher.get_device_storage_info(&options.udid).await
            {
                estimate = Some(storage.estimated_backup_size);
            }
        }

        // Disk preflight runs before the engine moves a single byte.
        let required = required_disk_bytes(
            estimate,
            self.config.disk_headroom_factor,
            self.config.disk_floor_bytes,
        );
        let available = self
            .disk_probe
            .available_space(&self.config.backup_root)
            .await?;
        if available < required {
            return Err(SyncError::InsufficientDiskSpace {
                required_gb: bytes_to_gb(required),
                available_gb: bytes_to_gb(available),
            });
        }
        debug!(
            "Disk preflight passed: {} bytes required, {} bytes available",
            required, available
        );

        // Forward engine events onto the bus while the transfer runs.
        let (tx, mut rx) = mpsc::channel::<BackupEvent>(BACKUP_EVENT_BUFFER);
        let bus = self.event_bus.clone();
        let weights = self.config.weights;
        let forward_sync_id = sync_id.to_string();
        let forward_udid = options.udid.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                match event {
                    BackupEvent::Progress {
                        percent,
                        bytes_transferred,
                        total_bytes,
                        detail,
                    } => {
                        let estimated = estimate.or(total_bytes);
                        let phase_percent =
                            backup_phase_percent(percent, bytes_transferred, estimated);
                        bus.emit(CoreEvent::Sync(SyncEvent::Progress {
                            sync_id: forward_sync_id.clone(),
                            phase: SyncPhase::Backup.as_str().to_string(),
                            percent: phase_percent,
                            overall_percent: weights.overall(SyncPhase::Backup, phase_percent),
                            message: "Backing up device".to_string(),
                            transfer_detail: detail,
                            estimated_total_bytes: estimated,
                        }))
                        .ok();
                    }
                    BackupEvent::PasswordRequired => {
                        bus.emit(CoreEvent::Sync(SyncEvent::PasswordRequired {
                            sync_id: forward_sync_id.clone(),
                            udid: forward_udid.clone(),
                        }))
                        .ok();
                    }
                    BackupEvent::WaitingForPasscode => {
                        bus.emit(CoreEvent::Sync(SyncEvent::WaitingForPasscode {
                            sync_id: forward_sync_id.clone(),
                            udid: forward_udid.clone(),
                        }))
                        .ok();
                    }
                    BackupEvent::PasscodeEntered => {
                        bus.emit(CoreEvent::Sync(SyncEvent::PasscodeEntered {
                            sync_id: forward_sync_id.clone(),
                            udid: forward_udid.clone(),
                        }))
                        .ok();
                    }
                }
            }
        });

        let engine_options = BackupOptions {
            udid: options.udid.clone(),
            force_full: options.force_full_backup,
        };
        let outcome = tokio::select! {
            outcome = self.backup_engine.start_backup(engine_options, tx) => {
                // Drain queued engine events before any phase transition.
                forwarder.await.ok();
                outcome?
            }
            _ = token.cancelled() => {
                info!("Cancellation requested during backup acquisition");
                if let Err(e) = self.backup_engine.cancel_backup().await {
                    warn!("Failed to cancel backup engine: {}", e);
                }
                forwarder.await.ok();
                return Err(SyncError::Cancelled);
            }
        };

        if !outcome.success {
            return Err(SyncError::Backup(
                outcome.error.unwrap_or_else(|| "Backup failed".to_string()),
            ));
        }

        let path = outcome
            .backup_path
            .unwrap_or_else(|| self.config.backup_root.join(&options.udid));
        self.emit_progress(sync_id, SyncPhase::Backup, 100, "Backup complete", None, estimate);
        info!("Backup acquired at {}", path.display());
        Ok((path, outcome.is_encrypted))
    }

    /// Parse contacts, conversations, and messages out of the backup at
    /// `backup_path`, then resolve handles to names.
    async fn extract(
        &self,
        sync_id: &str,
        token: &CancellationToken,
        contact_store: &ContactStore,
        backup_path: &Path,
    ) -> Result<(Vec<core_contacts::Contact>, Vec<Conversation>, Vec<Message>)> {
        self.check_cancelled(token)?;
        self.transition(sync_id, SyncPhase::ParsingContacts).await?;
        self.emit_progress(sync_id, SyncPhase::ParsingContacts, 0, "Parsing contacts", None, None);

        contact_store.open(backup_path).await?;
        let contacts = contact_store.get_all_contacts().await;
        self.emit_progress(
            sync_id,
            SyncPhase::ParsingContacts,
            100,
            &format!("Parsed {} contacts", contacts.len()),
            None,
            None,
        );

        self.check_cancelled(token)?;
        self.transition(sync_id, SyncPhase::ParsingMessages).await?;
        self.emit_progress(sync_id, SyncPhase::ParsingMessages, 0, "Parsing messages", None, None);

        self.message_store.open(backup_path).await?;
        let mut conversations = self.message_store.conversations().await?;
        let total = conversations.len();
        let mut messages = Vec::new();
        for (index, conversation) in conversations.iter().enumerate() {
            self.check_cancelled(token)?;
            let mut batch = self.message_store.messages(conversation.chat_id).await?;
            messages.append(&mut batch);

            let processed = index + 1;
            if processed % self.config.progress_stride == 0 || processed == total {
                let percent = ((processed as f64 / total as f64) * 100.0) as u8;
                self.emit_progress(
                    sync_id,
                    SyncPhase::ParsingMessages,
                    percent,
                    &format!("Processed {} of {} conversations", processed, total),
                    None,
                    None,
                );
            }
        }
        if total == 0 {
            self.emit_progress(
                sync_id,
                SyncPhase::ParsingMessages,
                100,
                "No conversations found",
                None,
                None,
            );
        }
        info!(
            "Parsed {} messages across {} conversations",
            messages.len(),
            total
        );

        self.check_cancelled(token)?;
        self.transition(sync_id, SyncPhase::Resolving).await?;
        self.emit_progress(sync_id, SyncPhase::Resolving, 0, "Resolving contact names", None, None);
        let resolved = self
            .resolve_names(contact_store, &mut conversations, &mut messages)
            .await;
        self.emit_progress(
            sync_id,
            SyncPhase::Resolving,
            100,
            &format!("Resolved {} handles", resolved),
            None,
            None,
        );

        self.check_cancelled(token)?;
        self.transition(sync_id, SyncPhase::Cleanup).await?;
        self.emit_progress(sync_id, SyncPhase::Cleanup, 0, "Cleaning up", None, None);

        Ok((contacts, conversations, messages))
    }

    /// Rewrite conversation participants, and optionally message senders,
    /// to contact display names. Unmatched handles stay raw.
    async fn resolve_names(
        &self,
        contact_store: &ContactStore,
        conversations: &mut [Conversation],
        messages: &mut [Message],
    ) -> usize {
        let mut resolved = 0;
        for conversation in conversations.iter_mut() {
            for participant in conversation.participants.iter_mut() {
                if let Some(matched) = contact_store.lookup_by_handle(participant).await {
                    *participant = matched.contact.display_name.clone();
                    resolved += 1;
                }
            }
        }

        if self.config.resolve_message_senders {
            for message in messages.iter_mut() {
                let Some(sender) = message.sender.as_deref() else {
                    continue;
                };
                if let Some(matched) = contact_store.lookup_by_handle(sender).await {
                    message.sender_name = Some(matched.contact.display_name.clone());
                    resolved += 1;
                }
            }
        }

        resolved
    }

    // ========================================================================
    // Small shared pieces
    // ========================================================================

    fn check_cancelled(&self, token: &CancellationToken) -> Result<()> {
        if token.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        Ok(())
    }

    async fn transition(&self, sync_id: &str, to: SyncPhase) -> Result<()> {
        {
            let mut state = self.state.lock().await;
            state.transition_to(to)?;
        }
        info!("Phase: {}", to);
        self.event_bus
            .emit(CoreEvent::Sync(SyncEvent::PhaseChanged {
                sync_id: sync_id.to_string(),
                phase: to.as_str().to_string(),
            }))
            .ok();
        Ok(())
    }

    /// Record the error phase after a failed run; a rejection that never
    /// claimed the slot does not come through here.
    async fn to_error_phase(&self) {
        let mut state = self.state.lock().await;
        if state.phase().is_terminal() {
            return;
        }
        if let Err(e) = state.transition_to(SyncPhase::Error) {
            warn!("Could not record error phase: {}", e);
        }
    }

    fn emit_failed(&self, sync_id: &str, message: &str) {
        self.event_bus
            .emit(CoreEvent::Sync(SyncEvent::Failed {
                sync_id: sync_id.to_string(),
                message: message.to_string(),
            }))
            .ok();
    }

    fn emit_progress(
        &self,
        sync_id: &str,
        phase: SyncPhase,
        percent: u8,
        message: &str,
        transfer_detail: Option<String>,
        estimated_total_bytes: Option<u64>,
    ) {
        self.event_bus
            .emit(CoreEvent::Sync(SyncEvent::Progress {
                sync_id: sync_id.to_string(),
                phase: phase.as_str().to_string(),
                percent: percent.min(100),
                overall_percent: self.config.weights.overall(phase, percent),
                message: message.to_string(),
                transfer_detail,
                estimated_total_bytes,
            }))
            .ok();
    }
}

// ============================================================================
// Tests
// ============================================================================
