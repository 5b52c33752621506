//! Integration tests for the device sync pipeline
//!
//! These tests drive the full orchestrator against scripted collaborators:
//! - Fresh sync happy path with phase ordering and name resolution
//! - Single-flight rejection while another run is active
//! - Password gating for encrypted backups
//! - Existing-backup runs, encrypted and not
//! - Cooperative cancellation mid-parse with guaranteed cleanup
//! - Force reset recovery

use async_trait::async_trait;
use bridge_traits::backup::{
    path_for_hash, BackupEngine, BackupEvent, BackupOptions, BackupOutcome, BackupStatus,
};
use bridge_traits::command::{CommandOutput, CommandRunner};
use bridge_traits::decrypt::{BackupDecryptor, DecryptionOutcome};
use bridge_traits::disk::DiskProbe;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::messages::{Conversation, Message, MessageStore};
use core_contacts::CONTACTS_DB_HASH;
use core_device::{DeviceWatcher, WatcherConfig};
use core_runtime::events::{CoreEvent, EventBus, Receiver, SyncEvent};
use core_sync::{SyncConfig, SyncOptions, SyncOrchestrator, SyncPhase};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::{mpsc, oneshot, Mutex as AsyncMutex};

// ============================================================================
// Mock Implementations
// ============================================================================

/// Mock backup engine with a scripted status, event stream, and outcome.
struct MockBackupEngine {
    status: AsyncMutex<BackupStatus>,
    outcome: AsyncMutex<BackupOutcome>,
    scripted_events: AsyncMutex<Vec<BackupEvent>>,
    hold: AsyncMutex<Option<Duration>>,
    start_calls: AtomicUsize,
    cancel_calls: AtomicUsize,
}

impl MockBackupEngine {
    fn new() -> Self {
        Self {
            status: AsyncMutex::new(BackupStatus::default()),
            outcome: AsyncMutex::new(BackupOutcome {
                success: true,
                backup_path: None,
                is_encrypted: false,
                error: None,
            }),
            scripted_events: AsyncMutex::new(Vec::new()),
            hold: AsyncMutex::new(None),
            start_calls: AtomicUsize::new(0),
            cancel_calls: AtomicUsize::new(0),
        }
    }

    async fn set_status(&self, status: BackupStatus) {
        *self.status.lock().await = status;
    }

    async fn set_outcome(&self, outcome: BackupOutcome) {
        *self.outcome.lock().await = outcome;
    }

    async fn set_events(&self, events: Vec<BackupEvent>) {
        *self.scripted_events.lock().await = events;
    }

    /// Make `start_backup` hang for `duration` after sending its events.
    async fn set_hold(&self, duration: Duration) {
        *self.hold.lock().await = Some(duration);
    }

    fn start_calls(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }

    fn cancel_calls(&self) -> usize {
        self.cancel_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BackupEngine for MockBackupEngine {
    async fn start_backup(
        &self,
        _options: BackupOptions,
        events: mpsc::Sender<BackupEvent>,
    ) -> BridgeResult<BackupOutcome> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        let scripted: Vec<BackupEvent> = self.scripted_events.lock().await.drain(..).collect();
        for event in scripted {
            events.send(event).await.ok();
        }
        let hold = *self.hold.lock().await;
        if let Some(duration) = hold {
            tokio::time::sleep(duration).await;
        }
        Ok(self.outcome.lock().await.clone())
    }

    async fn check_backup_status(&self, _udid: &str) -> BridgeResult<BackupStatus> {
        Ok(self.status.lock().await.clone())
    }

    async fn cancel_backup(&self) -> BridgeResult<()> {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Mock decryptor that records decrypt and cleanup requests.
struct MockDecryptor {
    encrypted: AsyncMutex<bool>,
    outcome: AsyncMutex<DecryptionOutcome>,
    decrypt_requests: AsyncMutex<Vec<(PathBuf, String)>>,
    cleanup_paths: AsyncMutex<Vec<PathBuf>>,
}

impl MockDecryptor {
    fn new() -> Self {
        Self {
            encrypted: AsyncMutex::new(false),
            outcome: AsyncMutex::new(DecryptionOutcome {
                success: true,
                decrypted_path: None,
                error: None,
            }),
            decrypt_requests: AsyncMutex::new(Vec::new()),
            cleanup_paths: AsyncMutex::new(Vec::new()),
        }
    }

    async fn set_encrypted(&self, encrypted: bool) {
        *self.encrypted.lock().await = encrypted;
    }

    async fn set_outcome(&self, outcome: DecryptionOutcome) {
        *self.outcome.lock().await = outcome;
    }

    async fn decrypt_requests(&self) -> Vec<(PathBuf, String)> {
        self.decrypt_requests.lock().await.clone()
    }

    async fn cleanup_paths(&self) -> Vec<PathBuf> {
        self.cleanup_paths.lock().await.clone()
    }
}

#[async_trait]
impl BackupDecryptor for MockDecryptor {
    async fn decrypt_backup(
        &self,
        backup_path: &Path,
        password: &str,
    ) -> BridgeResult<DecryptionOutcome> {
        self.decrypt_requests
            .lock()
            .await
            .push((backup_path.to_path_buf(), password.to_string()));
        Ok(self.outcome.lock().await.clone())
    }

    async fn is_backup_encrypted(&self, _backup_path: &Path) -> BridgeResult<bool> {
        Ok(*self.encrypted.lock().await)
    }

    async fn cleanup(&self, decrypted_path: &Path) -> BridgeResult<()> {
        self.cleanup_paths
            .lock()
            .await
            .push(decrypted_path.to_path_buf());
        Ok(())
    }
}

/// Mock message store with scripted conversations and per-chat messages.
struct MockMessageStore {
    conversations: AsyncMutex<Vec<Conversation>>,
    messages: AsyncMutex<HashMap<i64, Vec<Message>>>,
    opened_paths: AsyncMutex<Vec<PathBuf>>,
    close_calls: AtomicUsize,
    messages_delay: AsyncMutex<Option<Duration>>,
    first_messages_signal: AsyncMutex<Option<oneshot::Sender<()>>>,
}

impl MockMessageStore {
    fn new() -> Self {
        Self {
            conversations: AsyncMutex::new(Vec::new()),
            messages: AsyncMutex::new(HashMap::new()),
            opened_paths: AsyncMutex::new(Vec::new()),
            close_calls: AtomicUsize::new(0),
            messages_delay: AsyncMutex::new(None),
            first_messages_signal: AsyncMutex::new(None),
        }
    }

    async fn set_conversations(&self, conversations: Vec<Conversation>) {
        *self.conversations.lock().await = conversations;
    }

    async fn set_messages(&self, chat_id: i64, messages: Vec<Message>) {
        self.messages.lock().await.insert(chat_id, messages);
    }

    /// Delay every `messages` call, leaving a window for cancellation.
    async fn set_messages_delay(&self, delay: Duration) {
        *self.messages_delay.lock().await = Some(delay);
    }

    /// Fire once when the first `messages` call arrives.
    async fn set_messages_signal(&self, signal: oneshot::Sender<()>) {
        *self.first_messages_signal.lock().await = Some(signal);
    }

    async fn opened_paths(&self) -> Vec<PathBuf> {
        self.opened_paths.lock().await.clone()
    }

    fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageStore for MockMessageStore {
    async fn open(&self, backup_path: &Path) -> BridgeResult<()> {
        self.opened_paths
            .lock()
            .await
            .push(backup_path.to_path_buf());
        Ok(())
    }

    async fn conversations(&self) -> BridgeResult<Vec<Conversation>> {
        Ok(self.conversations.lock().await.clone())
    }

    async fn messages(&self, chat_id: i64) -> BridgeResult<Vec<Message>> {
        if let Some(signal) = self.first_messages_signal.lock().await.take() {
            signal.send(()).ok();
        }
        let delay = *self.messages_delay.lock().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self
            .messages
            .lock()
            .await
            .get(&chat_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn close(&self) -> BridgeResult<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct MockDiskProbe {
    available: u64,
}

#[async_trait]
impl DiskProbe for MockDiskProbe {
    async fn available_space(&self, _path: &Path) -> BridgeResult<u64> {
        Ok(self.available)
    }
}

/// The watcher runs in mock-device mode and never reaches its runner.
struct UnusedRunner;

#[async_trait]
impl CommandRunner for UnusedRunner {
    async fn run(&self, program: &str, _args: &[&str]) -> BridgeResult<CommandOutput> {
        Err(BridgeError::NotAvailable(program.to_string()))
    }
}

// ============================================================================
// Test Utilities
// ============================================================================

struct Pipeline {
    orchestrator: Arc<SyncOrchestrator>,
    engine: Arc<MockBackupEngine>,
    decryptor: Arc<MockDecryptor>,
    message_store: Arc<MockMessageStore>,
    bus: EventBus,
    backup_root: PathBuf,
    _dir: TempDir,
}

async fn setup_pipeline() -> Pipeline {
    let dir = TempDir::new().unwrap();
    let backup_root = dir.path().to_path_buf();

    let engine = Arc::new(MockBackupEngine::new());
    let decryptor = Arc::new(MockDecryptor::new());
    let message_store = Arc::new(MockMessageStore::new());
    let bus = EventBus::new(100);

    let watcher = Arc::new(DeviceWatcher::new(
        Arc::new(UnusedRunner),
        bus.clone(),
        WatcherConfig::default().with_mock_device(true),
    ));

    let orchestrator = Arc::new(SyncOrchestrator::new(
        SyncConfig::new(backup_root.clone()),
        engine.clone(),
        decryptor.clone(),
        message_store.clone(),
        watcher,
        Arc::new(MockDiskProbe {
            available: 500_000_000_000,
        }),
        bus.clone(),
    ));

    Pipeline {
        orchestrator,
        engine,
        decryptor,
        message_store,
        bus,
        backup_root,
        _dir: dir,
    }
}

const CONTACTS_SCHEMA: [&str; 3] = [
    "CREATE TABLE ABPerson (ROWID INTEGER PRIMARY KEY, First TEXT, Last TEXT, \
     Organization TEXT)",
    "CREATE TABLE ABMultiValue (ROWID INTEGER PRIMARY KEY, record_id INTEGER, \
     property INTEGER, label INTEGER, value TEXT)",
    "CREATE TABLE ABMultiValueLabel (ROWID INTEGER PRIMARY KEY, value TEXT)",
];

/// Seed a contacts database at its hashed location inside `backup`:
/// John Doe (mobile +1 (555) 123-4567, john@example.com) and Jane Smith.
async fn seed_contacts_db(backup: &Path) {
    let db_path = path_for_hash(backup, CONTACTS_DB_HASH);
    std::fs::create_dir_all(db_path.parent().unwrap()).unwrap();

    let options = SqliteConnectOptions::new()
        .filename(&db_path)
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .unwrap();

    let rows = [
        "INSERT INTO ABMultiValueLabel (ROWID, value) VALUES (1, '_$!<Mobile>!$_')",
        "INSERT INTO ABPerson (ROWID, First, Last, Organization) VALUES (1, 'John', 'Doe', NULL)",
        "INSERT INTO ABMultiValue (ROWID, record_id, property, label, value) \
         VALUES (1, 1, 3, 1, '+1 (555) 123-4567')",
        "INSERT INTO ABMultiValue (ROWID, record_id, property, label, value) \
         VALUES (2, 1, 4, NULL, 'john@example.com')",
        "INSERT INTO ABPerson (ROWID, First, Last, Organization) VALUES (2, 'Jane', 'Smith', NULL)",
        "INSERT INTO ABMultiValue (ROWID, record_id, property, label, value) \
         VALUES (3, 2, 3, 1, '+44 20 7946 0958')",
    ];
    for statement in CONTACTS_SCHEMA.iter().chain(rows.iter()) {
        sqlx::query(statement).execute(&pool).await.unwrap();
    }
    pool.close().await;
}

fn completed_status(size_bytes: u64) -> BackupStatus {
    BackupStatus {
        exists: true,
        is_complete: true,
        is_corrupted: false,
        size_bytes,
        last_modified: None,
    }
}

fn conversation(chat_id: i64, participants: &[&str]) -> Conversation {
    Conversation {
        chat_id,
        display_name: None,
        participants: participants.iter().map(|p| p.to_string()).collect(),
    }
}

fn message(id: i64, chat_id: i64, sender: Option<&str>, text: &str) -> Message {
    Message {
        id,
        chat_id,
        sender: sender.map(str::to_string),
        sender_name: None,
        text: Some(text.to_string()),
        timestamp: 1_700_000_000 + id,
        is_from_me: sender.is_none(),
    }
}

fn drain_sync_events(receiver: &mut Receiver<CoreEvent>) -> Vec<SyncEvent> {
    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        if let CoreEvent::Sync(sync_event) = event {
            events.push(sync_event);
        }
    }
    events
}

fn phase_changes(events: &[SyncEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            SyncEvent::PhaseChanged { phase, .. } => Some(phase.clone()),
            _ => None,
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_fresh_sync_parses_and_resolves() {
    let pipeline = setup_pipeline().await;
    let device_dir = pipeline.backup_root.join("udid-1");
    seed_contacts_db(&device_dir).await;

    pipeline
        .engine
        .set_outcome(BackupOutcome {
            success: true,
            backup_path: Some(device_dir.clone()),
            is_encrypted: false,
            error: None,
        })
        .await;
    pipeline
        .engine
        .set_events(vec![
            BackupEvent::WaitingForPasscode,
            BackupEvent::PasscodeEntered,
            BackupEvent::Progress {
                percent: 50,
                bytes_transferred: Some(24_000_000_000),
                total_bytes: Some(48_000_000_000),
                detail: Some("Copied 24.0 GB of 48.0 GB".to_string()),
            },
        ])
        .await;

    pipeline
        .message_store
        .set_conversations(vec![
            conversation(1, &["+1 (555) 123-4567"]),
            conversation(2, &["unknown@nowhere.example", "5551234567"]),
        ])
        .await;
    pipeline
        .message_store
        .set_messages(
            1,
            vec![
                message(10, 1, Some("+15551234567"), "hey"),
                message(11, 1, None, "hi yourself"),
            ],
        )
        .await;
    pipeline
        .message_store
        .set_messages(2, vec![message(12, 2, Some("unknown@nowhere.example"), "hello")])
        .await;

    let mut events = pipeline.bus.subscribe();
    let result = pipeline.orchestrator.sync(SyncOptions::new("udid-1")).await;

    assert!(result.success, "sync failed: {:?}", result.error);
    assert_eq!(result.contacts.len(), 2);
    assert_eq!(result.conversations.len(), 2);
    assert_eq!(result.messages.len(), 3);

    // Participants and senders resolve against parsed contacts; unmatched
    // handles stay raw.
    assert_eq!(result.conversations[0].participants, vec!["John Doe"]);
    assert_eq!(
        result.conversations[1].participants,
        vec!["unknown@nowhere.example".to_string(), "John Doe".to_string()]
    );
    assert_eq!(result.messages[0].sender_name.as_deref(), Some("John Doe"));
    assert!(result.messages[1].sender_name.is_none());
    assert!(result.messages[2].sender_name.is_none());

    assert_eq!(
        pipeline.orchestrator.current_phase().await,
        SyncPhase::Complete
    );
    assert!(!pipeline.orchestrator.is_running().await);
    assert_eq!(pipeline.engine.start_calls(), 1);
    assert_eq!(pipeline.message_store.close_calls(), 1);

    let events = drain_sync_events(&mut events);
    assert_eq!(
        phase_changes(&events),
        vec![
            "backup",
            "parsing-contacts",
            "parsing-messages",
            "resolving",
            "cleanup",
            "complete"
        ]
    );
    // Engine chatter is forwarded as typed events.
    assert!(events
        .iter()
        .any(|event| matches!(event, SyncEvent::WaitingForPasscode { udid, .. } if udid == "udid-1")));
    assert!(events
        .iter()
        .any(|event| matches!(event, SyncEvent::PasscodeEntered { udid, .. } if udid == "udid-1")));
    assert!(events.iter().any(|event| matches!(
        event,
        SyncEvent::Progress { phase, transfer_detail: Some(detail), .. }
            if phase == "backup" && detail.contains("24.0 GB")
    )));
    assert!(events.iter().any(|event| matches!(
        event,
        SyncEvent::Completed {
            message_count: 3,
            contact_count: 2,
            conversation_count: 2,
            ..
        }
    )));
}

#[tokio::test]
async fn test_second_request_rejected_while_active() {
    let pipeline = setup_pipeline().await;
    pipeline.engine.set_hold(Duration::from_secs(30)).await;

    let first = {
        let orchestrator = pipeline.orchestrator.clone();
        tokio::spawn(async move { orchestrator.sync(SyncOptions::new("udid-1")).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(pipeline.orchestrator.is_running().await);

    let second = pipeline.orchestrator.sync(SyncOptions::new("udid-1")).await;
    assert!(!second.success);
    assert_eq!(second.error.as_deref(), Some("Sync already in progress"));
    // The active run kept the engine to itself.
    assert_eq!(pipeline.engine.start_calls(), 1);

    pipeline.orchestrator.cancel_sync().await;
    let first = first.await.unwrap();
    assert!(!first.success);
    assert_eq!(first.error.as_deref(), Some("Sync cancelled by user"));
    assert_eq!(pipeline.engine.cancel_calls(), 1);
    assert_eq!(pipeline.orchestrator.current_phase().await, SyncPhase::Error);
}

#[tokio::test]
async fn test_fresh_encrypted_backup_without_password() {
    let pipeline = setup_pipeline().await;
    let device_dir = pipeline.backup_root.join("udid-1");

    pipeline
        .engine
        .set_outcome(BackupOutcome {
            success: true,
            backup_path: Some(device_dir),
            is_encrypted: true,
            error: None,
        })
        .await;

    let mut events = pipeline.bus.subscribe();
    let result = pipeline.orchestrator.sync(SyncOptions::new("udid-1")).await;

    assert!(!result.success);
    assert_eq!(
        result.error.as_deref(),
        Some("Password required for encrypted backup")
    );
    // Nothing opened the backup.
    assert!(pipeline.message_store.opened_paths().await.is_empty());
    assert!(pipeline.decryptor.decrypt_requests().await.is_empty());
    assert_eq!(pipeline.orchestrator.current_phase().await, SyncPhase::Error);

    let events = drain_sync_events(&mut events);
    assert!(events
        .iter()
        .any(|event| matches!(event, SyncEvent::PasswordRequired { udid, .. } if udid == "udid-1")));
    assert!(events.iter().any(|event| matches!(
        event,
        SyncEvent::Failed { message, .. } if message == "Password required for encrypted backup"
    )));
}

#[tokio::test]
async fn test_existing_encrypted_backup_decrypts_into_working_copy() {
    let pipeline = setup_pipeline().await;
    let device_dir = pipeline.backup_root.join("udid-7");
    std::fs::create_dir_all(&device_dir).unwrap();
    let decrypted_dir = pipeline.backup_root.join("udid-7-decrypted");
    seed_contacts_db(&decrypted_dir).await;

    pipeline.engine.set_status(completed_status(1_000_000_000)).await;
    pipeline.decryptor.set_encrypted(true).await;
    pipeline
        .decryptor
        .set_outcome(DecryptionOutcome {
            success: true,
            decrypted_path: Some(decrypted_dir.clone()),
            error: None,
        })
        .await;
    pipeline
        .message_store
        .set_conversations(vec![conversation(1, &["+15551234567"])])
        .await;
    pipeline
        .message_store
        .set_messages(1, vec![message(1, 1, Some("+15551234567"), "secret")])
        .await;

    let mut events = pipeline.bus.subscribe();
    let result = pipeline
        .orchestrator
        .process_existing_backup("udid-7", Some("hunter2".to_string()))
        .await;

    assert!(result.success, "sync failed: {:?}", result.error);
    assert_eq!(result.messages[0].sender_name.as_deref(), Some("John Doe"));

    // The password reached the decryptor against the original directory,
    // parsing ran on the working copy, and the copy was handed back.
    assert_eq!(
        pipeline.decryptor.decrypt_requests().await,
        vec![(device_dir, "hunter2".to_string())]
    );
    assert_eq!(
        pipeline.message_store.opened_paths().await,
        vec![decrypted_dir.clone()]
    );
    assert_eq!(pipeline.decryptor.cleanup_paths().await, vec![decrypted_dir]);
    assert_eq!(pipeline.engine.start_calls(), 0);

    let events = drain_sync_events(&mut events);
    assert_eq!(
        phase_changes(&events),
        vec![
            "decrypting",
            "parsing-contacts",
            "parsing-messages",
            "resolving",
            "cleanup",
            "complete"
        ]
    );
}

#[tokio::test]
async fn test_existing_unencrypted_backup_skips_acquisition() {
    let pipeline = setup_pipeline().await;
    let device_dir = pipeline.backup_root.join("udid-5");
    seed_contacts_db(&device_dir).await;

    pipeline.engine.set_status(completed_status(2_000_000_000)).await;
    pipeline
        .message_store
        .set_conversations(vec![conversation(1, &["2079460958"])])
        .await;
    pipeline
        .message_store
        .set_messages(1, vec![message(1, 1, Some("+442079460958"), "cheers")])
        .await;

    let mut events = pipeline.bus.subscribe();
    let result = pipeline
        .orchestrator
        .process_existing_backup("udid-5", None)
        .await;

    assert!(result.success, "sync failed: {:?}", result.error);
    assert_eq!(result.conversations[0].participants, vec!["Jane Smith"]);
    assert_eq!(result.messages[0].sender_name.as_deref(), Some("Jane Smith"));
    assert_eq!(pipeline.engine.start_calls(), 0);
    assert_eq!(
        pipeline.message_store.opened_paths().await,
        vec![device_dir]
    );

    let events = drain_sync_events(&mut events);
    assert_eq!(
        phase_changes(&events),
        vec![
            "parsing-contacts",
            "parsing-messages",
            "resolving",
            "cleanup",
            "complete"
        ]
    );
}

#[tokio::test]
async fn test_cancel_during_message_parsing_still_cleans_up() {
    let pipeline = setup_pipeline().await;
    let device_dir = pipeline.backup_root.join("udid-3");
    seed_contacts_db(&device_dir).await;

    pipeline.engine.set_status(completed_status(1_000_000_000)).await;
    pipeline
        .message_store
        .set_conversations(vec![
            conversation(1, &["+15551234567"]),
            conversation(2, &["john@example.com"]),
            conversation(3, &["2079460958"]),
        ])
        .await;
    pipeline
        .message_store
        .set_messages(1, vec![message(1, 1, Some("+15551234567"), "first")])
        .await;
    pipeline
        .message_store
        .set_messages_delay(Duration::from_millis(200))
        .await;
    let (signal, first_messages_call) = oneshot::channel();
    pipeline.message_store.set_messages_signal(signal).await;

    let mut events = pipeline.bus.subscribe();
    let handle = {
        let orchestrator = pipeline.orchestrator.clone();
        tokio::spawn(async move { orchestrator.process_existing_backup("udid-3", None).await })
    };

    first_messages_call.await.unwrap();
    pipeline.orchestrator.cancel_sync().await;
    let result = handle.await.unwrap();

    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("Sync cancelled by user"));
    assert!(result.messages.is_empty());
    // Parsers were still closed on the way out.
    assert_eq!(pipeline.message_store.close_calls(), 1);
    assert!(pipeline.decryptor.cleanup_paths().await.is_empty());
    assert_eq!(pipeline.orchestrator.current_phase().await, SyncPhase::Error);

    let events = drain_sync_events(&mut events);
    assert!(events.iter().any(|event| matches!(
        event,
        SyncEvent::Failed { message, .. } if message == "Sync cancelled by user"
    )));
}

#[tokio::test]
async fn test_cancel_after_decryption_still_removes_working_copy() {
    let pipeline = setup_pipeline().await;
    let device_dir = pipeline.backup_root.join("udid-9");
    std::fs::create_dir_all(&device_dir).unwrap();
    let decrypted_dir = pipeline.backup_root.join("udid-9-decrypted");
    seed_contacts_db(&decrypted_dir).await;

    pipeline.engine.set_status(completed_status(1_000_000_000)).await;
    pipeline.decryptor.set_encrypted(true).await;
    pipeline
        .decryptor
        .set_outcome(DecryptionOutcome {
            success: true,
            decrypted_path: Some(decrypted_dir.clone()),
            error: None,
        })
        .await;
    pipeline
        .message_store
        .set_conversations(vec![
            conversation(1, &["+15551234567"]),
            conversation(2, &["john@example.com"]),
        ])
        .await;
    pipeline
        .message_store
        .set_messages(1, vec![message(1, 1, Some("+15551234567"), "first")])
        .await;
    pipeline
        .message_store
        .set_messages_delay(Duration::from_millis(200))
        .await;
    let (signal, first_messages_call) = oneshot::channel();
    pipeline.message_store.set_messages_signal(signal).await;

    let handle = {
        let orchestrator = pipeline.orchestrator.clone();
        tokio::spawn(async move {
            orchestrator
                .process_existing_backup("udid-9", Some("hunter2".to_string()))
                .await
        })
    };

    first_messages_call.await.unwrap();
    pipeline.orchestrator.cancel_sync().await;
    let result = handle.await.unwrap();

    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("Sync cancelled by user"));
    assert_eq!(pipeline.message_store.close_calls(), 1);
    // The decrypted working copy is handed back even though the sync failed.
    assert_eq!(pipeline.decryptor.cleanup_paths().await, vec![decrypted_dir]);
    assert_eq!(pipeline.orchestrator.current_phase().await, SyncPhase::Error);
}

#[tokio::test]
async fn test_force_reset_recovers_for_the_next_run() {
    let pipeline = setup_pipeline().await;
    pipeline.engine.set_hold(Duration::from_secs(30)).await;

    let first = {
        let orchestrator = pipeline.orchestrator.clone();
        tokio::spawn(async move { orchestrator.sync(SyncOptions::new("udid-1")).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    pipeline.orchestrator.force_reset().await;
    assert!(!pipeline.orchestrator.is_running().await);

    let first = first.await.unwrap();
    assert!(!first.success);
    assert_eq!(first.error.as_deref(), Some("Sync cancelled by user"));

    // The machine accepts work again.
    let device_dir = pipeline.backup_root.join("udid-1");
    seed_contacts_db(&device_dir).await;
    pipeline.engine.set_status(completed_status(1_000_000_000)).await;

    let result = pipeline
        .orchestrator
        .process_existing_backup("udid-1", None)
        .await;
    assert!(result.success, "sync failed: {:?}", result.error);
    assert_eq!(
        pipeline.orchestrator.current_phase().await,
        SyncPhase::Complete
    );
}
