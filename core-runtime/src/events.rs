//! # Event Bus
//!
//! Event-driven notification layer for the sync pipeline, built on
//! `tokio::sync::broadcast`. Device detection and the sync workflow publish
//! typed events here; hosts subscribe to drive their UI or automation. One
//! bus serves the whole pipeline, so a single subscriber sees device
//! attach/detach interleaved with sync progress in emission order.
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{EventBus, CoreEvent, DeviceEvent};
//!
//! # let bus = EventBus::new(100);
//! let event = CoreEvent::Device(DeviceEvent::Disconnected {
//!     udid: "00008110-000A2D903C8A801E".to_string(),
//! });
//!
//! bus.emit(event).ok();
//! ```
//!
//! Consumers that only care about one category wrap their receiver in an
//! [`EventStream`] with a predicate:
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, EventStream};
//!
//! # let bus = EventBus::new(100);
//! let sync_only = EventStream::new(bus.subscribe())
//!     .filter(|event| matches!(event, CoreEvent::Sync(_)));
//! ```
//!
//! ## Event Types
//!
//! ### Device Events
//! - `Connected`: a device appeared in a poll cycle
//! - `Disconnected`: a previously seen device vanished
//!
//! ### Sync Events
//! - `PhaseChanged`: workflow moved to a new phase
//! - `Progress`: weighted progress update within the current phase
//! - `PasswordRequired`: encrypted backup needs a password to continue
//! - `WaitingForPasscode` / `PasscodeEntered`: on-device confirmation
//! - `Failed`: the run ended with an error
//! - `Completed`: the run finished and produced a result
//!
//! ## Delivery semantics
//!
//! Broadcast fan-out clones each event per subscriber and never blocks the
//! emitter. A receiver that falls more than the buffer size behind gets
//! `RecvError::Lagged(n)` with the number of dropped events and then
//! continues from the oldest retained one; `RecvError::Closed` means every
//! sender is gone and the pipeline is shutting down. The bus itself is
//! `Send + Sync`; clone it or wrap it in `Arc` to share, clones feed the
//! same channel.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::TryRecvError;

// Re-exported so subscribers match on receive errors without naming tokio
pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Channel capacity used by [`EventBus::default`].
///
/// Big enough to absorb a burst of per-conversation progress updates;
/// anything slower than that is expected to tolerate `Lagged`.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Every event the pipeline publishes, grouped by producing component.
///
/// Serialized with an adjacent tag so hosts can route on `type` before
/// looking at the payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Device attach/detach events
    Device(DeviceEvent),
    /// Sync workflow events
    Sync(SyncEvent),
}

impl CoreEvent {
    /// Short operator-facing label, stable across payload details.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Device(e) => e.description(),
            CoreEvent::Sync(e) => e.description(),
        }
    }

    /// Coarse level used when mirroring events into log output.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Sync(SyncEvent::Failed { .. }) => EventSeverity::Error,
            CoreEvent::Sync(SyncEvent::PasswordRequired { .. }) => EventSeverity::Warning,
            CoreEvent::Sync(SyncEvent::WaitingForPasscode { .. }) => EventSeverity::Warning,
            CoreEvent::Device(_) => EventSeverity::Info,
            CoreEvent::Sync(SyncEvent::PhaseChanged { .. }) => EventSeverity::Info,
            CoreEvent::Sync(SyncEvent::Completed { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Coarse severity attached to every event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    /// Verbose progress noise
    Debug,
    /// Routine lifecycle events
    Info,
    /// The run needs operator input to continue
    Warning,
    /// The run ended in failure
    Error,
}

// ============================================================================
// Device Events
// ============================================================================

/// Events emitted by the device watcher's poll cycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum DeviceEvent {
    /// A device was observed for the first time.
    Connected {
        /// Unique device identifier.
        udid: String,
        /// User-visible device name.
        name: String,
        /// Hardware model identifier (e.g., "iPhone14,2").
        product_type: String,
        /// OS version string.
        product_version: String,
    },
    /// A previously observed device is no longer attached.
    Disconnected {
        /// Unique device identifier.
        udid: String,
    },
}

impl DeviceEvent {
    fn description(&self) -> &str {
        match self {
            DeviceEvent::Connected { .. } => "Device connected",
            DeviceEvent::Disconnected { .. } => "Device disconnected",
        }
    }
}

// ============================================================================
// Sync Events
// ============================================================================

/// Events emitted by the sync workflow.
///
/// `sync_id` identifies one workflow invocation, so subscribers can tell
/// overlapping runs apart across orchestrator instances.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SyncEvent {
    /// The workflow moved to a new phase.
    PhaseChanged {
        /// The sync invocation ID.
        sync_id: String,
        /// Kebab-case phase name (e.g., "parsing-contacts").
        phase: String,
    },
    /// Weighted progress update inside the current phase.
    ///
    /// Never emitted outside the phase named in `phase`.
    Progress {
        /// The sync invocation ID.
        sync_id: String,
        /// Phase the update belongs to.
        phase: String,
        /// Progress within the phase (0-100).
        percent: u8,
        /// Composite progress across the whole workflow (0-100).
        overall_percent: u8,
        /// Human-readable status line.
        message: String,
        /// Raw transfer detail from the backup engine, when available.
        transfer_detail: Option<String>,
        /// Estimated total bytes for the backup, when known.
        estimated_total_bytes: Option<u64>,
    },
    /// The backup is encrypted and no password was supplied.
    PasswordRequired {
        /// The sync invocation ID.
        sync_id: String,
        /// Device whose backup needs a password.
        udid: String,
    },
    /// The device is waiting for the user to enter their passcode.
    WaitingForPasscode {
        /// The sync invocation ID.
        sync_id: String,
        /// Device asking for confirmation.
        udid: String,
    },
    /// The user entered the passcode; the transfer resumes.
    PasscodeEntered {
        /// The sync invocation ID.
        sync_id: String,
        /// Device that was confirmed.
        udid: String,
    },
    /// The workflow ended with an error.
    Failed {
        /// The sync invocation ID.
        sync_id: String,
        /// Operator-facing failure text.
        message: String,
    },
    /// The workflow finished and produced a result.
    Completed {
        /// The sync invocation ID.
        sync_id: String,
        /// Messages extracted.
        message_count: u64,
        /// Contacts extracted.
        contact_count: u64,
        /// Conversations extracted.
        conversation_count: u64,
        /// Wall-clock duration of the run in milliseconds.
        duration_ms: u64,
    },
}

impl SyncEvent {
    fn description(&self) -> &str {
        match self {
            SyncEvent::PhaseChanged { .. } => "Sync phase changed",
            SyncEvent::Progress { .. } => "Sync progress update",
            SyncEvent::PasswordRequired { .. } => "Backup password required",
            SyncEvent::WaitingForPasscode { .. } => "Waiting for device passcode",
            SyncEvent::PasscodeEntered { .. } => "Device passcode entered",
            SyncEvent::Failed { .. } => "Sync failed",
            SyncEvent::Completed { .. } => "Sync completed",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Broadcast hub every pipeline component publishes into.
///
/// A thin handle over a `tokio::sync::broadcast` channel: any number of
/// producers (clone the bus), any number of consumers (each `subscribe()`
/// is independent), and slow consumers lag instead of blocking emitters.
///
/// # Example
///
/// ```rust
/// use core_runtime::events::{EventBus, CoreEvent, DeviceEvent};
///
/// # #[tokio::main]
/// # async fn main() {
/// let bus = EventBus::new(100);
/// let mut subscriber = bus.subscribe();
///
/// let event = CoreEvent::Device(DeviceEvent::Disconnected {
///     udid: "udid-1".to_string(),
/// });
/// bus.emit(event).ok();
/// # }
/// ```
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Bus whose channel retains `capacity` events for slow subscribers.
    ///
    /// `capacity` bounds how far a subscriber may fall behind before its
    /// next receive reports `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Equivalent to [`EventBus::new`] with [`DEFAULT_EVENT_BUFFER_SIZE`].
    #[allow(clippy::should_implement_trait)]
    pub fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }

    /// Publishes an event to all current subscribers.
    ///
    /// Returns how many subscribers received it, or an error when nobody is
    /// listening (callers that do not care use `.ok()`).
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber.
    ///
    /// The receiver sees every event emitted after this call; nothing is
    /// replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Number of receivers currently attached.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

/// Predicate applied by filtered streams.
type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A `broadcast::Receiver` with an optional predicate in front of it.
///
/// Saves call sites that watch one event category from re-matching every
/// variant on each receive.
///
/// # Example
///
/// ```rust
/// use core_runtime::events::{EventBus, EventStream, CoreEvent};
///
/// let bus = EventBus::new(100);
///
/// // Device events only
/// let device_stream = EventStream::new(bus.subscribe())
///     .filter(|event| matches!(event, CoreEvent::Device(_)));
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    /// Wraps a raw receiver with no filter installed.
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Restricts the stream to events matching `predicate`.
    ///
    /// Events rejected by the predicate are silently skipped by `recv()`
    /// and `try_recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |predicate| predicate(event))
    }

    /// Receives the next event that passes the filter.
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n`
    /// events. Returns `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Non-blocking variant of [`recv`](Self::recv).
    ///
    /// Drains rejected events in place and returns `None` once nothing
    /// matching is buffered.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.accepts(&event) => return Some(Ok(event)),
                Ok(_) => continue,
                Err(TryRecvError::Empty) => return None,
                Err(TryRecvError::Lagged(n)) => return Some(Err(RecvError::Lagged(n))),
                Err(TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn connected(udid: &str) -> CoreEvent {
        CoreEvent::Device(DeviceEvent::Connected {
            udid: udid.to_string(),
            name: "Test Phone".to_string(),
            product_type: "iPhone14,2".to_string(),
            product_version: "17.4".to_string(),
        })
    }

    fn progress(phase: &str, percent: u8, overall: u8) -> CoreEvent {
        CoreEvent::Sync(SyncEvent::Progress {
            sync_id: "sync-1".to_string(),
            phase: phase.to_string(),
            percent,
            overall_percent: overall,
            message: format!("Phase {}", phase),
            transfer_detail: None,
            estimated_total_bytes: None,
        })
    }

    #[tokio::test]
    async fn test_subscriber_count_tracks_subscriptions() {
        let bus = EventBus::new(10);
        assert_eq!(bus.subscriber_count(), 0);

        let sub1 = bus.subscribe();
        let _sub2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        drop(sub1);
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn test_emit_without_subscribers_errs() {
        let bus = EventBus::new(10);
        assert!(bus.emit(connected("udid-1")).is_err());
    }

    #[tokio::test]
    async fn test_emit_reports_receiver_count() {
        let bus = EventBus::new(10);
        let mut sub = bus.subscribe();

        let event = connected("udid-1");
        assert_eq!(bus.emit(event.clone()).unwrap(), 1);
        assert_eq!(sub.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_subscriber() {
        let bus = EventBus::new(10);
        let mut sub1 = bus.subscribe();
        let mut sub2 = bus.subscribe();

        let event = CoreEvent::Sync(SyncEvent::PhaseChanged {
            sync_id: "sync-1".to_string(),
            phase: "backup".to_string(),
        });

        bus.emit(event.clone()).ok();

        assert_eq!(sub1.recv().await.unwrap(), event);
        assert_eq!(sub2.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_stream_filter_selects_matching_category() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe())
            .filter(|event| matches!(event, CoreEvent::Device(_)));

        // Sync event should be filtered out
        bus.emit(progress("backup", 10, 6)).ok();

        // Device event should pass through
        let device_event = connected("udid-2");
        bus.emit(device_event.clone()).ok();

        assert_eq!(stream.recv().await.unwrap(), device_event);
    }

    #[tokio::test]
    async fn test_slow_subscriber_observes_lag() {
        let bus = EventBus::new(2); // small enough to overflow quickly
        let mut sub = bus.subscribe();

        for i in 0..5 {
            bus.emit(connected(&format!("udid-{}", i))).ok();
        }

        // The next recv reports the overrun before delivery resumes
        let result = sub.recv().await;
        assert!(matches!(result, Err(RecvError::Lagged(_))));
    }

    #[tokio::test]
    async fn test_severity_mapping() {
        let error_event = CoreEvent::Sync(SyncEvent::Failed {
            sync_id: "sync-1".to_string(),
            message: "Backup failed".to_string(),
        });
        assert_eq!(error_event.severity(), EventSeverity::Error);

        let warning_event = CoreEvent::Sync(SyncEvent::PasswordRequired {
            sync_id: "sync-1".to_string(),
            udid: "udid-1".to_string(),
        });
        assert_eq!(warning_event.severity(), EventSeverity::Warning);

        assert_eq!(connected("udid-1").severity(), EventSeverity::Info);
        assert_eq!(
            progress("resolving", 50, 92).severity(),
            EventSeverity::Debug
        );
    }

    #[tokio::test]
    async fn test_description_labels() {
        let event = CoreEvent::Sync(SyncEvent::Completed {
            sync_id: "sync-1".to_string(),
            message_count: 120,
            contact_count: 42,
            conversation_count: 7,
            duration_ms: 61_000,
        });
        assert_eq!(event.description(), "Sync completed");
        assert_eq!(connected("udid-1").description(), "Device connected");
    }

    #[tokio::test]
    async fn test_parallel_emitters_all_delivered() {
        let bus = EventBus::new(100);
        let mut sub = bus.subscribe();

        let bus1 = bus.clone();
        let bus2 = bus.clone();

        let handle1 = tokio::spawn(async move {
            for i in 0..10 {
                bus1.emit(connected(&format!("udid-{}", i))).ok();
            }
        });

        let handle2 = tokio::spawn(async move {
            for i in 0..10u8 {
                bus2.emit(progress("parsing-messages", i * 10, 75 + i)).ok();
            }
        });

        handle1.await.ok();
        handle2.await.ok();

        let mut count = 0;
        while sub.try_recv().is_ok() {
            count += 1;
        }
        assert_eq!(count, 20);
    }

    #[tokio::test]
    async fn test_adjacent_tag_serialization() {
        let event = CoreEvent::Sync(SyncEvent::Progress {
            sync_id: "sync-123".to_string(),
            phase: "backup".to_string(),
            percent: 50,
            overall_percent: 30,
            message: "Backing up device".to_string(),
            transfer_detail: Some("Copied 4.2 GiB of 8.4 GiB".to_string()),
            estimated_total_bytes: Some(9_000_000_000),
        });

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("sync-123"));
        assert!(json.contains("\"type\":\"Sync\""));
        assert!(json.contains("\"event\":\"Progress\""));

        let deserialized: CoreEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, event);
    }

    #[tokio::test]
    async fn test_try_recv_on_idle_bus() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe());

        assert!(stream.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_try_recv_skips_filtered_events() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe())
            .filter(|event| matches!(event, CoreEvent::Sync(SyncEvent::Failed { .. })));

        bus.emit(connected("udid-1")).ok();
        let failed = CoreEvent::Sync(SyncEvent::Failed {
            sync_id: "sync-1".to_string(),
            message: "Sync cancelled by user".to_string(),
        });
        bus.emit(failed.clone()).ok();

        let received = stream.try_recv().unwrap().unwrap();
        assert_eq!(received, failed);
        assert!(stream.try_recv().is_none());
    }
}
