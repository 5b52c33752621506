//! # Device Watcher Module
//!
//! ## Overview
//!
//! Detects device attach/detach by periodically invoking the external
//! identification tool and diffing the reported UDIDs against the set of
//! devices seen on the previous cycle. Newly seen devices are enriched with a
//! full info query before a `Connected` event fires; vanished devices are
//! dropped from the live set with a `Disconnected` event.
//!
//! ## Key Responsibilities
//!
//! - Poll the identification CLI on a timer with an enforced floor interval
//! - Maintain the in-memory set of currently connected devices
//! - Emit connect/disconnect notifications on the shared event bus
//! - Answer on-demand storage queries for a single device
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_device::{DeviceWatcher, WatcherConfig};
//! use core_runtime::EventBus;
//! use bridge_host::TokioCommandRunner;
//! use std::sync::Arc;
//!
//! let watcher = DeviceWatcher::new(
//!     Arc::new(TokioCommandRunner::new()),
//!     EventBus::default(),
//!     WatcherConfig::default(),
//! );
//! watcher.start(5000).await;
//! let devices = watcher.connected_devices().await;
//! watcher.stop().await;
//! ```

use crate::config::WatcherConfig;
use crate::device::{
    device_from_map, parse_key_values, storage_from_map, Device, DeviceStorageSnapshot,
};
use crate::error::{DeviceError, Result};
use bridge_traits::{BridgeError, CommandRunner};
use core_runtime::{CoreEvent, DeviceEvent, EventBus};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

// ============================================================================
// Constants
// ============================================================================

/// Flag passed to the identification tool to list attached UDIDs.
const LIST_FLAG: &str = "-l";

/// Query domain for per-device disk usage statistics.
const DISK_USAGE_DOMAIN: &str = "com.apple.disk_usage";

/// UDID reported when mock-device mode is enabled.
pub const MOCK_UDID: &str = "00008030-000C2DE40C29802E";

const MOCK_DEVICE_NAME: &str = "Simulated iPhone";
const MOCK_PRODUCT_TYPE: &str = "iPhone14,2";
const MOCK_PRODUCT_VERSION: &str = "17.4";
const MOCK_SERIAL_NUMBER: &str = "MOCKSERIAL001";
const MOCK_TOTAL_CAPACITY: u64 = 64_000_000_000;
const MOCK_AVAILABLE_SPACE: u64 = 32_000_000_000;

// ============================================================================
// Device Watcher
// ============================================================================

/// Handle to the spawned polling loop.
struct WatcherTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Watches for attached devices via the external identification tool.
pub struct DeviceWatcher {
    /// Runs the identification CLI
    runner: Arc<dyn CommandRunner>,

    /// Event bus for connect/disconnect notifications
    event_bus: EventBus,

    /// Tool names and polling parameters
    config: WatcherConfig,

    /// Devices seen on the most recent completed poll cycle, by UDID
    devices: Arc<RwLock<HashMap<String, Device>>>,

    /// Re-entrancy guard so a slow cycle is never run twice concurrently
    poll_in_flight: Arc<AtomicBool>,

    /// Set once the list tool is found to be unavailable; later polls
    /// short-circuit to an empty device list without re-invoking it
    tool_missing: Arc<AtomicBool>,

    /// Currently running polling loop, if any
    loop_task: Arc<Mutex<Option<WatcherTask>>>,
}

impl DeviceWatcher {
    /// Create a new watcher.
    ///
    /// The watcher is idle until [`start`](Self::start) is called; individual
    /// queries ([`list_devices`](Self::list_devices),
    /// [`get_device_info`](Self::get_device_info)) work without a running
    /// loop.
    pub fn new(runner: Arc<dyn CommandRunner>, event_bus: EventBus, config: WatcherConfig) -> Self {
        Self {
            runner,
            event_bus,
            config,
            devices: Arc::new(RwLock::new(HashMap::new())),
            poll_in_flight: Arc::new(AtomicBool::new(false)),
            tool_missing: Arc::new(AtomicBool::new(false)),
            loop_task: Arc::new(Mutex::new(None)),
        }
    }

    /// Begin polling for devices.
    ///
    /// The requested interval is clamped to the configured floor. One poll
    /// runs immediately before the timer loop starts, so callers observe the
    /// current device set without waiting a full interval. Calling `start`
    /// while already running stops the previous loop first.
    pub async fn start(&self, interval_ms: u64) {
        self.stop().await;

        let effective_ms = interval_ms.max(self.config.min_poll_interval_ms);
        if effective_ms != interval_ms {
            debug!(
                "Requested poll interval {}ms below floor, using {}ms",
                interval_ms, effective_ms
            );
        }
        info!("Starting device polling every {}ms", effective_ms);

        // First cycle runs inline so the device set is primed on return.
        self.poll_once().await;

        let cancel = CancellationToken::new();
        let loop_cancel = cancel.clone();
        let watcher = self.clone_for_task();

        let handle = tokio::spawn(async move {
            let period = Duration::from_millis(effective_ms);
            let mut ticker = time::interval_at(time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = loop_cancel.cancelled() => break,
                    _ = ticker.tick() => watcher.poll_once().await,
                }
            }
        });

        *self.loop_task.lock().await = Some(WatcherTask { cancel, handle });
    }

    /// Stop polling. Safe to call when not running.
    pub async fn stop(&self) {
        let task = self.loop_task.lock().await.take();
        if let Some(task) = task {
            task.cancel.cancel();
            let _ = task.handle.await;
            info!("Device polling stopped");
        }
    }

    /// Whether the polling loop is currently running.
    pub async fn is_running(&self) -> bool {
        self.loop_task.lock().await.is_some()
    }

    /// Snapshot of the devices seen on the last completed poll cycle.
    pub async fn connected_devices(&self) -> Vec<Device> {
        self.devices.read().await.values().cloned().collect()
    }

    /// List UDIDs of currently attached devices.
    ///
    /// A non-zero exit with empty output means "no devices", not a failure.
    /// If the tool itself is unavailable, the outcome is cached and every
    /// later call returns an empty list without re-invoking it.
    pub async fn list_devices(&self) -> Result<Vec<String>> {
        if self.config.mock_device {
            return Ok(vec![MOCK_UDID.to_string()]);
        }
        if self.tool_missing.load(Ordering::SeqCst) {
            return Ok(Vec::new());
        }

        let output = match self.runner.run(&self.config.list_program, &[LIST_FLAG]).await {
            Ok(output) => output,
            Err(BridgeError::NotAvailable(message)) => {
                warn!(
                    "Device list tool '{}' unavailable, disabling detection: {}",
                    self.config.list_program, message
                );
                self.tool_missing.store(true, Ordering::SeqCst);
                return Ok(Vec::new());
            }
            Err(e) => return Err(DeviceError::Bridge(e)),
        };

        // Exit status is deliberately ignored: the tool exits non-zero when
        // nothing is attached, with empty stdout.
        let udids = output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        Ok(udids)
    }

    /// Fetch the full info record for one device.
    ///
    /// A non-zero exit is a hard failure for this device only; poll cycles
    /// log it and continue with the remaining devices.
    pub async fn get_device_info(&self, udid: &str) -> Result<Device> {
        if self.config.mock_device && udid == MOCK_UDID {
            return Ok(mock_device());
        }

        let output = self
            .runner
            .run(&self.config.info_program, &["-u", udid])
            .await?;
        if !output.success() {
            return Err(DeviceError::InfoQueryFailed {
                udid: udid.to_string(),
                status: output.status,
            });
        }

        let map = parse_key_values(&output.stdout);
        Ok(device_from_map(udid, &map))
    }

    /// Fetch storage statistics for one device.
    ///
    /// Returns `None` on any failure; callers must tolerate absence.
    pub async fn get_device_storage_info(&self, udid: &str) -> Option<DeviceStorageSnapshot> {
        if self.config.mock_device && udid == MOCK_UDID {
            return Some(DeviceStorageSnapshot::from_capacity(
                MOCK_TOTAL_CAPACITY,
                MOCK_AVAILABLE_SPACE,
                self.config.estimate_ratio,
            ));
        }

        let output = match self
            .runner
            .run(
                &self.config.info_program,
                &["-u", udid, "-q", DISK_USAGE_DOMAIN],
            )
            .await
        {
            Ok(output) => output,
            Err(e) => {
                debug!("Storage query for {} failed: {}", udid, e);
                return None;
            }
        };
        if !output.success() {
            debug!(
                "Storage query for {} exited with status {:?}",
                udid, output.status
            );
            return None;
        }

        let map = parse_key_values(&output.stdout);
        Some(storage_from_map(&map, self.config.estimate_ratio))
    }

    /// Run one poll cycle unless another is already in flight.
    ///
    /// When a cycle is still running (a slow info query, typically), this
    /// tick is skipped rather than queued.
    pub async fn poll_once(&self) {
        if self
            .poll_in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Poll cycle already in flight, skipping tick");
            return;
        }

        self.poll_cycle().await;
        self.poll_in_flight.store(false, Ordering::SeqCst);
    }

    /// List, diff against the known set, and emit connect/disconnect events.
    async fn poll_cycle(&self) {
        let udids = match self.list_devices().await {
            Ok(udids) => udids,
            Err(e) => {
                warn!("Device list poll failed: {}", e);
                return;
            }
        };

        // The tool can report the same UDID twice (USB and network entries).
        let mut seen = HashSet::new();
        let udids: Vec<String> = udids
            .into_iter()
            .filter(|udid| seen.insert(udid.clone()))
            .collect();

        let known: HashSet<String> = self.devices.read().await.keys().cloned().collect();

        for udid in &udids {
            if known.contains(udid) {
                continue;
            }
            match self.get_device_info(udid).await {
                Ok(device) => {
                    info!("Device connected: {} ({})", device.name, udid);
                    self.devices
                        .write()
                        .await
                        .insert(udid.clone(), device.clone());
                    self.event_bus
                        .emit(CoreEvent::Device(DeviceEvent::Connected {
                            udid: device.udid,
                            name: device.name,
                            product_type: device.product_type,
                            product_version: device.product_version,
                        }))
                        .ok();
                }
                Err(e) => {
                    warn!("Failed to query info for {}: {}", udid, e);
                }
            }
        }

        for udid in known.difference(&seen) {
            if let Some(mut device) = self.devices.write().await.remove(udid) {
                device.connected = false;
                info!("Device disconnected: {} ({})", device.name, udid);
                self.event_bus
                    .emit(CoreEvent::Device(DeviceEvent::Disconnected {
                        udid: udid.clone(),
                    }))
                    .ok();
            }
        }
    }

    fn clone_for_task(&self) -> Self {
        Self {
            runner: Arc::clone(&self.runner),
            event_bus: self.event_bus.clone(),
            config: self.config.clone(),
            devices: Arc::clone(&self.devices),
            poll_in_flight: Arc::clone(&self.poll_in_flight),
            tool_missing: Arc::clone(&self.tool_missing),
            loop_task: Arc::clone(&self.loop_task),
        }
    }
}

fn mock_device() -> Device {
    Device {
        udid: MOCK_UDID.to_string(),
        name: MOCK_DEVICE_NAME.to_string(),
        product_type: MOCK_PRODUCT_TYPE.to_string(),
        product_version: MOCK_PRODUCT_VERSION.to_string(),
        serial_number: MOCK_SERIAL_NUMBER.to_string(),
        connected: true,
    }
}

// ============================================================================
// Tests
// ============================================================================
