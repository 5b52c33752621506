//! # Device Detection Module
//!
//! Detects attached mobile devices by polling an external identification
//! tool, maintains the set of currently connected devices, and answers
//! on-demand storage queries used to size backups.
//!
//! ## Overview
//!
//! The watcher never talks USB itself; it shells out to the identification
//! CLI through the [`CommandRunner`](bridge_traits::CommandRunner) seam and
//! diffs successive device lists. Attach/detach transitions are published as
//! [`DeviceEvent`](core_runtime::DeviceEvent)s on the shared event bus.
//!
//! ## Usage
//!
//! ```ignore
//! use core_device::{DeviceWatcher, WatcherConfig};
//! use core_runtime::EventBus;
//! use std::sync::Arc;
//!
//! let bus = EventBus::new(100);
//! let watcher = DeviceWatcher::new(runner, bus.clone(), WatcherConfig::from_env());
//! watcher.start(5000).await;
//!
//! if let Some(storage) = watcher.get_device_storage_info("udid").await {
//!     println!("estimated backup: {} bytes", storage.estimated_backup_size);
//! }
//! ```

pub mod config;
pub mod device;
pub mod error;
pub mod watcher;

pub use config::WatcherConfig;
pub use device::{Device, DeviceStorageSnapshot};
pub use error::{DeviceError, Result};
pub use watcher::DeviceWatcher;
