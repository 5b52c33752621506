//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the sync pipeline:
//! - Logging and tracing infrastructure
//! - Event bus system
//! - Shared error types
//!
//! ## Overview
//!
//! This crate contains the core runtime utilities that other modules depend
//! on. It establishes the logging conventions and the event broadcasting
//! mechanism used throughout the system; the domain crates publish their
//! device and sync events through the bus defined here.

pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
pub use events::{
    CoreEvent, DeviceEvent, EventBus, EventStream, EventSeverity, SyncEvent,
    DEFAULT_EVENT_BUFFER_SIZE,
};
pub use logging::{init_logging, LogFormat, LogLevel, LoggingConfig};
