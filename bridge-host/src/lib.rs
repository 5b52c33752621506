//! # Host Bridge Implementations
//!
//! Default implementations of the infrastructure bridge traits for the
//! machine the pipeline runs on (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! This crate provides production-ready implementations of the traits the
//! core consumes for host access:
//! - `CommandRunner` using `tokio::process`
//! - `DiskProbe` using `sysinfo`
//!
//! The domain collaborators (backup engine, decryptor, message store) have
//! no implementation here; the embedding application supplies them.
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_host::{SysinfoDiskProbe, TokioCommandRunner};
//! use bridge_traits::{CommandRunner, DiskProbe};
//! use std::sync::Arc;
//!
//! let runner: Arc<dyn CommandRunner> = Arc::new(TokioCommandRunner::new());
//! let probe: Arc<dyn DiskProbe> = Arc::new(SysinfoDiskProbe::new());
//! ```

mod command;
mod disk;

pub use command::TokioCommandRunner;
pub use disk::SysinfoDiskProbe;
