//! Walks one simulated sync run through the logging stack.
//!
//! Covers the three output formats, filter overrides, the span nesting the
//! orchestrator produces, and the redaction helpers applied to the values
//! this pipeline routinely logs (passwords, contact handles, backup paths).
//!
//! ```bash
//! cargo run --example logging_demo                 # format picked by build profile
//! cargo run --example logging_demo -- json
//! cargo run --example logging_demo -- compact "core_runtime=debug"
//! ```

use core_runtime::logging::{
    init_logging, redact_if_sensitive, strip_path, LogFormat, LogLevel, LoggingConfig,
};
use std::env;
use tracing::{debug, info, instrument, span, trace, warn, Level};

const UDID: &str = "00008110-000A2D903C8A801E";

#[tokio::main]
async fn main() {
    let mut args = env::args().skip(1);

    let format = match args.next().as_deref() {
        Some("json") => LogFormat::Json,
        Some("compact") => LogFormat::Compact,
        Some("pretty") => LogFormat::Pretty,
        Some(other) => {
            eprintln!("unknown format {:?}, falling back to default", other);
            LogFormat::default()
        }
        None => LogFormat::default(),
    };

    let mut config = LoggingConfig::default()
        .with_format(format)
        .with_level(LogLevel::Trace);
    if let Some(filter) = args.next() {
        config = config.with_filter(filter);
    }

    init_logging(config).expect("logging init failed");
    info!(?format, "Subscriber installed");

    device_attached();
    let estimate = preflight(150_000_000_000, 64_000_000_000);
    sync_run(estimate).await;

    info!("Demo run finished");
}

/// What a poll cycle logs when a new device shows up.
fn device_attached() {
    let span = span!(Level::DEBUG, "device_poll");
    let _enter = span.enter();

    trace!("Listing attached devices");
    debug!(seen = 1, known = 0, "Diffing against known set");
    info!(
        udid = UDID,
        name = "Operator's iPhone",
        product_type = "iPhone14,2",
        "Device connected"
    );
}

/// Disk preflight with the numbers the orchestrator reports.
fn preflight(available: u64, used: u64) -> u64 {
    let span = span!(Level::INFO, "preflight", udid = UDID);
    let _enter = span.enter();

    let estimate = (used as f64 * 1.5).round() as u64;
    info!(
        available_gb = available / 1_000_000_000,
        estimated_gb = estimate / 1_000_000_000,
        "Checking free space"
    );
    if available < estimate * 2 {
        warn!("Headroom below twice the estimate, sync would refuse to start");
    }
    estimate
}

/// Phase spans nested the way a real run nests them, plus the redaction
/// helpers on the sensitive values each phase touches.
async fn sync_run(estimate: u64) {
    let span = span!(Level::INFO, "sync_run", udid = UDID, sync_id = "demo-1");
    let _enter = span.enter();

    {
        let phase = span!(Level::DEBUG, "backup");
        let _phase = phase.enter();
        debug!(
            percent = 50,
            estimated_total_bytes = estimate,
            "Transfer in flight"
        );
        tokio::time::sleep(tokio::time::Duration::from_millis(10)).await;

        // The password itself never reaches the log stream
        info!(
            backup_password = %redact_if_sensitive("backup_password", "hunter2"),
            "Encrypted backup unlocked"
        );
    }

    {
        let phase = span!(Level::DEBUG, "parsing_messages");
        let _phase = phase.enter();
        for chat_id in 1..=3 {
            parse_conversation(chat_id, "+1-555-123-4567").await;
        }
    }

    let manifest = "/backups/00008110-000A2D903C8A801E/31/31bb7ba8914766d4ba40d6dfb6113c8b614be442";
    info!(
        file = %strip_path(manifest),
        message_count = 4217,
        "Extraction finished"
    );
}

#[instrument(skip(handle))]
async fn parse_conversation(chat_id: i64, handle: &str) {
    trace!(
        participant = %redact_if_sensitive("handle", handle),
        "Fetching messages"
    );
    tokio::time::sleep(tokio::time::Duration::from_millis(5)).await;
}
