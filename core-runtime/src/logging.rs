//! # Logging & Redaction
//!
//! Structured logging for the sync pipeline, built on `tracing`:
//! - Pretty, JSON, and compact output formats
//! - Per-crate filtering with an `EnvFilter`-style directive string
//! - Redaction helpers for the values this pipeline handles routinely
//!   (backup passwords, contact handles, backup file paths)
//! - Span contexts around sync phases
//!
//! ## Overview
//!
//! Contact handles and device identifiers flow through almost every log call
//! in this workspace, so the redaction helpers live next to the subscriber
//! bootstrap rather than being reinvented per call site. `init_logging`
//! installs the global subscriber and must run once, before any component
//! starts emitting.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = LoggingConfig::default()
//!         .with_format(LogFormat::Compact)
//!         .with_thread_info(true);
//!
//!     init_logging(config).expect("logging init failed");
//!
//!     tracing::info!("Pipeline started");
//! }
//! ```

use crate::error::{Error, Result};

use std::io;

use tracing::{Event, Subscriber};
use tracing_subscriber::{
    filter::EnvFilter,
    fmt::format::FmtSpan,
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    Layer,
};

/// Workspace crates named in the default filter. Noisy dependencies are
/// pinned to `warn` separately.
const WORKSPACE_CRATES: &[&str] = &[
    "core_runtime",
    "core_device",
    "core_contacts",
    "core_sync",
    "bridge_traits",
    "bridge_host",
];

/// Output style for log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-line human-oriented output with ANSI colors
    Pretty,
    /// One JSON object per line, for log shippers
    Json,
    /// Terse single-line output
    Compact,
}

impl Default for LogFormat {
    fn default() -> Self {
        #[cfg(debug_assertions)]
        return Self::Pretty;

        #[cfg(not(debug_assertions))]
        return Self::Json;
    }
}

/// Minimum level of log lines that survive filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Directive form understood by `EnvFilter`
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Subscriber configuration assembled by the host at startup
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Output style
    pub format: LogFormat,
    /// Level floor applied when no custom filter is set
    pub level: LogLevel,
    /// Scrub contact handles and credentials
    pub redact_pii: bool,
    /// Full directive string overriding the per-crate defaults
    /// (e.g., "core_sync=trace,core_device=debug")
    pub filter: Option<String>,
    /// Record span open/close around workflow phases
    pub enable_spans: bool,
    /// Include the emitting module path
    pub display_target: bool,
    /// Include thread ids and names
    pub display_thread_info: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: LogLevel::Info,
            redact_pii: true,
            filter: None,
            enable_spans: true,
            display_target: true,
            display_thread_info: false,
        }
    }
}

impl LoggingConfig {
    /// Choose the output style
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the level floor
    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    /// Toggle redaction of contact handles and credentials
    pub fn with_pii_redaction(mut self, redact: bool) -> Self {
        self.redact_pii = redact;
        self
    }

    /// Override the filter with a full directive string
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Toggle span context in the output
    pub fn with_spans(mut self, enable: bool) -> Self {
        self.enable_spans = enable;
        self
    }

    /// Toggle the emitting module path
    pub fn with_target(mut self, display: bool) -> Self {
        self.display_target = display;
        self
    }

    /// Toggle thread ids and names
    pub fn with_thread_info(mut self, display: bool) -> Self {
        self.display_thread_info = display;
        self
    }
}

/// Install the process-wide subscriber
///
/// Call once during startup; a second call fails because the subscriber
/// slot is already taken.
///
/// # Errors
///
/// Returns [`Error::Config`] when the filter string does not parse or when
/// a subscriber is already installed.
pub fn init_logging(config: LoggingConfig) -> Result<()> {
    let filter = build_filter(&config)?;
    let redact = config.redact_pii.then_some(PiiRedactionLayer);

    tracing_subscriber::registry()
        .with(filter)
        .with(format_layer(&config))
        .with(redact)
        .try_init()
        .map_err(|e| Error::Config(format!("Failed to initialize logging: {}", e)))
}

fn build_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    let spec = match &config.filter {
        Some(custom) => custom.clone(),
        None => {
            let level = config.level.as_str();
            let mut directives = vec![format!("{}={}", env!("CARGO_PKG_NAME"), level)];
            for krate in WORKSPACE_CRATES {
                directives.push(format!("{}={}", krate, level));
            }
            directives.push("sqlx=warn".to_string());
            directives.join(",")
        }
    };

    EnvFilter::try_new(&spec).map_err(|e| Error::Config(format!("Invalid log filter: {}", e)))
}

/// One fmt layer per [`LogFormat`], boxed so the three builder types can
/// share a single subscriber chain.
fn format_layer<S>(config: &LoggingConfig) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let base = tracing_subscriber::fmt::layer()
        .with_target(config.display_target)
        .with_thread_ids(config.display_thread_info)
        .with_thread_names(config.display_thread_info)
        .with_writer(io::stdout);

    match config.format {
        LogFormat::Pretty => {
            let span_events = if config.enable_spans {
                FmtSpan::ACTIVE
            } else {
                FmtSpan::NONE
            };
            base.pretty().with_span_events(span_events).boxed()
        }
        LogFormat::Json => base
            .json()
            .flatten_event(true)
            .with_current_span(config.enable_spans)
            .with_span_list(config.enable_spans)
            .boxed(),
        LogFormat::Compact => base.compact().boxed(),
    }
}

/// PII redaction layer
///
/// Scrubbing happens at call sites through [`redact_if_sensitive`] and
/// [`strip_path`]; this layer is the subscriber-level hook for the day field
/// conventions stop being enough.
struct PiiRedactionLayer;

impl<S> Layer<S> for PiiRedactionLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, _event: &Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {}
}

/// Redact a value when the field name or the value shape calls for it
///
/// Backup passwords are dropped entirely; email- and phone-shaped values are
/// masked down to a recognizable stub:
///
/// ```ignore
/// use tracing::info;
/// use core_runtime::logging::redact_if_sensitive;
///
/// let handle = "+1-555-123-4567";
/// info!(handle = %redact_if_sensitive("handle", handle), "Resolving handle");
/// // Logs: handle="***4567"
/// ```
pub fn redact_if_sensitive(field_name: &str, value: &str) -> String {
    const SENSITIVE_FIELDS: &[&str] = &["password", "passcode", "secret", "credential"];

    let field_lower = field_name.to_lowercase();
    if SENSITIVE_FIELDS.iter().any(|&f| field_lower.contains(f)) {
        return "[REDACTED]".to_string();
    }

    if let Some(masked) = mask_email(value) {
        return masked;
    }

    if looks_like_phone(value) {
        let digits: String = value.chars().filter(|c| c.is_ascii_digit()).collect();
        let tail = &digits[digits.len().saturating_sub(4)..];
        return format!("***{}", tail);
    }

    value.to_string()
}

/// Email-shaped values keep their first character only.
fn mask_email(value: &str) -> Option<String> {
    let at = value.find('@')?;
    if !value.contains('.') {
        return None;
    }

    match value.chars().next().filter(|_| at > 0) {
        Some(first) => Some(format!("{}***@[REDACTED]", first)),
        None => Some("***@[REDACTED]".to_string()),
    }
}

/// Phone-shaped: mostly digits with common formatting characters
fn looks_like_phone(value: &str) -> bool {
    let digit_count = value.chars().filter(|c| c.is_ascii_digit()).count();
    digit_count >= 7
        && value
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | ' ' | '(' | ')' | '.'))
}

/// Reduce a file path to its basename before logging
///
/// Useful for backup locations, which embed the device identifier:
///
/// ```ignore
/// use tracing::info;
/// use core_runtime::logging::strip_path;
///
/// let path = "/Users/operator/Backups/00008110-000A2D903C8A801E/Manifest.db";
/// info!(file = %strip_path(path), "Reading manifest");
/// // Logs: file="Manifest.db"
/// ```
pub fn strip_path(path: &str) -> &str {
    path.rsplit('/')
        .next()
        .unwrap_or(path)
        .rsplit('\\')
        .next()
        .unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder_applies_every_field() {
        let config = LoggingConfig::default()
            .with_format(LogFormat::Compact)
            .with_level(LogLevel::Warn)
            .with_pii_redaction(false)
            .with_filter("core_sync=trace")
            .with_spans(false)
            .with_target(false)
            .with_thread_info(true);

        assert_eq!(config.format, LogFormat::Compact);
        assert_eq!(config.level, LogLevel::Warn);
        assert!(!config.redact_pii);
        assert_eq!(config.filter, Some("core_sync=trace".to_string()));
        assert!(!config.enable_spans);
        assert!(!config.display_target);
        assert!(config.display_thread_info);
    }

    #[test]
    fn test_level_directive_forms() {
        assert_eq!(LogLevel::Trace.as_str(), "trace");
        assert_eq!(LogLevel::Error.as_str(), "error");
        assert!(LogLevel::Debug < LogLevel::Warn);
    }

    #[test]
    fn test_redaction_by_field_name_and_value_shape() {
        // Credential field names are dropped regardless of value
        assert_eq!(redact_if_sensitive("password", "hunter2"), "[REDACTED]");
        assert_eq!(
            redact_if_sensitive("backup_password", "abc"),
            "[REDACTED]"
        );

        // Email-shaped handles keep the first character only
        let redacted = redact_if_sensitive("handle", "user@example.com");
        assert!(redacted.starts_with('u'));
        assert!(redacted.contains("[REDACTED]"));

        // Phone-shaped handles keep only the last four digits
        assert_eq!(redact_if_sensitive("handle", "+1-555-123-4567"), "***4567");
        assert_eq!(redact_if_sensitive("handle", "5551234567"), "***4567");

        // Neutral fields are untouched
        assert_eq!(redact_if_sensitive("udid", "00008110-000A2D"), "00008110-000A2D");
        assert_eq!(redact_if_sensitive("name", "Work Phone"), "Work Phone");
    }

    #[test]
    fn test_mask_email_edge_shapes() {
        assert_eq!(
            mask_email("j@example.com").as_deref(),
            Some("j***@[REDACTED]")
        );
        assert_eq!(mask_email("@example.com").as_deref(), Some("***@[REDACTED]"));
        // An '@' with no dot anywhere is not email-shaped
        assert_eq!(mask_email("user@localhost"), None);
        assert_eq!(mask_email("no-at-sign.com"), None);
    }

    #[test]
    fn test_looks_like_phone_rejects_short_and_mixed() {
        assert!(looks_like_phone("555-123-4567"));
        assert!(!looks_like_phone("12345"));
        assert!(!looks_like_phone("iPhone14,2"));
    }

    #[test]
    fn test_strip_path_handles_both_separators() {
        assert_eq!(
            strip_path("/backups/device/31/31bb7ba8914766d4ba40d6dfb6113c8b614be442"),
            "31bb7ba8914766d4ba40d6dfb6113c8b614be442"
        );
        assert_eq!(strip_path("C:\\Backups\\Device\\Manifest.db"), "Manifest.db");
        assert_eq!(strip_path("Manifest.db"), "Manifest.db");
        assert_eq!(strip_path("/var/log/"), "");
    }

    #[test]
    fn test_format_default_tracks_build_profile() {
        #[cfg(debug_assertions)]
        assert_eq!(LogFormat::default(), LogFormat::Pretty);

        #[cfg(not(debug_assertions))]
        assert_eq!(LogFormat::default(), LogFormat::Json);
    }

    #[test]
    fn test_default_filter_covers_workspace_and_pins_sqlx() {
        let config = LoggingConfig::default().with_level(LogLevel::Debug);
        let rendered = build_filter(&config).unwrap().to_string();
        assert!(rendered.contains("core_device=debug"));
        assert!(rendered.contains("sqlx=warn"));
    }

    #[test]
    fn test_custom_filter_passes_through_unchanged() {
        let config = LoggingConfig::default().with_filter("core_device=trace,core_sync=debug");
        let rendered = build_filter(&config).unwrap().to_string();
        assert!(rendered.contains("core_device=trace"));
    }
}
