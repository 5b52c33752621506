//! Watcher configuration.

/// Floor applied to every requested poll interval.
pub const DEFAULT_MIN_POLL_INTERVAL_MS: u64 = 2000;

/// Hand-tuned multiplier from used device space to expected backup size.
/// Backups compress some domains and skip others, so this is an
/// approximation, not a guarantee.
pub const DEFAULT_ESTIMATE_RATIO: f64 = 1.5;

/// Environment flag that switches the watcher into mock mode.
pub const MOCK_DEVICE_ENV: &str = "DEVSYNC_MOCK_DEVICE";

/// Configuration for [`DeviceWatcher`](crate::DeviceWatcher).
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Program that lists attached device UDIDs
    pub list_program: String,
    /// Program that reports per-device key/value info
    pub info_program: String,
    /// Poll intervals below this are clamped up to it
    pub min_poll_interval_ms: u64,
    /// Multiplier from used space to estimated backup size
    pub estimate_ratio: f64,
    /// Serve one static device and skip all subprocess calls
    pub mock_device: bool,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            list_program: "idevice_id".to_string(),
            info_program: "ideviceinfo".to_string(),
            min_poll_interval_ms: DEFAULT_MIN_POLL_INTERVAL_MS,
            estimate_ratio: DEFAULT_ESTIMATE_RATIO,
            mock_device: false,
        }
    }
}

impl WatcherConfig {
    /// Default configuration with mock mode read from [`MOCK_DEVICE_ENV`].
    ///
    /// Set the variable to `1` or `true` to develop against a simulated
    /// device on hosts with no USB stack.
    pub fn from_env() -> Self {
        let mock_device = std::env::var(MOCK_DEVICE_ENV)
            .map(|v| {
                let v = v.trim().to_ascii_lowercase();
                v == "1" || v == "true"
            })
            .unwrap_or(false);

        Self {
            mock_device,
            ..Self::default()
        }
    }

    /// Override the device-list program
    pub fn with_list_program(mut self, program: impl Into<String>) -> Self {
        self.list_program = program.into();
        self
    }

    /// Override the device-info program
    pub fn with_info_program(mut self, program: impl Into<String>) -> Self {
        self.info_program = program.into();
        self
    }

    /// Override the poll interval floor
    pub fn with_min_poll_interval_ms(mut self, floor: u64) -> Self {
        self.min_poll_interval_ms = floor;
        self
    }

    /// Override the backup estimate ratio
    pub fn with_estimate_ratio(mut self, ratio: f64) -> Self {
        self.estimate_ratio = ratio;
        self
    }

    /// Force mock mode on or off
    pub fn with_mock_device(mut self, mock: bool) -> Self {
        self.mock_device = mock;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = WatcherConfig::default();
        assert_eq!(config.list_program, "idevice_id");
        assert_eq!(config.info_program, "ideviceinfo");
        assert_eq!(config.min_poll_interval_ms, 2000);
        assert!((config.estimate_ratio - 1.5).abs() < f64::EPSILON);
        assert!(!config.mock_device);
    }

    #[test]
    fn test_builder_overrides() {
        let config = WatcherConfig::default()
            .with_list_program("/opt/tools/idevice_id")
            .with_info_program("/opt/tools/ideviceinfo")
            .with_min_poll_interval_ms(500)
            .with_estimate_ratio(2.0)
            .with_mock_device(true);

        assert_eq!(config.list_program, "/opt/tools/idevice_id");
        assert_eq!(config.info_program, "/opt/tools/ideviceinfo");
        assert_eq!(config.min_poll_interval_ms, 500);
        assert!((config.estimate_ratio - 2.0).abs() < f64::EPSILON);
        assert!(config.mock_device);
    }
}
