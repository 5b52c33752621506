use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Device tool not available: {0}")]
    ToolUnavailable(String),

    #[error("Device info query failed for {udid} (exit status {status:?})")]
    InfoQueryFailed { udid: String, status: Option<i32> },

    #[error("Failed to parse device tool output: {0}")]
    Parse(String),

    #[error("Bridge error: {0}")]
    Bridge(#[from] bridge_traits::BridgeError),
}

pub type Result<T> = std::result::Result<T, DeviceError>;
