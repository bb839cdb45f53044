use thiserror::Error;

/// Errors that can occur when talking to a Crestron hub
#[derive(Error, Debug)]
pub enum CrestronError {
    /// Auth token rejected or auth key expired
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Hub unreachable or the connection dropped mid-request
    #[error("Failed to connect to hub: {0}")]
    Connection(String),

    /// Request timeout
    #[error("Request timed out after {timeout_ms}ms")]
    Timeout {
        /// Timeout duration in milliseconds
        timeout_ms: u64,
    },

    /// Unexpected response from the hub
    #[error("API error{}: {message}", status_suffix(.status))]
    Api {
        /// HTTP status code, if the hub answered at all
        status: Option<u16>,
        /// Description of the failure
        message: String,
    },

    /// No shade with this id is known to the hub
    #[error("Shade {0} not found")]
    ShadeNotFound(u32),

    /// No device with this id is known to the hub
    #[error("Device {0} not found")]
    DeviceNotFound(u32),

    /// Invalid command parameters
    #[error("Invalid command parameters: {0}")]
    InvalidParameters(String),

    /// Invalid hub configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

/// Result type for Crestron operations
pub type Result<T> = std::result::Result<T, CrestronError>;

impl CrestronError {
    /// Build an [`CrestronError::Api`] error without an HTTP status
    pub fn api(message: impl Into<String>) -> Self {
        Self::Api {
            status: None,
            message: message.into(),
        }
    }

    /// Check if this error means the session credentials were rejected
    #[must_use]
    pub const fn is_auth_error(&self) -> bool {
        matches!(self, Self::Auth(_))
    }

    /// Check if this error indicates a connection issue
    #[must_use]
    pub const fn is_connection_error(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Timeout { .. })
    }

    /// Check if retrying the same request may succeed
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Connection(_)
                | Self::Timeout { .. }
                | Self::Api {
                    status: Some(500..=599),
                    ..
                }
        )
    }
}
