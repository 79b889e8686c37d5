//! Client configuration.

use std::time::Duration;

use rmirpc_common::transport::tcp::DEFAULT_CONNECT_TIMEOUT;
use rmirpc_common::transport::DEFAULT_MAX_FRAME_SIZE;

/// Default time a call may take end to end (30 seconds)
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Client settings.
///
/// # Example
///
/// ```
/// use rmirpc_client::ClientConfig;
/// use std::time::Duration;
///
/// let config = ClientConfig::new()
///     .with_call_timeout(Duration::from_secs(5))
///     .with_connect_timeout(Duration::from_secs(1));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Upper bound for one call, from sending the request to receiving the
    /// response.
    pub call_timeout: Duration,
    /// Upper bound for establishing a TCP connection.
    pub connect_timeout: Duration,
    /// Largest accepted response payload, in bytes.
    pub max_frame_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            call_timeout: DEFAULT_CALL_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    /// # Errors
    ///
    /// Returns an error if either timeout or the frame size is zero.
    pub fn validate(&self) -> Result<(), String> {
        if self.call_timeout.is_zero() {
            return Err("call timeout must be greater than zero".to_string());
        }

        if self.connect_timeout.is_zero() {
            return Err("connect timeout must be greater than zero".to_string());
        }

        if self.max_frame_size == 0 {
            return Err("max frame size must be greater than zero".to_string());
        }

        Ok(())
    }
}
