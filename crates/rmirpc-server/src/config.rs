//! Server configuration.

use rmirpc_common::transport::DEFAULT_MAX_FRAME_SIZE;
use tokio::sync::Semaphore;

/// Address the CLI binds to when nothing else is given.
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:1099";

/// Requests one connection may have dispatched but not yet answered.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 64;

/// Server settings.
///
/// # Example
///
/// ```
/// use rmirpc_server::ServerConfig;
///
/// let config = ServerConfig::new()
///     .with_bind_addr("0.0.0.0:1099")
///     .with_max_frame_size(1024 * 1024);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    /// `host:port` to listen on. Port 0 picks a free port.
    pub bind_addr: String,
    /// Largest accepted frame payload, in bytes.
    pub max_frame_size: usize,
    /// `host:port` handed out in lookup results, for servers behind NAT or
    /// listening on a wildcard address.
    pub advertised_endpoint: Option<String>,
    /// Requests one connection may have running at once. At the limit the
    /// server stops reading from that connection until one completes.
    pub max_in_flight: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            advertised_endpoint: None,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
        }
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bind_addr(mut self, addr: impl Into<String>) -> Self {
        self.bind_addr = addr.into();
        self
    }

    pub fn with_max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    pub fn with_advertised_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.advertised_endpoint = Some(endpoint.into());
        self
    }

    pub fn with_max_in_flight(mut self, limit: usize) -> Self {
        self.max_in_flight = limit;
        self
    }

    /// Checks the configuration for values the server cannot run with.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The bind address is empty
    /// - The maximum frame size is zero or does not fit a `u32` prefix
    /// - The in-flight limit is zero or above what a semaphore can hold
    pub fn validate(&self) -> Result<(), String> {
        if self.bind_addr.trim().is_empty() {
            return Err("bind address must not be empty".to_string());
        }

        if self.max_frame_size == 0 {
            return Err("max frame size must be greater than zero".to_string());
        }

        if self.max_frame_size > u32::MAX as usize {
            return Err(format!(
                "max frame size must be <= {} bytes (got {})",
                u32::MAX,
                self.max_frame_size
            ));
        }

        if self.max_in_flight == 0 {
            return Err("max in-flight requests must be greater than zero".to_string());
        }

        if self.max_in_flight > Semaphore::MAX_PERMITS {
            return Err(format!(
                "max in-flight requests must be <= {} (got {})",
                Semaphore::MAX_PERMITS,
                self.max_in_flight
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_server_config() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr, "127.0.0.1:1099");
        assert_eq!(config.max_frame_size, 16 * 1024 * 1024);
        assert!(config.advertised_endpoint.is_none());
        assert_eq!(config.max_in_flight, 64);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_chaining() {
        let config = ServerConfig::new()
            .with_bind_addr("0.0.0.0:0")
            .with_max_frame_size(512)
            .with_advertised_endpoint("rmi.example.net:1099");

        assert_eq!(config.bind_addr, "0.0.0.0:0");
        assert_eq!(config.max_frame_size, 512);
        assert_eq!(config.advertised_endpoint.as_deref(), Some("rmi.example.net:1099"));
    }

    #[test]
    fn test_validate_rejects_zero_frame_size() {
        let err = ServerConfig::new().with_max_frame_size(0).validate().unwrap_err();
        assert!(err.contains("greater than zero"));
    }

    #[test]
    fn test_validate_rejects_zero_in_flight_limit() {
        let err = ServerConfig::new().with_max_in_flight(0).validate().unwrap_err();
        assert!(err.contains("in-flight"));
        assert!(ServerConfig::new().with_max_in_flight(usize::MAX).validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_bind_addr() {
        assert!(ServerConfig::new().with_bind_addr("  ").validate().is_err());
    }
}
