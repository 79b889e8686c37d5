use serde::{Deserialize, Serialize};

use super::requests::ServiceName;

/// Everything a client needs to reach one bound service.
///
/// A reference is produced by a successful lookup and cached by the client,
/// so calls through it go straight to `host:port` without asking the
/// registry again.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct RemoteReference {
    pub host: String,
    pub port: u16,
    pub service: ServiceName,
}

impl RemoteReference {
    pub fn new(host: impl Into<String>, port: u16, service: impl Into<ServiceName>) -> Self {
        Self {
            host: host.into(),
            port,
            service: service.into(),
        }
    }

    /// The `host:port` endpoint this reference targets. IPv6 hosts are
    /// bracketed.
    pub fn endpoint(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// Splits a `host:port` endpoint, the inverse of
/// [`RemoteReference::endpoint`]. Bracketed IPv6 hosts come back without
/// brackets.
///
/// Returns `None` if the port is missing or invalid, or the host is empty.
///
/// ```
/// use rmirpc_common::protocol::split_endpoint;
///
/// assert_eq!(split_endpoint("[::1]:1099"), Some(("::1".to_string(), 1099)));
/// assert_eq!(split_endpoint("localhost"), None);
/// ```
pub fn split_endpoint(endpoint: &str) -> Option<(String, u16)> {
    let (host, port) = endpoint.rsplit_once(':')?;
    let port = port.parse().ok()?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return None;
    }
    Some((host.to_string(), port))
}

impl std::fmt::Display for RemoteReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.endpoint(), self.service)
    }
}
