use std::time::Duration;

use tokio::net::TcpStream;
use tracing::{debug, trace};

use crate::protocol::error::{Result, RpcError};

/// Default timeout for establishing a TCP connection (5 seconds)
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Connects to a remote endpoint.
///
/// The address may resolve to several socket addresses; each is tried in
/// turn until one accepts within `timeout`. Every failure is reported as a
/// `Transport` error. Nagle is disabled since frames are small and
/// latency-bound.
///
/// # Example
///
/// ```no_run
/// use rmirpc_common::transport::tcp::{connect, DEFAULT_CONNECT_TIMEOUT};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let stream = connect("127.0.0.1:1099", DEFAULT_CONNECT_TIMEOUT).await?;
/// # Ok(())
/// # }
/// ```
pub async fn connect(addr: &str, timeout: Duration) -> Result<TcpStream> {
    let socket_addrs: Vec<_> = tokio::net::lookup_host(addr)
        .await
        .map_err(|e| RpcError::Transport(format!("Invalid address '{}': {}", addr, e)))?
        .collect();

    let mut last_err = None;
    for socket_addr in socket_addrs {
        match tokio::time::timeout(timeout, TcpStream::connect(socket_addr)).await {
            Ok(Ok(stream)) => {
                debug!(%addr, peer = %socket_addr, "Connected");
                stream
                    .set_nodelay(true)
                    .map_err(|e| RpcError::Transport(format!("Failed to set TCP_NODELAY: {}", e)))?;
                return Ok(stream);
            }
            Ok(Err(e)) => {
                trace!(%addr, peer = %socket_addr, error = %e, "Connect attempt failed");
                last_err = Some(e.to_string());
            }
            Err(_) => {
                trace!(%addr, peer = %socket_addr, "Connect attempt timed out");
                last_err = Some(format!("timed out after {}ms", timeout.as_millis()));
            }
        }
    }

    Err(RpcError::Transport(format!(
        "Failed to connect to {}: {}",
        addr,
        last_err.unwrap_or_else(|| "address resolved to nothing".to_string())
    )))
}
