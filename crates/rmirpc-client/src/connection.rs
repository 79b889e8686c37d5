//! Multiplexed connections.
//!
//! A [`Connection`] carries any number of concurrent calls over one TCP
//! stream. Each call registers a waiter under a fresh request id, writes its
//! frame, and waits. A background reader routes every response to the
//! waiter with the matching id:
//!
//! ```text
//!   call() ──► pending[id] = tx ──► write frame ──► await rx
//!                    ▲
//!   reader task ─────┘ remove pending[response.id], tx.send(response)
//! ```
//!
//! A response nobody waits for any more (the call timed out) is dropped.
//! When the stream ends, every waiter is released with a transport error and
//! the connection refuses new calls; [`ConnectionManager`] then opens a new
//! one on next use.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use rmirpc_common::protocol::error::{Result, RpcError};
use rmirpc_common::protocol::{
    InvocationRequest, InvocationResponse, RequestId, RequestIdGenerator, UNCORRELATED_REQUEST_ID,
};
use rmirpc_common::transport::{read_frame, tcp, write_frame, JsonCodec};
use serde_json::Value;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::config::ClientConfig;

#[derive(Default)]
struct Pending {
    waiters: HashMap<RequestId, oneshot::Sender<InvocationResponse>>,
    closed: bool,
}

type SharedPending = Arc<Mutex<Pending>>;

fn lock(pending: &SharedPending) -> std::sync::MutexGuard<'_, Pending> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Marks the connection closed and releases every waiter.
///
/// Dropping a sender wakes its receiver with an error, which the caller
/// reports as a transport failure.
fn close_pending(pending: &SharedPending) -> usize {
    let mut pending = lock(pending);
    pending.closed = true;
    let released = pending.waiters.len();
    pending.waiters.clear();
    released
}

/// Removes a waiter when its call ends for any reason other than delivery.
struct WaiterGuard<'a> {
    pending: &'a SharedPending,
    id: RequestId,
}

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        lock(self.pending).waiters.remove(&self.id);
    }
}

/// One TCP connection shared by concurrent calls.
pub struct Connection {
    endpoint: String,
    writer: tokio::sync::Mutex<OwnedWriteHalf>,
    pending: SharedPending,
    ids: RequestIdGenerator,
    reader: JoinHandle<()>,
    config: ClientConfig,
}

impl Connection {
    /// Connects to `endpoint` (`host:port`) and starts the response reader.
    pub async fn open(endpoint: &str, config: &ClientConfig) -> Result<Self> {
        let stream = tcp::connect(endpoint, config.connect_timeout).await?;
        let (reader, writer) = stream.into_split();
        debug!(endpoint, "Connection established");

        let pending = SharedPending::default();
        let reader = tokio::spawn(read_responses(
            reader,
            Arc::clone(&pending),
            endpoint.to_string(),
            config.max_frame_size,
        ));

        Ok(Self {
            endpoint: endpoint.to_string(),
            writer: tokio::sync::Mutex::new(writer),
            pending,
            ids: RequestIdGenerator::new(),
            reader,
            config: config.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// False once the stream has ended or failed.
    pub fn is_closed(&self) -> bool {
        lock(&self.pending).closed
    }

    /// Number of calls waiting for a response.
    pub fn in_flight(&self) -> usize {
        lock(&self.pending).waiters.len()
    }

    /// Invokes `service.method(args)` and waits for the correlated response.
    ///
    /// # Errors
    ///
    /// - Any per-call failure the server reported, rebuilt as the same variant
    /// - `Timeout` when no response arrived within the call timeout
    /// - `Transport` when the connection was lost before the response
    pub async fn call(&self, service: &str, method: &str, args: Vec<Value>) -> Result<Value> {
        let deadline = Instant::now() + self.config.call_timeout;
        let id = self.ids.next_id();
        let request = InvocationRequest::new(id, service, method, args);
        let payload = JsonCodec::encode_request(&request)?;

        let response = self.register(id)?;
        let _guard = WaiterGuard {
            pending: &self.pending,
            id,
        };

        trace!(endpoint = %self.endpoint, id, target = %request.target(), "Sending request");
        self.send(&payload, deadline).await?;

        match tokio::time::timeout_at(deadline, response).await {
            Ok(Ok(response)) => response.into_result(),
            Ok(Err(_)) => Err(RpcError::Transport(format!(
                "connection to {} lost before {} completed",
                self.endpoint,
                request.target()
            ))),
            Err(_) => {
                debug!(endpoint = %self.endpoint, id, target = %request.target(), "Call timed out");
                Err(self.timeout_error())
            }
        }
    }

    fn register(&self, id: RequestId) -> Result<oneshot::Receiver<InvocationResponse>> {
        let mut pending = lock(&self.pending);
        if pending.closed {
            return Err(RpcError::Transport(format!("connection to {} is closed", self.endpoint)));
        }

        let (tx, rx) = oneshot::channel();
        pending.waiters.insert(id, tx);
        Ok(rx)
    }

    /// Writes one frame.
    ///
    /// Running out of time while queued behind other writers leaves the
    /// stream untouched. A write that fails or runs past the deadline may
    /// leave part of a frame on the wire, so the connection is closed.
    async fn send(&self, payload: &[u8], deadline: Instant) -> Result<()> {
        let Ok(mut writer) = tokio::time::timeout_at(deadline, self.writer.lock()).await else {
            debug!(endpoint = %self.endpoint, "Call timed out waiting to send");
            return Err(self.timeout_error());
        };

        match tokio::time::timeout_at(deadline, write_frame(&mut *writer, payload)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                warn!(endpoint = %self.endpoint, error = %e, "Failed to send request, closing connection");
                self.close();
                Err(e)
            }
            Err(_) => {
                warn!(endpoint = %self.endpoint, "Send timed out, closing connection");
                self.close();
                Err(self.timeout_error())
            }
        }
    }

    fn timeout_error(&self) -> RpcError {
        RpcError::Timeout(self.config.call_timeout.as_millis() as u64)
    }

    /// Stops the reader and fails all in-flight calls.
    pub fn close(&self) {
        self.reader.abort();
        close_pending(&self.pending);
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("endpoint", &self.endpoint)
            .field("closed", &self.is_closed())
            .finish()
    }
}

async fn read_responses(
    mut reader: OwnedReadHalf,
    pending: SharedPending,
    endpoint: String,
    max_frame_size: usize,
) {
    loop {
        let payload = match read_frame(&mut reader, max_frame_size).await {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                debug!(%endpoint, "Server closed connection");
                break;
            }
            Err(e) => {
                warn!(%endpoint, error = %e, "Connection lost");
                break;
            }
        };

        let response = match JsonCodec::decode_response(&payload) {
            Ok(response) => response,
            Err(e) => {
                warn!(%endpoint, error = %e, "Undecodable response, closing connection");
                break;
            }
        };

        route(&pending, response, &endpoint);
    }

    let released = close_pending(&pending);
    if released > 0 {
        debug!(%endpoint, released, "Released in-flight calls");
    }
}

fn route(pending: &SharedPending, response: InvocationResponse, endpoint: &str) {
    let id = response.id;
    let waiter = lock(pending).waiters.remove(&id);

    match waiter {
        Some(tx) => {
            if tx.send(response).is_err() {
                debug!(endpoint, id, "Caller went away before its response arrived");
            }
        }
        None if id == UNCORRELATED_REQUEST_ID => {
            if let Err(e) = response.into_result() {
                warn!(endpoint, error = %e, "Server rejected the connection");
            }
        }
        None => debug!(endpoint, id, "Discarding response without a waiter"),
    }
}

/// Keeps one [`Connection`] per endpoint.
///
/// Connections are opened on first use, shared by every caller, and replaced
/// when they are found closed. A call that was in flight when its connection
/// dropped fails; it is not retried.
#[derive(Debug)]
pub struct ConnectionManager {
    config: ClientConfig,
    connections: tokio::sync::Mutex<HashMap<String, Arc<Connection>>>,
}

impl ConnectionManager {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            connections: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Returns the open connection to `endpoint`, connecting if needed.
    ///
    /// The table is not locked while connecting, so a slow endpoint does not
    /// hold up callers of other endpoints. When two callers connect to the
    /// same endpoint at once, the first connection stored wins and the other
    /// is closed.
    pub async fn get(&self, endpoint: &str) -> Result<Arc<Connection>> {
        if let Some(connection) = self.open_connection(endpoint).await {
            return Ok(connection);
        }

        let opened = Arc::new(Connection::open(endpoint, &self.config).await?);

        let mut connections = self.connections.lock().await;
        if let Some(existing) = connections.get(endpoint) {
            if !existing.is_closed() {
                debug!(endpoint, "Lost connect race, using the stored connection");
                opened.close();
                return Ok(Arc::clone(existing));
            }
        }
        connections.insert(endpoint.to_string(), Arc::clone(&opened));
        Ok(opened)
    }

    async fn open_connection(&self, endpoint: &str) -> Option<Arc<Connection>> {
        let mut connections = self.connections.lock().await;
        let connection = connections.get(endpoint)?;
        if !connection.is_closed() {
            return Some(Arc::clone(connection));
        }

        debug!(endpoint, "Connection dropped since last use, reconnecting");
        connections.remove(endpoint);
        None
    }

    /// Closes and forgets the connection to `endpoint`, if any.
    pub async fn evict(&self, endpoint: &str) {
        if let Some(connection) = self.connections.lock().await.remove(endpoint) {
            connection.close();
        }
    }

    /// Number of endpoints with a cached connection, open or not.
    pub async fn len(&self) -> usize {
        self.connections.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
