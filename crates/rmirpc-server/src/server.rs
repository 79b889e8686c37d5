//! TCP server.
//!
//! One tokio task per accepted connection. Each connection is split in a
//! reader, which decodes frames and spawns one dispatch task per request,
//! and a writer, which encodes responses in completion order. Requests on
//! the same connection therefore run concurrently and responses may come
//! back out of order; the request id is what ties them together.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use rmirpc_common::protocol::error::{Result, RpcError};
use rmirpc_common::protocol::{InvocationResponse, UNCORRELATED_REQUEST_ID};
use rmirpc_common::transport::{read_frame, write_frame, JsonCodec};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot, watch, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, trace, warn};

use crate::config::ServerConfig;
use crate::dispatcher::Dispatcher;
use crate::registry::Registry;

/// Responses a connection may queue before dispatch tasks wait on the writer.
const RESPONSE_QUEUE_DEPTH: usize = 64;

/// Pause after a failed `accept`, e.g. when out of file descriptors.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Where a connection currently is.
///
/// The reader walks `ReadingFrame -> Decoding -> Dispatching` per frame, the
/// writer walks `Encoding -> WritingFrame` per response. Either side moves to
/// `Closing` on a framing or codec error or when the peer goes away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionState {
    Accepted,
    ReadingFrame,
    Decoding,
    Dispatching,
    Encoding,
    WritingFrame,
    Closing,
    Closed,
}

struct StateLog {
    peer: SocketAddr,
    side: &'static str,
    state: ConnectionState,
}

impl StateLog {
    fn new(peer: SocketAddr, side: &'static str) -> Self {
        Self {
            peer,
            side,
            state: ConnectionState::Accepted,
        }
    }

    fn enter(&mut self, next: ConnectionState) {
        debug!(peer = %self.peer, side = self.side, from = ?self.state, to = ?next, "Connection state");
        self.state = next;
    }
}

/// A bound, not yet running server.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use rmirpc_server::{Registry, Server, ServerConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let registry = Arc::new(Registry::new());
/// let server = Server::bind(ServerConfig::default(), registry).await?;
/// server.run_until(async { tokio::signal::ctrl_c().await.ok(); }).await?;
/// # Ok(())
/// # }
/// ```
pub struct Server {
    listener: TcpListener,
    dispatcher: Arc<Dispatcher>,
    config: ServerConfig,
}

impl Server {
    /// Binds the listening socket.
    ///
    /// Services can be bound before or after this call; the registry is
    /// consulted per request.
    pub async fn bind(config: ServerConfig, registry: Arc<Registry>) -> Result<Self> {
        config.validate().map_err(|e| {
            RpcError::Io(std::io::Error::new(std::io::ErrorKind::InvalidInput, e))
        })?;

        let listener = TcpListener::bind(&config.bind_addr).await.map_err(|e| {
            RpcError::Transport(format!("Failed to bind to {}: {}", config.bind_addr, e))
        })?;

        let dispatcher = Arc::new(Dispatcher::with_advertised_endpoint(
            registry,
            config.advertised_endpoint.clone(),
        ));

        Ok(Self {
            listener,
            dispatcher,
            config,
        })
    }

    /// Gets the actual bound address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| RpcError::Transport(format!("Failed to get local addr: {}", e)))
    }

    pub fn registry(&self) -> &Arc<Registry> {
        self.dispatcher.registry()
    }

    /// Serves until the process ends.
    pub async fn run(self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Serves until `shutdown` completes.
    ///
    /// After the signal no new connections are accepted and open connections
    /// stop reading. Requests already dispatched still get their responses
    /// before the connection is closed.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let local_addr = self.local_addr()?;
        let Server {
            listener,
            dispatcher,
            config,
        } = self;

        let (stop_tx, stop_rx) = watch::channel(false);
        let mut connections = JoinSet::new();
        tokio::pin!(shutdown);

        info!(addr = %local_addr, "Server listening");

        loop {
            tokio::select! {
                () = &mut shutdown => {
                    info!(addr = %local_addr, "Shutdown requested");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        info!(%peer, "Connection accepted");
                        connections.spawn(serve_connection(
                            stream,
                            peer,
                            Arc::clone(&dispatcher),
                            config.max_frame_size,
                            config.max_in_flight,
                            stop_rx.clone(),
                        ));
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to accept connection");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }

        drop(listener);
        let _ = stop_tx.send(true);
        while connections.join_next().await.is_some() {}

        info!(addr = %local_addr, "Server stopped");
        Ok(())
    }

    /// Runs the server on a background task.
    ///
    /// Must be called from within a tokio runtime. Dropping the returned
    /// handle shuts the server down.
    pub fn spawn(self) -> Result<ServerHandle> {
        let local_addr = self.local_addr()?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(self.run_until(async move {
            let _ = shutdown_rx.await;
        }));

        Ok(ServerHandle {
            local_addr,
            shutdown: shutdown_tx,
            task,
        })
    }
}

/// Control over a server started with [`Server::spawn`].
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<Result<()>>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops accepting, lets in-flight requests finish and waits for the
    /// server task to end.
    pub async fn shutdown(self) -> Result<()> {
        let _ = self.shutdown.send(());
        self.task
            .await
            .map_err(|e| RpcError::Io(std::io::Error::other(e)))?
    }

    /// Stops the server immediately. Open connections are dropped without
    /// answering in-flight requests.
    pub fn abort(self) {
        self.task.abort();
    }
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    dispatcher: Arc<Dispatcher>,
    max_frame_size: usize,
    max_in_flight: usize,
    shutdown: watch::Receiver<bool>,
) {
    if let Err(e) = stream.set_nodelay(true) {
        debug!(%peer, error = %e, "Failed to set TCP_NODELAY");
    }

    let (reader, writer) = stream.into_split();
    let (tx, rx) = mpsc::channel(RESPONSE_QUEUE_DEPTH);

    let reading = read_requests(
        reader,
        tx,
        dispatcher,
        max_frame_size,
        max_in_flight,
        shutdown,
        peer,
    );
    let writing = write_responses(writer, rx, peer);
    tokio::pin!(reading, writing);

    // The writer only finishes first if it failed: while the reader runs it
    // holds a sender, so the queue cannot close.
    tokio::select! {
        () = &mut reading => {
            if let Err(e) = writing.await {
                warn!(%peer, error = %e, "Failed to flush responses");
            }
        }
        result = &mut writing => {
            if let Err(e) = result {
                warn!(%peer, error = %e, "Write side failed, dropping connection");
            }
        }
    }

    debug!(%peer, state = ?ConnectionState::Closed, "Connection closed");
}

async fn read_requests(
    mut reader: OwnedReadHalf,
    responses: mpsc::Sender<InvocationResponse>,
    dispatcher: Arc<Dispatcher>,
    max_frame_size: usize,
    max_in_flight: usize,
    mut shutdown: watch::Receiver<bool>,
    peer: SocketAddr,
) {
    let mut state = StateLog::new(peer, "reader");
    let mut in_flight = JoinSet::new();
    let slots = Arc::new(Semaphore::new(max_in_flight));

    loop {
        if slots.available_permits() == 0 {
            trace!(%peer, limit = max_in_flight, "In-flight limit reached, pausing reads");
        }

        // A slot is taken before the next frame is read, so at the limit the
        // request stays in the socket buffer.
        let slot = tokio::select! {
            slot = Arc::clone(&slots).acquire_owned() => match slot {
                Ok(slot) => slot,
                Err(_) => break,
            },
            Ok(()) = shutdown.changed() => {
                debug!(%peer, "Server shutting down, no longer reading");
                break;
            }
        };

        state.enter(ConnectionState::ReadingFrame);

        let frame = tokio::select! {
            frame = read_frame(&mut reader, max_frame_size) => frame,
            Ok(()) = shutdown.changed() => {
                debug!(%peer, "Server shutting down, no longer reading");
                break;
            }
        };

        let payload = match frame {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                debug!(%peer, "Peer closed connection");
                break;
            }
            Err(e) => {
                warn!(%peer, error = %e, "Dropping connection after framing error");
                if !e.is_transport() {
                    let _ = responses
                        .send(InvocationResponse::failure(UNCORRELATED_REQUEST_ID, &e))
                        .await;
                }
                break;
            }
        };
        trace!(%peer, bytes = payload.len(), "Frame received");

        state.enter(ConnectionState::Decoding);
        let request = match JsonCodec::decode_request(&payload) {
            Ok(request) => request,
            Err(e) => {
                warn!(%peer, error = %e, "Dropping connection after undecodable request");
                let _ = responses
                    .send(InvocationResponse::failure(UNCORRELATED_REQUEST_ID, &e))
                    .await;
                break;
            }
        };

        state.enter(ConnectionState::Dispatching);
        let dispatcher = Arc::clone(&dispatcher);
        let responses = responses.clone();
        in_flight.spawn(async move {
            let response = dispatcher.dispatch(request).await;
            // A closed queue means the writer is gone and the connection is
            // on its way down.
            let _ = responses.send(response).await;
            drop(slot);
        });

        while in_flight.try_join_next().is_some() {}
    }

    state.enter(ConnectionState::Closing);
    while in_flight.join_next().await.is_some() {}
}

async fn write_responses(
    mut writer: OwnedWriteHalf,
    mut responses: mpsc::Receiver<InvocationResponse>,
    peer: SocketAddr,
) -> Result<()> {
    let mut state = StateLog::new(peer, "writer");

    while let Some(response) = responses.recv().await {
        state.enter(ConnectionState::Encoding);
        let payload = JsonCodec::encode_response(&response)?;

        state.enter(ConnectionState::WritingFrame);
        write_frame(&mut writer, &payload).await?;
        trace!(%peer, id = response.id, bytes = payload.len(), "Frame sent");
    }

    state.enter(ConnectionState::Closing);
    // The peer may already be gone; nothing left to tell it either way.
    let _ = writer.shutdown().await;
    Ok(())
}
