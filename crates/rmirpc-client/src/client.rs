use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use rmirpc_common::protocol::error::{Result, RpcError};
use rmirpc_common::protocol::{RemoteReference, ServiceName};
use serde_json::Value;
use tracing::debug;

use crate::config::ClientConfig;
use crate::connection::ConnectionManager;
use crate::resolver::{RegistryClient, Resolver};
use crate::stub::RemoteStub;

/// rmirpc client.
///
/// Looks names up through a [`Resolver`], normally a registry's `_registry`
/// service, and caches the resulting references, so repeated calls to the
/// same service skip the lookup. All calls share one connection per
/// endpoint.
///
/// # Example
///
/// ```no_run
/// use rmirpc_client::Client;
/// use serde_json::json;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let client = Client::connect("127.0.0.1", 1099).await?;
/// let price = client
///     .call("PriceCalculator", "calculateSellingPrice", vec![json!(100.0), json!(15.0)])
///     .await?;
/// assert_eq!(price, json!(85.0));
/// # Ok(())
/// # }
/// ```
pub struct Client {
    resolver: Arc<dyn Resolver>,
    connections: Arc<ConnectionManager>,
    references: Mutex<HashMap<ServiceName, RemoteReference>>,
}

impl Client {
    /// Connects to the registry at `host:port` with default settings.
    pub async fn connect(host: impl Into<String>, port: u16) -> Result<Self> {
        Self::with_config(host, port, ClientConfig::default()).await
    }

    /// Connects to the registry at `host:port`.
    ///
    /// The registry is pinged once, so an unreachable address fails here
    /// rather than on the first call.
    pub async fn with_config(host: impl Into<String>, port: u16, config: ClientConfig) -> Result<Self> {
        config.validate().map_err(|e| {
            RpcError::Io(std::io::Error::new(std::io::ErrorKind::InvalidInput, e))
        })?;

        let connections = Arc::new(ConnectionManager::new(config));
        let registry = RegistryClient::new(host, port, Arc::clone(&connections));
        registry.ping().await?;
        debug!(registry = %registry.endpoint(), "Connected to registry");

        Ok(Self::with_resolver(Arc::new(registry), connections))
    }

    /// Builds a client that resolves names through `resolver` and calls
    /// services over `connections`. Nothing is contacted up front.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use std::sync::Arc;
    /// use rmirpc_client::{Client, ClientConfig, ConnectionManager, StaticResolver};
    /// use rmirpc_common::RemoteReference;
    /// use serde_json::json;
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let resolver = StaticResolver::new()
    ///     .with_reference(RemoteReference::new("10.0.0.5", 1099, "Calc"));
    /// let client = Client::with_resolver(
    ///     Arc::new(resolver),
    ///     Arc::new(ConnectionManager::new(ClientConfig::default())),
    /// );
    ///
    /// let product = client.call("Calc", "multiply", vec![json!(3), json!(4)]).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn with_resolver(resolver: Arc<dyn Resolver>, connections: Arc<ConnectionManager>) -> Self {
        Self {
            resolver,
            connections,
            references: Mutex::new(HashMap::new()),
        }
    }

    pub fn resolver(&self) -> &Arc<dyn Resolver> {
        &self.resolver
    }

    pub fn connections(&self) -> &Arc<ConnectionManager> {
        &self.connections
    }

    /// Resolves `name`, answering from the cache when possible.
    pub async fn lookup(&self, name: &str) -> Result<RemoteReference> {
        if let Some(reference) = self.cached(name) {
            return Ok(reference);
        }

        match self.resolver.resolve(name).await {
            Ok(reference) => {
                self.references
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(name.to_owned(), reference.clone());
                Ok(reference)
            }
            Err(e) => {
                self.forget(name);
                Err(e)
            }
        }
    }

    /// Names the resolver knows, sorted.
    pub async fn list(&self) -> Result<Vec<ServiceName>> {
        self.resolver.names().await
    }

    pub async fn stub(&self, name: &str) -> Result<RemoteStub> {
        let reference = self.lookup(name).await?;
        Ok(RemoteStub::new(reference, Arc::clone(&self.connections)))
    }

    /// Looks `name` up and invokes `method` on it.
    ///
    /// A `NotBound` answer or a transport failure drops the cached reference,
    /// so the next call looks the name up again.
    pub async fn call(&self, name: &str, method: &str, args: Vec<Value>) -> Result<Value> {
        let stub = self.stub(name).await?;
        let result = stub.invoke(method, args).await;

        if let Err(ref e) = result {
            if matches!(e, RpcError::NotBound(_)) || e.is_transport() {
                self.forget(name);
            }
        }
        result
    }

    /// Drops the cached reference for `name`.
    pub fn forget(&self, name: &str) {
        let removed = self
            .references
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);

        if removed.is_some() {
            debug!(service = %name, "Evicted cached reference");
        }
    }

    fn cached(&self, name: &str) -> Option<RemoteReference> {
        self.references
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("connections", &self.connections)
            .finish_non_exhaustive()
    }
}
