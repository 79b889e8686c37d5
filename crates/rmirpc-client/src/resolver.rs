//! Name resolution.
//!
//! A [`Resolver`] turns a service name into a [`RemoteReference`]. The
//! network implementation asks a server's built-in `_registry` service;
//! [`StaticResolver`] answers from a fixed table and is handy when the
//! address of every service is known up front.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use rmirpc_common::protocol::builtin::{LIST_METHOD, LOOKUP_METHOD, PING_METHOD, REGISTRY_SERVICE};
use rmirpc_common::protocol::error::{Result, RpcError};
use rmirpc_common::protocol::{split_endpoint, RemoteReference, ServiceDescriptor, ServiceName};
use serde_json::json;
use tracing::debug;

use crate::connection::ConnectionManager;
use crate::stub::RemoteStub;

#[async_trait]
pub trait Resolver: Send + Sync {
    /// Resolves `name`, failing with `NotBound` if nothing is bound there.
    async fn resolve(&self, name: &str) -> Result<RemoteReference>;

    /// All names this resolver knows, sorted.
    async fn names(&self) -> Result<Vec<ServiceName>>;
}

/// Resolves names against a remote registry.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    host: String,
    port: u16,
    registry: RemoteStub,
}

impl RegistryClient {
    pub fn new(host: impl Into<String>, port: u16, connections: Arc<ConnectionManager>) -> Self {
        let host = host.into();
        let registry = RemoteStub::new(
            RemoteReference::new(host.clone(), port, REGISTRY_SERVICE),
            connections,
        );
        Self {
            host,
            port,
            registry,
        }
    }

    /// `host:port` of the registry.
    pub fn endpoint(&self) -> String {
        self.registry.reference().endpoint()
    }

    pub async fn lookup(&self, name: &str) -> Result<ServiceDescriptor> {
        self.registry.call(LOOKUP_METHOD, vec![json!(name)]).await
    }

    pub async fn list(&self) -> Result<Vec<ServiceName>> {
        self.registry.call(LIST_METHOD, vec![]).await
    }

    /// Round trip to the registry; fails if it cannot be reached.
    pub async fn ping(&self) -> Result<()> {
        let _: String = self.registry.call(PING_METHOD, vec![]).await?;
        Ok(())
    }

    fn reference_for(&self, descriptor: ServiceDescriptor) -> Result<RemoteReference> {
        let Some(endpoint) = descriptor.endpoint else {
            return Ok(RemoteReference::new(self.host.clone(), self.port, descriptor.service));
        };

        let (host, port) = split_endpoint(&endpoint).ok_or_else(|| {
            RpcError::Codec(format!("invalid endpoint in lookup result: {:?}", endpoint))
        })?;
        Ok(RemoteReference::new(host, port, descriptor.service))
    }
}

#[async_trait]
impl Resolver for RegistryClient {
    async fn resolve(&self, name: &str) -> Result<RemoteReference> {
        let descriptor = self.lookup(name).await?;
        let reference = self.reference_for(descriptor)?;
        debug!(service = %name, reference = %reference, "Resolved service");
        Ok(reference)
    }

    async fn names(&self) -> Result<Vec<ServiceName>> {
        self.list().await
    }
}

/// Resolves names from a fixed table.
///
/// # Example
///
/// ```
/// use rmirpc_client::{Resolver, StaticResolver};
/// use rmirpc_common::RemoteReference;
///
/// # #[tokio::main]
/// # async fn main() {
/// let resolver = StaticResolver::new()
///     .with_reference(RemoteReference::new("10.0.0.5", 1099, "Calc"));
///
/// let reference = resolver.resolve("Calc").await.unwrap();
/// assert_eq!(reference.endpoint(), "10.0.0.5:1099");
/// assert!(resolver.resolve("Missing").await.is_err());
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    references: HashMap<ServiceName, RemoteReference>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `reference` under its service name, replacing any earlier entry.
    pub fn with_reference(mut self, reference: RemoteReference) -> Self {
        self.insert(reference);
        self
    }

    pub fn insert(&mut self, reference: RemoteReference) -> Option<RemoteReference> {
        self.references.insert(reference.service.clone(), reference)
    }
}

#[async_trait]
impl Resolver for StaticResolver {
    async fn resolve(&self, name: &str) -> Result<RemoteReference> {
        self.references
            .get(name)
            .cloned()
            .ok_or_else(|| RpcError::NotBound(name.to_owned()))
    }

    async fn names(&self) -> Result<Vec<ServiceName>> {
        let mut names: Vec<_> = self.references.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}
