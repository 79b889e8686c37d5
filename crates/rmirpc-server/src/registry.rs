//! Name-to-service directory.
//!
//! The registry is the only state shared by every connection of a server.
//! All operations take the same lock, so a lookup never observes a binding
//! half-way through `rebind`. The lock only guards the map itself: callers
//! get an `Arc<MethodTable>` back and run handlers after it is released.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use rmirpc_common::protocol::builtin::is_reserved_name;
use rmirpc_common::protocol::error::{Result, RpcError};
use rmirpc_common::protocol::{ServiceDescriptor, ServiceName};
use tracing::{debug, info};

use crate::method_table::MethodTable;

/// In-memory service registry.
///
/// Bindings live as long as the registry; there is no persistence.
///
/// # Example
///
/// ```
/// use rmirpc_common::protocol::ArgType;
/// use rmirpc_server::{MethodTable, Registry};
///
/// let registry = Registry::new();
/// let calc = MethodTable::builder()
///     .method("multiply", vec![ArgType::Number, ArgType::Number], |(a, b): (f64, f64)| Ok(a * b))
///     .build();
///
/// registry.bind("Calc", calc).unwrap();
/// assert!(registry.lookup("Calc").is_ok());
/// assert!(registry.lookup("Missing").is_err());
/// ```
#[derive(Debug, Default)]
pub struct Registry {
    services: RwLock<HashMap<ServiceName, Arc<MethodTable>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `target` under `name`.
    ///
    /// # Errors
    ///
    /// - `AlreadyBound` if the name is taken; the existing binding is kept
    /// - `InvalidName` for empty or reserved names
    pub fn bind(&self, name: &str, target: impl Into<Arc<MethodTable>>) -> Result<()> {
        validate_name(name)?;

        let mut services = self.services.write().unwrap_or_else(PoisonError::into_inner);
        if services.contains_key(name) {
            debug!(service = %name, "Service already bound");
            return Err(RpcError::AlreadyBound(name.to_owned()));
        }

        let target = target.into();
        info!(service = %name, methods = target.len(), "Service bound");
        services.insert(name.to_owned(), target);
        Ok(())
    }

    /// Binds `target` under `name`, replacing whatever was there.
    ///
    /// Returns the previous target. Fails only for malformed names.
    pub fn rebind(
        &self,
        name: &str,
        target: impl Into<Arc<MethodTable>>,
    ) -> Result<Option<Arc<MethodTable>>> {
        validate_name(name)?;

        let target = target.into();
        let methods = target.len();
        let previous = self
            .services
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_owned(), target);

        info!(service = %name, methods, replaced = previous.is_some(), "Service rebound");
        Ok(previous)
    }

    /// Removes the binding for `name`, if any.
    pub fn unbind(&self, name: &str) -> Result<()> {
        let removed = self
            .services
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);

        if removed.is_some() {
            info!(service = %name, "Service unbound");
        } else {
            debug!(service = %name, "Service not bound, nothing to unbind");
        }
        Ok(())
    }

    /// Resolves `name` to the bound method table.
    pub fn resolve(&self, name: &str) -> Result<Arc<MethodTable>> {
        self.services
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| RpcError::NotBound(name.to_owned()))
    }

    /// Describes the service bound under `name`.
    ///
    /// The descriptor carries no endpoint; the server fills one in when it
    /// advertises an address.
    pub fn lookup(&self, name: &str) -> Result<ServiceDescriptor> {
        let target = self.resolve(name)?;
        Ok(ServiceDescriptor {
            service: name.to_owned(),
            methods: target.descriptors(),
            endpoint: None,
        })
    }

    /// All bound names, sorted.
    pub fn list(&self) -> Vec<ServiceName> {
        let mut names: Vec<_> = self
            .services
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.services.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || is_reserved_name(name) {
        return Err(RpcError::InvalidName(name.to_owned()));
    }
    Ok(())
}
