//! Built-in registry service
//!
//! Every server answers the reserved `_registry` service without it being
//! bound. Clients on another host use it to resolve names remotely. Names
//! starting with `_` are reserved and cannot be bound by applications.

use serde::{Deserialize, Serialize};

use super::requests::ServiceName;
use super::signature::MethodDescriptor;

// ============================================================================
// Reserved names
// ============================================================================

/// Service name of the built-in registry.
pub const REGISTRY_SERVICE: &str = "_registry";

/// `lookup(name: string) -> ServiceDescriptor`
pub const LOOKUP_METHOD: &str = "lookup";

/// `list() -> [string]`
pub const LIST_METHOD: &str = "list";

/// `ping() -> "pong"`
pub const PING_METHOD: &str = "ping";

pub const PONG: &str = "pong";

/// Names starting with `_` belong to built-in services.
pub fn is_reserved_name(name: &str) -> bool {
    name.starts_with('_')
}

// ============================================================================
// Lookup response
// ============================================================================

/// What a registry lookup reveals about a bound service.
///
/// `endpoint` is the `host:port` the service should be called on when the
/// server advertises one; `None` means "the address you looked it up at".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceDescriptor {
    pub service: ServiceName,
    pub methods: Vec<MethodDescriptor>,
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl ServiceDescriptor {
    pub fn method(&self, id: &str) -> Option<&MethodDescriptor> {
        self.methods.iter().find(|m| m.id == id)
    }
}
