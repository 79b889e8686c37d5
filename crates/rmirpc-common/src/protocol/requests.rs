use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};

pub type RequestId = u64;
pub type ServiceName = String;
pub type MethodId = String;

/// Request id used for responses to frames that could not be decoded.
pub const UNCORRELATED_REQUEST_ID: RequestId = 0;

/// One remote method invocation.
///
/// `args` is the ordered argument list; the dispatcher checks it against the
/// parameter types the target method declared when it was registered.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct InvocationRequest {
    pub id: RequestId,
    pub service: ServiceName,
    pub method: MethodId,
    #[serde(default)]
    pub args: Vec<Value>,
}

impl InvocationRequest {
    pub fn new(
        id: RequestId,
        service: impl Into<ServiceName>,
        method: impl Into<MethodId>,
        args: Vec<Value>,
    ) -> Self {
        InvocationRequest {
            id,
            service: service.into(),
            method: method.into(),
            args,
        }
    }

    /// `service.method`, as used in logs and `UnknownMethod` errors.
    pub fn target(&self) -> String {
        format!("{}.{}", self.service, self.method)
    }
}

/// Hands out request ids for one connection.
///
/// Ids start at 1 and only grow, so they are unique for the lifetime of the
/// connection. Zero is never issued (see [`UNCORRELATED_REQUEST_ID`]).
#[derive(Debug)]
pub struct RequestIdGenerator {
    next: AtomicU64,
}

impl RequestIdGenerator {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    pub fn next_id(&self) -> RequestId {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for RequestIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}
