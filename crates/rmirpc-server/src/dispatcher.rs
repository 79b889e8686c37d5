//! Request dispatch.
//!
//! Turns one decoded [`InvocationRequest`] into exactly one
//! [`InvocationResponse`] carrying the same id. Every failure below the
//! framing layer ends up inside the response; nothing here can take a
//! connection down.

use std::any::Any;
use std::sync::Arc;

use rmirpc_common::protocol::builtin::{
    LIST_METHOD, LOOKUP_METHOD, PING_METHOD, PONG, REGISTRY_SERVICE,
};
use rmirpc_common::protocol::error::{Result, RpcError};
use rmirpc_common::protocol::{ArgType, InvocationRequest, InvocationResponse};
use serde_json::Value;
use tracing::debug;

use crate::method_table::MethodTable;
use crate::registry::Registry;

/// Routes requests to bound services and to the built-in `_registry`.
#[derive(Debug)]
pub struct Dispatcher {
    registry: Arc<Registry>,
    builtin: MethodTable,
}

impl Dispatcher {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self::with_advertised_endpoint(registry, None)
    }

    /// Creates a dispatcher whose `_registry.lookup` answers carry
    /// `endpoint` as the address to call.
    pub fn with_advertised_endpoint(registry: Arc<Registry>, endpoint: Option<String>) -> Self {
        let builtin = registry_service(Arc::clone(&registry), endpoint);
        Self { registry, builtin }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Handles one request.
    ///
    /// Application handlers run on the blocking pool, so a slow method only
    /// holds up its own caller. Built-in methods are answered inline.
    pub async fn dispatch(&self, request: InvocationRequest) -> InvocationResponse {
        let id = request.id;
        debug!(id, target = %request.target(), "Dispatching request");

        let result = if request.service == REGISTRY_SERVICE {
            self.builtin
                .invoke(&request.service, &request.method, request.args)
        } else {
            self.invoke(request).await
        };

        if let Err(ref e) = result {
            debug!(id, kind = %e.kind(), error = %e, "Request failed");
        }

        InvocationResponse::from_result(id, result)
    }

    async fn invoke(&self, request: InvocationRequest) -> Result<Value> {
        let table = self.registry.resolve(&request.service)?;
        let InvocationRequest {
            service,
            method,
            args,
            ..
        } = request;

        match tokio::task::spawn_blocking(move || table.invoke(&service, &method, args)).await {
            Ok(result) => result,
            Err(e) if e.is_panic() => Err(RpcError::Application(format!(
                "handler panicked: {}",
                panic_message(e.into_panic().as_ref())
            ))),
            Err(e) => Err(RpcError::Application(format!("handler did not complete: {}", e))),
        }
    }
}

/// The `_registry` service every server answers.
fn registry_service(registry: Arc<Registry>, endpoint: Option<String>) -> MethodTable {
    let lookup_registry = Arc::clone(&registry);

    MethodTable::builder()
        .method(LOOKUP_METHOD, vec![ArgType::String], move |(name,): (String,)| {
            let mut descriptor = lookup_registry.lookup(&name)?;
            descriptor.endpoint = endpoint.clone();
            Ok(descriptor)
        })
        .method(LIST_METHOD, vec![], move |()| Ok(registry.list()))
        .method(PING_METHOD, vec![], |()| Ok(PONG))
        .build()
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}
