use std::sync::Arc;

use rmirpc_common::protocol::error::{Result, RpcError};
use rmirpc_common::protocol::RemoteReference;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::connection::ConnectionManager;

/// Local stand-in for a remote service.
///
/// Cloning is cheap; clones share the connection manager, so many stubs to
/// the same endpoint share one connection.
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
/// let calc = client.stub("Calc").await?;
///
/// let product: f64 = calc.call("multiply", vec![json!(3), json!(4)]).await?;
/// assert_eq!(product, 12.0);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct RemoteStub {
    reference: RemoteReference,
    connections: Arc<ConnectionManager>,
}

impl RemoteStub {
    pub fn new(reference: RemoteReference, connections: Arc<ConnectionManager>) -> Self {
        Self {
            reference,
            connections,
        }
    }

    pub fn reference(&self) -> &RemoteReference {
        &self.reference
    }

    /// Invokes `method` on the referenced service.
    ///
    /// Failures raised on the server come back as the same `RpcError`
    /// variant with the same message; `Timeout` and `Transport` mean the
    /// outcome of the call is unknown.
    pub async fn invoke(&self, method: &str, args: Vec<Value>) -> Result<Value> {
        let connection = self.connections.get(&self.reference.endpoint()).await?;
        connection.call(&self.reference.service, method, args).await
    }

    /// Like [`invoke`](Self::invoke), deserializing the result into `R`.
    pub async fn call<R>(&self, method: &str, args: Vec<Value>) -> Result<R>
    where
        R: DeserializeOwned,
    {
        let value = self.invoke(method, args).await?;
        serde_json::from_value(value).map_err(|e| {
            RpcError::Codec(format!(
                "unexpected result from {}.{}: {}",
                self.reference.service, method, e
            ))
        })
    }
}
