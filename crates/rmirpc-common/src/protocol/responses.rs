//! Invocation response types
//!
//! A response carries the id of the request it answers and a tagged outcome.
//! Failures keep their [`ErrorKind`] so the client can re-raise the same error
//! it would have seen locally.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::{ErrorKind, RpcError};
use super::requests::RequestId;

/// Result of one invocation as it crosses the wire.
///
/// # Example
///
/// ```
/// use rmirpc_common::protocol::{ErrorKind, Outcome};
/// use serde_json::json;
///
/// let ok = Outcome::Success { value: json!(12) };
/// let failed = Outcome::Failure {
///     kind: ErrorKind::NotBound,
///     message: "Missing".to_string(),
/// };
/// assert!(ok.is_success());
/// assert!(!failed.is_success());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Success { value: Value },
    Failure { kind: ErrorKind, message: String },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }
}

/// Response to an [`InvocationRequest`](super::InvocationRequest).
///
/// # Example
///
/// ```
/// use rmirpc_common::protocol::{InvocationResponse, RpcError};
/// use serde_json::json;
///
/// let response = InvocationResponse::success(7, json!(12));
/// assert_eq!(response.into_result().unwrap(), json!(12));
///
/// let response = InvocationResponse::failure(8, &RpcError::NotBound("Missing".into()));
/// assert!(matches!(response.into_result(), Err(RpcError::NotBound(_))));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct InvocationResponse {
    pub id: RequestId,
    pub outcome: Outcome,
}

impl InvocationResponse {
    pub fn success(id: RequestId, value: Value) -> Self {
        InvocationResponse {
            id,
            outcome: Outcome::Success { value },
        }
    }

    /// Builds a failed response from any error, keeping its kind and detail.
    pub fn failure(id: RequestId, error: &RpcError) -> Self {
        InvocationResponse {
            id,
            outcome: Outcome::Failure {
                kind: error.kind(),
                message: error.detail(),
            },
        }
    }

    pub fn from_result(id: RequestId, result: Result<Value, RpcError>) -> Self {
        match result {
            Ok(value) => Self::success(id, value),
            Err(e) => Self::failure(id, &e),
        }
    }

    /// Converts the outcome back into a local result.
    pub fn into_result(self) -> Result<Value, RpcError> {
        match self.outcome {
            Outcome::Success { value } => Ok(value),
            Outcome::Failure { kind, message } => Err(RpcError::from_failure(kind, message)),
        }
    }
}
