use crate::protocol::error::Result;
use crate::protocol::{InvocationRequest, InvocationResponse};

/// JSON codec for invocation payloads.
///
/// Encoding is deterministic: struct fields are written in declaration order
/// and `serde_json` maps keep their keys sorted, so equal values always
/// produce identical bytes. Anything that does not decode to exactly one
/// well-formed message (trailing bytes, unknown fields, wrong types) is an
/// error of kind `Codec`.
///
/// # Example
///
/// ```
/// use rmirpc_common::transport::JsonCodec;
/// use rmirpc_common::protocol::{InvocationRequest, InvocationResponse};
/// use serde_json::json;
///
/// let request = InvocationRequest::new(1, "Calc", "multiply", vec![json!(3), json!(4)]);
/// let encoded = JsonCodec::encode_request(&request).unwrap();
/// assert_eq!(JsonCodec::decode_request(&encoded).unwrap(), request);
///
/// let response = InvocationResponse::success(1, json!(12));
/// let encoded = JsonCodec::encode_response(&response).unwrap();
/// assert_eq!(JsonCodec::decode_response(&encoded).unwrap(), response);
/// ```
pub struct JsonCodec;

impl JsonCodec {
    pub fn encode_request(request: &InvocationRequest) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(request)?)
    }

    pub fn decode_request(data: &[u8]) -> Result<InvocationRequest> {
        Ok(serde_json::from_slice(data)?)
    }

    pub fn encode_response(response: &InvocationResponse) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(response)?)
    }

    pub fn decode_response(data: &[u8]) -> Result<InvocationResponse> {
        Ok(serde_json::from_slice(data)?)
    }
}
