//! rmirpc Transport Layer
//!
//! This module provides the wire codec, length-prefixed framing and TCP
//! connection helpers shared by the server and the client.
//!
//! # Architecture
//!
//! - **Transport**: TCP, one long-lived connection per endpoint
//! - **Codec**: JSON serialization for invocation messages
//! - **Wire Format**: `[4-byte length prefix as u32 big-endian] + [JSON data]`
//!
//! # Components
//!
//! - **[`JsonCodec`]**: Encode/decode requests and responses
//! - **[`frame`]**: Async frame reader/writer over any tokio stream
//! - **[`tcp`]**: Connecting with a timeout
//!
//! # Example
//!
//! ```no_run
//! use rmirpc_common::protocol::InvocationRequest;
//! use rmirpc_common::transport::{frame, tcp, JsonCodec};
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut stream = tcp::connect("127.0.0.1:1099", tcp::DEFAULT_CONNECT_TIMEOUT).await?;
//!
//! let request = InvocationRequest::new(1, "Calc", "multiply", vec![json!(3), json!(4)]);
//! frame::write_frame(&mut stream, &JsonCodec::encode_request(&request)?).await?;
//!
//! if let Some(payload) = frame::read_frame(&mut stream, frame::DEFAULT_MAX_FRAME_SIZE).await? {
//!     let response = JsonCodec::decode_response(&payload)?;
//!     println!("{:?}", response.into_result());
//! }
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod frame;
pub mod tcp;

pub use codec::JsonCodec;
pub use frame::{read_frame, write_frame, DEFAULT_MAX_FRAME_SIZE};
