//! rmirpc Common Types and Transport
//!
//! This crate provides the protocol definitions and the framed TCP transport
//! shared by the rmirpc server and client.
//!
//! # Overview
//!
//! rmirpc is a name-based remote invocation system. A server keeps a registry
//! of named services, each with a fixed table of methods; clients look a
//! name up, get a [`RemoteReference`], and invoke methods on it as if they
//! were local. This crate contains the pieces both sides agree on:
//!
//! - **Protocol Layer**: invocation requests and responses, method
//!   signatures, the built-in registry service, and the error taxonomy
//! - **Transport Layer**: JSON codec, length-prefixed frames, TCP connect
//!
//! # Wire protocol
//!
//! - **Transport**: TCP, connections are kept open and may carry many calls
//! - **Serialization**: JSON
//! - **Message Format**: `[4-byte length prefix as u32 big-endian] + [JSON data]`
//! - **Correlation**: every response echoes the id of its request
//!
//! # Example
//!
//! ```
//! use rmirpc_common::{InvocationRequest, InvocationResponse};
//! use serde_json::json;
//!
//! let request = InvocationRequest::new(1, "Calc", "multiply", vec![json!(3), json!(4)]);
//! let response = InvocationResponse::success(request.id, json!(12));
//! assert_eq!(response.into_result().unwrap(), json!(12));
//! ```

pub mod protocol;
pub mod transport;

pub use protocol::*;
