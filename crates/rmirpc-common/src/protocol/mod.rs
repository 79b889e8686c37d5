pub mod builtin;
pub mod error;
pub mod reference;
pub mod requests;
pub mod responses;
pub mod signature;


pub use builtin::ServiceDescriptor;
pub use error::{ErrorKind, Result, RpcError};
pub use reference::{split_endpoint, RemoteReference};
pub use requests::{
    InvocationRequest, MethodId, RequestId, RequestIdGenerator, ServiceName,
    UNCORRELATED_REQUEST_ID,
};
pub use responses::{InvocationResponse, Outcome};
pub use signature::{ArgType, MethodDescriptor};
