use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification of a failure, carried on the wire inside a failed response.
///
/// The kind is what survives the process boundary: a client rebuilds the same
/// [`RpcError`] variant from it, so a propagated remote failure can only be
/// told apart from a local one by its kind.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    AlreadyBound,
    NotBound,
    UnknownMethod,
    ArgumentMismatch,
    Codec,
    Transport,
    Application,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::AlreadyBound => "AlreadyBound",
            ErrorKind::NotBound => "NotBound",
            ErrorKind::UnknownMethod => "UnknownMethod",
            ErrorKind::ArgumentMismatch => "ArgumentMismatch",
            ErrorKind::Codec => "Codec",
            ErrorKind::Transport => "Transport",
            ErrorKind::Application => "Application",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum RpcError {
    #[error("Name already bound: {0}")]
    AlreadyBound(String),

    #[error("Name not bound: {0}")]
    NotBound(String),

    #[error("Invalid service name: {0:?}")]
    InvalidName(String),

    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    #[error("Argument mismatch: {0}")]
    ArgumentMismatch(String),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Application error: {0}")]
    Application(String),
}

impl RpcError {
    /// Shorthand for a handler's own business-logic failure.
    pub fn application(message: impl Into<String>) -> Self {
        RpcError::Application(message.into())
    }

    /// The wire classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RpcError::AlreadyBound(_) => ErrorKind::AlreadyBound,
            RpcError::NotBound(_) => ErrorKind::NotBound,
            RpcError::InvalidName(_) | RpcError::ArgumentMismatch(_) => ErrorKind::ArgumentMismatch,
            RpcError::UnknownMethod(_) => ErrorKind::UnknownMethod,
            RpcError::Codec(_) | RpcError::Json(_) => ErrorKind::Codec,
            RpcError::Transport(_) | RpcError::Timeout(_) | RpcError::Io(_) => ErrorKind::Transport,
            RpcError::Application(_) => ErrorKind::Application,
        }
    }

    /// The message that travels next to the kind.
    ///
    /// This is the variant payload without the display prefix, so that
    /// `from_failure(e.kind(), e.detail())` displays exactly like `e` for
    /// every variant that maps one-to-one onto its kind.
    pub fn detail(&self) -> String {
        match self {
            RpcError::AlreadyBound(s)
            | RpcError::NotBound(s)
            | RpcError::InvalidName(s)
            | RpcError::UnknownMethod(s)
            | RpcError::ArgumentMismatch(s)
            | RpcError::Codec(s)
            | RpcError::Transport(s)
            | RpcError::Application(s) => s.clone(),
            RpcError::Json(e) => e.to_string(),
            RpcError::Timeout(ms) => format!("request timed out after {}ms", ms),
            RpcError::Io(e) => e.to_string(),
        }
    }

    /// Rebuilds an error received in a failed response.
    pub fn from_failure(kind: ErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        match kind {
            ErrorKind::AlreadyBound => RpcError::AlreadyBound(message),
            ErrorKind::NotBound => RpcError::NotBound(message),
            ErrorKind::UnknownMethod => RpcError::UnknownMethod(message),
            ErrorKind::ArgumentMismatch => RpcError::ArgumentMismatch(message),
            ErrorKind::Codec => RpcError::Codec(message),
            ErrorKind::Transport => RpcError::Transport(message),
            ErrorKind::Application => RpcError::Application(message),
        }
    }

    /// True for errors after which the connection that produced them must be
    /// discarded: framing/decoding failures and raw socket faults.
    pub fn is_connection_fatal(&self) -> bool {
        matches!(
            self,
            RpcError::Codec(_) | RpcError::Json(_) | RpcError::Transport(_) | RpcError::Io(_)
        )
    }

    /// True for errors raised by the transport rather than by the remote side.
    pub fn is_transport(&self) -> bool {
        self.kind() == ErrorKind::Transport
    }
}

impl From<std::net::AddrParseError> for RpcError {
    fn from(err: std::net::AddrParseError) -> Self {
        RpcError::Transport(format!("invalid address: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, RpcError>;
