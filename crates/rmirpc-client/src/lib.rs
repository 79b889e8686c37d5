//! rmirpc Client
//!
//! Looks services up in a remote registry and invokes their methods through
//! [`RemoteStub`]s. Calls to the same endpoint share one multiplexed
//! connection managed by [`ConnectionManager`].

pub mod client;
pub mod config;
pub mod connection;
pub mod resolver;
pub mod stub;

pub use client::Client;
pub use config::ClientConfig;
pub use connection::{Connection, ConnectionManager};
pub use resolver::{RegistryClient, Resolver, StaticResolver};
pub use stub::RemoteStub;
