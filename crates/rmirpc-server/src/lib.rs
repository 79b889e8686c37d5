//! rmirpc Server
//!
//! This crate provides the server side of rmirpc: a [`Registry`] mapping
//! service names to [`MethodTable`]s, the [`Dispatcher`] that turns decoded
//! requests into responses, and the TCP [`Server`] that runs it all.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use rmirpc_common::protocol::ArgType;
//! use rmirpc_server::{MethodTable, Registry, Server, ServerConfig};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = Arc::new(Registry::new());
//! registry.bind(
//!     "Calc",
//!     MethodTable::builder()
//!         .method("multiply", vec![ArgType::Number, ArgType::Number], |(a, b): (f64, f64)| Ok(a * b))
//!         .build(),
//! )?;
//!
//! let handle = Server::bind(ServerConfig::default(), registry).await?.spawn()?;
//! println!("listening on {}", handle.local_addr());
//! handle.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod dispatcher;
mod finite;
pub mod method_table;
pub mod registry;
pub mod server;

pub use config::ServerConfig;
pub use dispatcher::Dispatcher;
pub use method_table::{Handler, MethodTable, MethodTableBuilder};
pub use registry::Registry;
pub use server::{Server, ServerHandle};
