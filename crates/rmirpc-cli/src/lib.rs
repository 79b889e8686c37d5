// Copyright 2025 rmirpc Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # rmirpc CLI
//!
//! Command-line interface for the rmirpc remote invocation system.
//!
//! ## Key Commands
//!
//! - `rmirpc serve`: Start a registry server with the demo services bound
//! - `rmirpc lookup`: Resolve a service name to a reference
//! - `rmirpc list`: List the names bound at a registry
//! - `rmirpc call`: Invoke a method (outputs raw JSON for scripting)

use anyhow::{anyhow, Result};
use rmirpc_common::protocol::split_endpoint;

pub mod services;

/// Environment variable that overrides the default `serve` bind address.
pub const BIND_ENV: &str = "RMIRPC_BIND";

/// Splits a registry address of the form `host:port`.
///
/// Bracketed IPv6 hosts (`[::1]:1099`) are accepted.
pub fn parse_registry_addr(addr: &str) -> Result<(String, u16)> {
    split_endpoint(addr)
        .ok_or_else(|| anyhow!("Invalid registry address '{}': expected host:port", addr))
}
