//! Storage Node Module
//!
//! Everything the orchestrator knows about the fleet of storage nodes.
//!
//! ## Core Concepts
//! - **Handles**: each node is reached through a `NodeRpc` handle; `HttpNodeClient` is the
//!   reference transport and `server` the matching node-side service.
//! - **Directory**: `NodeDirectory` turns configured endpoints into stable node ids.
//! - **Selection**: `NodeSelector` ranks nodes by relative disk usage plus in-flight tasks
//!   and picks a primary with replicas for every upload.
//! - **Metrics**: per-node counters are single-field atomics, refreshed from the metadata
//!   repository once at startup and then periodically.

pub mod directory;
pub mod http;
pub mod protocol;
pub mod rpc;
pub mod selector;
pub mod server;
pub mod types;
