//! Storage Orchestrator Library
//!
//! Coordinates file storage across a fleet of independent storage nodes: every upload is
//! replicated onto load-aware picks, every client operation runs as a command on a
//! worker pool, and partial node failures are absorbed instead of surfaced.
//!
//! ## Architecture Modules
//! - **`nodes`**: node handles and transport, the node directory and the load-aware
//!   `NodeSelector` with its per-node metrics.
//! - **`executor`**: the `TaskQueue` worker pool and the `StorageCommand` contract.
//! - **`commands`**: one command per operation (upload, download, delete, directories),
//!   each encoding its multi-node protocol and failure policy.
//! - **`metadata`**: the repository contract for directories, files and placements, plus
//!   an in-memory implementation.
//! - **`service`**: `FileService`, the entry point for an already-authenticated caller.
//! - **`config`** / **`error`**: tunables and the shared error taxonomy.

pub mod commands;
pub mod config;
pub mod error;
pub mod executor;
pub mod metadata;
pub mod nodes;
pub mod service;

#[cfg(test)]
mod test_support;
