//! Metadata Module
//!
//! The persisted side of the system: directory hierarchy, file descriptors,
//! file-to-node placements, node registrations and sharing grants.
//!
//! ## Core Concepts
//! - **Repository contract**: `MetadataRepository` is the seam every command and the
//!   node selector talk to. Production deployments back it with a relational store.
//! - **Authoritative usage**: `node_usage` is the ground truth the selector resyncs against.
//! - **Placements**: recorded once per successful per-node transfer; never rolled back.
//!
//! `InMemoryMetadata` implements the full contract with concurrent maps and is what the
//! binary and the tests run against.

pub mod memory;
pub mod repository;
pub mod types;
