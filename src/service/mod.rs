//! File Service
//!
//! Entry point for the request layer. Callers arrive already authenticated; the service
//! validates input, asks the permission collaborator, builds the matching command,
//! enqueues it and waits on the handle within a per-operation budget.
//!
//! ## Response contract
//! Failures come back as `OperationResponse` values carrying a reason code
//! (`UPLOAD_FAILED`, `TIMEOUT`, `NO_NODES_AVAILABLE`, ...). Internal error text stays in
//! the logs. A `TIMEOUT` means the outcome is unknown: the command may still complete.

pub mod files;
pub mod permissions;
pub mod types;

#[cfg(test)]
mod tests;
