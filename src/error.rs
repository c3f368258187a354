//! Error Taxonomy
//!
//! Typed failures shared by commands, the task queue and the file service.
//!
//! Per-node RPC failures and partial replication never appear here. Commands
//! tally them into their reports; only aggregate outcomes reach this enum.

use thiserror::Error;

/// Shorthand used by every `StorageCommand`.
pub type CommandResult<T> = Result<T, CommandError>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CommandError {
    /// Input rejected before any work was enqueued.
    #[error("invalid input: {0}")]
    Validation(String),

    /// The permission collaborator denied the caller.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The selector had no node to offer.
    #[error("no storage nodes available")]
    NoNodesAvailable,

    /// Metadata or placements for the target do not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Every attempted node rejected the operation or failed.
    #[error("{operation} failed on all {attempted} node(s)")]
    TotalFailure {
        operation: &'static str,
        attempted: usize,
    },

    /// A metadata repository call failed.
    #[error("metadata error: {0}")]
    Metadata(String),

    /// The queue no longer accepts work.
    #[error("task queue is shut down")]
    QueueClosed,

    /// The command panicked or was cancelled before producing a result.
    #[error("command aborted before completion")]
    Aborted,
}

impl CommandError {
    /// Wraps a repository failure, keeping only its rendered message.
    pub fn metadata(err: anyhow::Error) -> Self {
        CommandError::Metadata(format!("{:#}", err))
    }

    /// Machine-readable reason code exposed through `OperationResponse`.
    pub fn code(&self) -> &'static str {
        match self {
            CommandError::Validation(_) => "INVALID_INPUT",
            CommandError::PermissionDenied(_) => "PERMISSION_DENIED",
            CommandError::NoNodesAvailable => "NO_NODES_AVAILABLE",
            CommandError::NotFound(_) => "NOT_FOUND",
            CommandError::TotalFailure { operation, .. } => match *operation {
                "upload" => "UPLOAD_FAILED",
                "download" => "DOWNLOAD_FAILED",
                _ => "DELETE_FAILED",
            },
            CommandError::Metadata(_) => "METADATA_ERROR",
            CommandError::QueueClosed => "QUEUE_CLOSED",
            CommandError::Aborted => "ABORTED",
        }
    }
}
