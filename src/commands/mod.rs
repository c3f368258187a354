//! Storage Commands
//!
//! One `StorageCommand` per client-facing operation. Each command owns exactly the inputs
//! and collaborators it needs and encodes the multi-node protocol of its operation.
//!
//! ## Shared shape
//! `created -> metadata pre-write (upload only) -> node attempts -> metadata finalize -> done`
//!
//! Node attempts run in order and continue past individual failures: a node that throws
//! or refuses is logged and tallied, never propagated. Only "no node succeeded" becomes a
//! `TotalFailure`. Repository failures surface directly as `Metadata` errors.
//! There is no retry inside a command.

pub mod delete;
pub mod directory;
pub mod download;
pub mod types;
pub mod upload;

pub use delete::{DeleteDirectoryCommand, DeleteFileCommand};
pub use directory::CreateDirectoryCommand;
pub use download::{DownloadFileCommand, DownloadFilesCommand};
pub use upload::UploadFileCommand;
