use crate::metadata::types::FileId;
use crate::nodes::types::NodeId;

use serde::{Deserialize, Serialize};

/// Name given to batch entries whose content could not be fetched.
pub const DOWNLOAD_ERROR_PLACEHOLDER: &str = "ERROR";

/// Result of an upload that reached at least one node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UploadReceipt {
    pub file_id: FileId,
    pub size_bytes: u64,
    /// Nodes that confirmed the store, primary first.
    pub stored_on: Vec<NodeId>,
    /// Selected nodes that refused or failed.
    pub failed: Vec<NodeId>,
}

impl UploadReceipt {
    pub fn is_partial(&self) -> bool {
        !self.failed.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DownloadedFile {
    pub name: String,
    pub content: Vec<u8>,
}

impl DownloadedFile {
    pub fn placeholder() -> Self {
        Self {
            name: DOWNLOAD_ERROR_PLACEHOLDER.to_string(),
            content: Vec::new(),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.name == DOWNLOAD_ERROR_PLACEHOLDER && self.content.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DeleteReport {
    pub deleted_on: Vec<NodeId>,
    pub failed: Vec<NodeId>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DirectoryCleanup {
    /// Files found under the directory before anything was removed.
    pub files_found: usize,
    /// Files deleted from at least one node, or that had no placement at all.
    pub files_cleaned: usize,
    pub node_deletions: usize,
    pub node_failures: usize,
    /// Whether the final metadata removal went through.
    pub metadata_removed: bool,
}
