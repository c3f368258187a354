use super::types::{DeleteReport, DirectoryCleanup};
use crate::error::{CommandError, CommandResult};
use crate::executor::command::StorageCommand;
use crate::metadata::repository::MetadataRepository;
use crate::metadata::types::{DirectoryId, FileDescriptor, UserId};
use crate::nodes::selector::NodeSelector;
use crate::nodes::types::NodeId;

use async_trait::async_trait;
use std::sync::Arc;

/// Outcome of asking one node to drop one file.
enum NodeDeletion {
    Confirmed,
    Refused,
    Failed,
}

/// Deletes `file` from `node_id` and books the freed space when the node confirms.
async fn delete_on_node(
    selector: &NodeSelector,
    file: &FileDescriptor,
    node_id: NodeId,
) -> NodeDeletion {
    let Some(handle) = selector.get_stub_by_id(node_id) else {
        tracing::warn!("No handle for {} holding {}", node_id, file.id);
        return NodeDeletion::Failed;
    };

    let key = file.node_key();
    match handle.delete_file(&key).await {
        Ok(true) => {
            selector.record_file_deletion(node_id, file.size_bytes);
            tracing::debug!("Deleted {} from {}", key, node_id);
            NodeDeletion::Confirmed
        }
        Ok(false) => {
            tracing::warn!("{} refused to delete {}", node_id, key);
            NodeDeletion::Refused
        }
        Err(e) => {
            tracing::warn!("Delete of {} on {} failed: {:#}", key, node_id, e);
            NodeDeletion::Failed
        }
    }
}

/// Removes one file's content from every node holding it.
///
/// Succeeds when at least one node confirms, or trivially when the file has no
/// placement. Metadata is left to the caller.
pub struct DeleteFileCommand {
    file: FileDescriptor,
    placements: Vec<NodeId>,
    selector: Arc<NodeSelector>,
}

impl DeleteFileCommand {
    pub fn new(file: FileDescriptor, placements: Vec<NodeId>, selector: Arc<NodeSelector>) -> Self {
        Self {
            file,
            placements,
            selector,
        }
    }
}

#[async_trait]
impl StorageCommand for DeleteFileCommand {
    type Output = DeleteReport;

    fn name(&self) -> &'static str {
        "delete_file"
    }

    async fn execute(self) -> CommandResult<DeleteReport> {
        let mut report = DeleteReport::default();

        for &node_id in &self.placements {
            match delete_on_node(&self.selector, &self.file, node_id).await {
                NodeDeletion::Confirmed => report.deleted_on.push(node_id),
                NodeDeletion::Refused | NodeDeletion::Failed => report.failed.push(node_id),
            }
        }

        if !self.placements.is_empty() && report.deleted_on.is_empty() {
            tracing::error!(
                "Delete of {} failed on all {} node(s)",
                self.file.id,
                self.placements.len()
            );
            return Err(CommandError::TotalFailure {
                operation: "delete",
                attempted: self.placements.len(),
            });
        }

        tracing::info!(
            "Deleted '{}' from {}/{} node(s)",
            self.file.name,
            report.deleted_on.len(),
            self.placements.len()
        );
        Ok(report)
    }
}

/// Removes a directory subtree: node content first, metadata last.
///
/// The file list is captured before anything is removed so placement information
/// survives until every node has been asked.
pub struct DeleteDirectoryCommand {
    directory_id: DirectoryId,
    user_id: UserId,
    repository: Arc<dyn MetadataRepository>,
    selector: Arc<NodeSelector>,
}

impl DeleteDirectoryCommand {
    pub fn new(
        directory_id: DirectoryId,
        user_id: UserId,
        repository: Arc<dyn MetadataRepository>,
        selector: Arc<NodeSelector>,
    ) -> Self {
        Self {
            directory_id,
            user_id,
            repository,
            selector,
        }
    }
}

#[async_trait]
impl StorageCommand for DeleteDirectoryCommand {
    type Output = DirectoryCleanup;

    fn name(&self) -> &'static str {
        "delete_directory"
    }

    async fn execute(self) -> CommandResult<DirectoryCleanup> {
        let files = self
            .repository
            .files_in_directory_recursive(self.directory_id)
            .await
            .map_err(|e| {
                tracing::error!(
                    "Cannot enumerate directory {}: {:#}",
                    self.directory_id,
                    e
                );
                CommandError::metadata(e)
            })?;

        let mut cleanup = DirectoryCleanup {
            files_found: files.len(),
            ..DirectoryCleanup::default()
        };

        for file in &files {
            let placements = match self.repository.placements_for_file(&file.id).await {
                Ok(placements) => placements,
                Err(e) => {
                    tracing::warn!("Skipping {}: placements unavailable: {:#}", file.id, e);
                    continue;
                }
            };

            if placements.is_empty() {
                cleanup.files_cleaned += 1;
                continue;
            }

            let mut confirmed = false;
            for node_id in placements {
                match delete_on_node(&self.selector, file, node_id).await {
                    NodeDeletion::Confirmed => {
                        confirmed = true;
                        cleanup.node_deletions += 1;
                    }
                    NodeDeletion::Refused | NodeDeletion::Failed => cleanup.node_failures += 1,
                }
            }
            if confirmed {
                cleanup.files_cleaned += 1;
            }
        }

        match self
            .repository
            .delete_directory(self.directory_id, self.user_id)
            .await
        {
            Ok(_) => cleanup.metadata_removed = true,
            Err(e) => {
                tracing::warn!(
                    "Node cleanup of directory {} done but metadata removal failed: {:#}",
                    self.directory_id,
                    e
                );
            }
        }

        tracing::info!(
            "Directory {}: {}/{} file(s) cleaned, {} node deletion(s), {} failure(s)",
            self.directory_id,
            cleanup.files_cleaned,
            cleanup.files_found,
            cleanup.node_deletions,
            cleanup.node_failures
        );
        Ok(cleanup)
    }
}
