use super::types::UploadReceipt;
use crate::error::{CommandError, CommandResult};
use crate::executor::command::StorageCommand;
use crate::metadata::repository::MetadataRepository;
use crate::metadata::types::{DirectoryId, FileDescriptor, FileId, UserId};
use crate::nodes::selector::NodeSelection;

use async_trait::async_trait;
use std::sync::Arc;

/// Stores a new file on the selected nodes.
///
/// The descriptor is written before any transfer so an interrupted upload still leaves
/// a record. Each node is tried in selection order; one confirmation is enough for the
/// upload to succeed and partial replication is kept as is. Only nodes that confirmed
/// get a placement.
///
/// The selection travels inside the command, so its active-task increments are given
/// back once the node attempts are over, or whenever the command is dropped unexecuted.
pub struct UploadFileCommand {
    name: String,
    directory_id: DirectoryId,
    owner_id: UserId,
    content: Vec<u8>,
    selection: NodeSelection,
    repository: Arc<dyn MetadataRepository>,
}

impl UploadFileCommand {
    pub fn new(
        name: impl Into<String>,
        directory_id: DirectoryId,
        owner_id: UserId,
        content: Vec<u8>,
        selection: NodeSelection,
        repository: Arc<dyn MetadataRepository>,
    ) -> Self {
        Self {
            name: name.into(),
            directory_id,
            owner_id,
            content,
            selection,
            repository,
        }
    }
}

#[async_trait]
impl StorageCommand for UploadFileCommand {
    type Output = UploadReceipt;

    fn name(&self) -> &'static str {
        "upload_file"
    }

    async fn execute(self) -> CommandResult<UploadReceipt> {
        let Self {
            name,
            directory_id,
            owner_id,
            content,
            selection,
            repository,
        } = self;

        if selection.is_empty() {
            return Err(CommandError::NoNodesAvailable);
        }

        let file = FileDescriptor {
            id: FileId::new(),
            name,
            size_bytes: content.len() as u64,
            owner_id,
            directory_id,
        };

        repository.insert_file(&file).await.map_err(|e| {
            tracing::error!("Failed to persist metadata for '{}': {:#}", file.name, e);
            CommandError::metadata(e)
        })?;

        let key = file.node_key();
        let mut stored_on = Vec::new();
        let mut failed = Vec::new();

        for node in selection.nodes() {
            match node.handle.upload_file(&key, &content).await {
                Ok(true) => {
                    tracing::debug!("Stored {} on {}", key, node.id);
                    stored_on.push(node.id);
                }
                Ok(false) => {
                    tracing::warn!("{} refused {}", node.id, key);
                    failed.push(node.id);
                }
                Err(e) => {
                    tracing::warn!("Upload of {} to {} failed: {:#}", key, node.id, e);
                    failed.push(node.id);
                }
            }
        }

        let attempted = selection.len();
        drop(selection);

        if stored_on.is_empty() {
            tracing::error!("Upload of '{}' failed on all {} node(s)", file.name, attempted);
            return Err(CommandError::TotalFailure {
                operation: "upload",
                attempted,
            });
        }

        for node_id in &stored_on {
            repository
                .register_placement(&file.id, *node_id)
                .await
                .map_err(|e| {
                    tracing::error!(
                        "Failed to record placement of {} on {}: {:#}",
                        file.id,
                        node_id,
                        e
                    );
                    CommandError::metadata(e)
                })?;
        }

        if failed.is_empty() {
            tracing::info!(
                "Uploaded '{}' ({} bytes) to {} node(s)",
                file.name,
                file.size_bytes,
                stored_on.len()
            );
        } else {
            tracing::warn!(
                "Partial replication of '{}': {}/{} node(s) stored it",
                file.name,
                stored_on.len(),
                attempted
            );
        }

        Ok(UploadReceipt {
            file_id: file.id,
            size_bytes: file.size_bytes,
            stored_on,
            failed,
        })
    }
}
