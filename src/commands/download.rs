use super::types::DownloadedFile;
use crate::error::{CommandError, CommandResult};
use crate::executor::command::StorageCommand;
use crate::metadata::repository::MetadataRepository;
use crate::metadata::types::{FileDescriptor, FileId};
use crate::nodes::rpc::NodeRpc;
use crate::nodes::selector::NodeSelector;
use crate::nodes::types::NodeId;

use async_trait::async_trait;
use std::sync::Arc;

/// Fetches one file from its recorded placements.
///
/// Nodes are asked in placement order. With failover off only the first placement is
/// contacted. Content is addressed by the bare file id.
pub struct DownloadFileCommand {
    file_id: FileId,
    failover: bool,
    repository: Arc<dyn MetadataRepository>,
    selector: Arc<NodeSelector>,
}

impl DownloadFileCommand {
    pub fn new(
        file_id: FileId,
        failover: bool,
        repository: Arc<dyn MetadataRepository>,
        selector: Arc<NodeSelector>,
    ) -> Self {
        Self {
            file_id,
            failover,
            repository,
            selector,
        }
    }
}

#[async_trait]
impl StorageCommand for DownloadFileCommand {
    type Output = DownloadedFile;

    fn name(&self) -> &'static str {
        "download_file"
    }

    async fn execute(self) -> CommandResult<DownloadedFile> {
        let file = self
            .repository
            .find_file(&self.file_id)
            .await
            .map_err(CommandError::metadata)?
            .ok_or_else(|| CommandError::NotFound(format!("file {}", self.file_id)))?;

        let mut placements = self
            .repository
            .placements_for_file(&self.file_id)
            .await
            .map_err(CommandError::metadata)?;
        if placements.is_empty() {
            return Err(CommandError::NotFound(format!(
                "placements of file {}",
                self.file_id
            )));
        }
        if !self.failover {
            placements.truncate(1);
        }

        let mut attempted = 0;
        for node_id in placements {
            let Some(handle) = self.selector.get_stub_by_id(node_id) else {
                tracing::warn!("No handle for {} holding {}", node_id, self.file_id);
                continue;
            };
            attempted += 1;

            match handle.download_file(&self.file_id.0).await {
                Ok(Some(content)) => {
                    tracing::debug!(
                        "Fetched {} ({} bytes) from {}",
                        self.file_id,
                        content.len(),
                        node_id
                    );
                    return Ok(DownloadedFile {
                        name: file.name,
                        content,
                    });
                }
                Ok(None) => {
                    tracing::warn!("{} has no content for {}", node_id, self.file_id);
                }
                Err(e) => {
                    tracing::warn!(
                        "Download of {} from {} failed: {:#}",
                        self.file_id,
                        node_id,
                        e
                    );
                }
            }
        }

        if attempted == 0 {
            return Err(CommandError::NoNodesAvailable);
        }

        tracing::error!("Download of {} failed on {} node(s)", self.file_id, attempted);
        Err(CommandError::TotalFailure {
            operation: "download",
            attempted,
        })
    }
}

/// Fetches several files from one node in a single batched call.
///
/// Entries whose content comes back empty are replaced by a placeholder instead of
/// failing the batch. Only a failure of the batch call itself fails the command.
pub struct DownloadFilesCommand {
    node_id: NodeId,
    handle: Arc<dyn NodeRpc>,
    files: Vec<FileDescriptor>,
}

impl DownloadFilesCommand {
    pub fn new(node_id: NodeId, handle: Arc<dyn NodeRpc>, files: Vec<FileDescriptor>) -> Self {
        Self {
            node_id,
            handle,
            files,
        }
    }
}

#[async_trait]
impl StorageCommand for DownloadFilesCommand {
    type Output = Vec<DownloadedFile>;

    fn name(&self) -> &'static str {
        "download_files"
    }

    async fn execute(self) -> CommandResult<Vec<DownloadedFile>> {
        if self.files.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = self.files.iter().map(|file| file.id.0.clone()).collect();

        let contents = self.handle.download_files(&keys).await.map_err(|e| {
            tracing::error!(
                "Batch download of {} file(s) from {} failed: {:#}",
                keys.len(),
                self.node_id,
                e
            );
            CommandError::TotalFailure {
                operation: "download",
                attempted: 1,
            }
        })?;

        if contents.len() != self.files.len() {
            tracing::warn!(
                "{} returned {} entries for {} requested file(s)",
                self.node_id,
                contents.len(),
                self.files.len()
            );
        }

        let mut contents = contents.into_iter();
        let mut missing = 0;
        let downloaded: Vec<DownloadedFile> = self
            .files
            .into_iter()
            .map(|file| match contents.next().flatten() {
                Some(content) => DownloadedFile {
                    name: file.name,
                    content,
                },
                None => {
                    missing += 1;
                    DownloadedFile::placeholder()
                }
            })
            .collect();

        if missing > 0 {
            tracing::warn!(
                "{} of {} file(s) missing on {}",
                missing,
                downloaded.len(),
                self.node_id
            );
        }

        Ok(downloaded)
    }
}
