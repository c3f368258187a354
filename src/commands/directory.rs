use crate::error::{CommandError, CommandResult};
use crate::executor::command::StorageCommand;
use crate::metadata::repository::MetadataRepository;
use crate::metadata::types::{DirectoryId, UserId};

use async_trait::async_trait;
use std::sync::Arc;

/// Creates every missing directory along a path. Metadata only.
pub struct CreateDirectoryCommand {
    path: String,
    owner_id: UserId,
    repository: Arc<dyn MetadataRepository>,
}

impl CreateDirectoryCommand {
    pub fn new(
        path: impl Into<String>,
        owner_id: UserId,
        repository: Arc<dyn MetadataRepository>,
    ) -> Self {
        Self {
            path: path.into(),
            owner_id,
            repository,
        }
    }
}

#[async_trait]
impl StorageCommand for CreateDirectoryCommand {
    type Output = DirectoryId;

    fn name(&self) -> &'static str {
        "create_directory"
    }

    async fn execute(self) -> CommandResult<DirectoryId> {
        let id = self
            .repository
            .create_directory_hierarchy(&self.path, self.owner_id)
            .await
            .map_err(|e| {
                tracing::error!("Failed to create directory '{}': {:#}", self.path, e);
                CommandError::metadata(e)
            })?;

        tracing::info!(
            "Directory '{}' ready for user {} ({})",
            self.path,
            self.owner_id,
            id
        );
        Ok(id)
    }
}
