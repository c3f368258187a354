//! Permission Checks
//!
//! Authorization decisions the file service needs before building a command. Identity
//! is already established by the request layer; this module only answers "may this
//! user do that".

use crate::metadata::repository::MetadataRepository;
use crate::metadata::types::{DirectoryId, FileId, UserId};

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait PermissionService: Send + Sync {
    /// Owner of the directory or a user it is shared with.
    async fn can_write_to_directory(&self, user_id: UserId, directory_id: DirectoryId)
    -> Result<bool>;

    /// `None` if the directory does not exist.
    async fn resolve_directory_owner(&self, directory_id: DirectoryId) -> Result<Option<UserId>>;

    /// Owner of the file or a user it is shared with.
    async fn can_read_file(&self, user_id: UserId, file_id: &FileId) -> Result<bool>;

    async fn is_directory_owner(&self, user_id: UserId, directory_id: DirectoryId)
    -> Result<bool>;

    async fn is_file_owner(&self, user_id: UserId, file_id: &FileId) -> Result<bool>;
}

/// Answers from ownership and share records kept in the metadata repository.
pub struct RepositoryPermissions {
    repository: Arc<dyn MetadataRepository>,
}

impl RepositoryPermissions {
    pub fn new(repository: Arc<dyn MetadataRepository>) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl PermissionService for RepositoryPermissions {
    async fn can_write_to_directory(
        &self,
        user_id: UserId,
        directory_id: DirectoryId,
    ) -> Result<bool> {
        match self.resolve_directory_owner(directory_id).await? {
            Some(owner) if owner == user_id => Ok(true),
            Some(_) => {
                self.repository
                    .is_directory_shared_with(user_id, directory_id)
                    .await
            }
            None => Ok(false),
        }
    }

    async fn resolve_directory_owner(&self, directory_id: DirectoryId) -> Result<Option<UserId>> {
        Ok(self
            .repository
            .find_directory(directory_id)
            .await?
            .map(|directory| directory.owner_id))
    }

    async fn can_read_file(&self, user_id: UserId, file_id: &FileId) -> Result<bool> {
        match self.repository.find_file(file_id).await? {
            Some(file) if file.owner_id == user_id => Ok(true),
            Some(_) => self.repository.is_file_shared_with(user_id, file_id).await,
            None => Ok(false),
        }
    }

    async fn is_directory_owner(&self, user_id: UserId, directory_id: DirectoryId) -> Result<bool> {
        Ok(self.resolve_directory_owner(directory_id).await? == Some(user_id))
    }

    async fn is_file_owner(&self, user_id: UserId, file_id: &FileId) -> Result<bool> {
        Ok(self
            .repository
            .find_file(file_id)
            .await?
            .is_some_and(|file| file.owner_id == user_id))
    }
}
