use super::types::*;
use crate::nodes::types::NodeId;

use anyhow::Result;
use async_trait::async_trait;

/// Persistence contract consumed by the node selector, the commands and the
/// permission checks.
///
/// Every method may fail with a transport or storage error; callers treat such
/// failures as `MetadataError`.
#[async_trait]
pub trait MetadataRepository: Send + Sync {
    // --- Nodes ---

    /// Registers a node endpoint, returning the existing id if it is already known.
    async fn upsert_node(&self, endpoint: &str, capacity_bytes: u64) -> Result<NodeId>;

    /// Capacity, bytes used and file count for one node.
    async fn node_usage(&self, node_id: NodeId) -> Result<NodeUsage>;

    // --- Directories ---

    /// Creates every missing directory along `path` for `owner_id` and returns the
    /// id of the last component.
    async fn create_directory_hierarchy(&self, path: &str, owner_id: UserId)
    -> Result<DirectoryId>;

    async fn find_directory(&self, directory_id: DirectoryId) -> Result<Option<DirectoryRecord>>;

    /// Resolves a slash separated path inside the tree owned by `owner_id`.
    async fn resolve_directory_path(
        &self,
        owner_id: UserId,
        path: &str,
    ) -> Result<Option<DirectoryId>>;

    async fn is_directory_shared_with(
        &self,
        user_id: UserId,
        directory_id: DirectoryId,
    ) -> Result<bool>;

    /// Every file under `directory_id`, descending into subdirectories.
    async fn files_in_directory_recursive(
        &self,
        directory_id: DirectoryId,
    ) -> Result<Vec<FileDescriptor>>;

    /// Removes the directory subtree with its files and placements, returning the
    /// files that were removed.
    async fn delete_directory(
        &self,
        directory_id: DirectoryId,
        user_id: UserId,
    ) -> Result<Vec<FileDescriptor>>;

    /// Returns `false` if the directory is missing or a sibling already has `new_name`.
    async fn rename_directory(&self, directory_id: DirectoryId, new_name: &str) -> Result<bool>;

    /// Re-parents a directory under `destination`. Returns `false` if the directory is
    /// missing, `destination` lies inside its subtree, or the name is taken there.
    async fn move_directory(
        &self,
        directory_id: DirectoryId,
        destination: DirectoryId,
    ) -> Result<bool>;

    /// Grants `user_id` write access to a directory it does not own.
    async fn share_directory(&self, directory_id: DirectoryId, user_id: UserId) -> Result<()>;

    // --- Files ---

    async fn insert_file(&self, file: &FileDescriptor) -> Result<()>;

    async fn find_file(&self, file_id: &FileId) -> Result<Option<FileDescriptor>>;

    async fn find_file_by_path(
        &self,
        owner_id: UserId,
        directory_path: &str,
        name: &str,
    ) -> Result<Option<FileDescriptor>>;

    async fn is_file_shared_with(&self, user_id: UserId, file_id: &FileId) -> Result<bool>;

    /// Grants `user_id` read access to a single file.
    async fn share_file(&self, file_id: &FileId, user_id: UserId) -> Result<()>;

    /// Removes the descriptor and its placements. Returns `false` if it did not exist.
    async fn delete_file(&self, file_id: &FileId) -> Result<bool>;

    /// Returns `false` if the file is missing or the name is taken in its directory.
    async fn rename_file(&self, file_id: &FileId, new_name: &str) -> Result<bool>;

    /// Returns `false` if the file is missing or the name is taken in the destination.
    async fn move_file(&self, file_id: &FileId, destination: DirectoryId) -> Result<bool>;

    // --- Placements ---

    async fn register_placement(&self, file_id: &FileId, node_id: NodeId) -> Result<()>;

    /// Nodes holding a replica, in the order the placements were recorded.
    async fn placements_for_file(&self, file_id: &FileId) -> Result<Vec<NodeId>>;
}
