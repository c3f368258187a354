use super::permissions::PermissionService;
use super::types::*;
use crate::commands::types::UploadReceipt;
use crate::commands::*;
use crate::config::{OperationTimeouts, OrchestratorConfig};
use crate::error::CommandError;
use crate::executor::command::StorageCommand;
use crate::executor::queue::TaskQueue;
use crate::executor::types::{QueueStats, TaskOutcome};
use crate::metadata::repository::MetadataRepository;
use crate::metadata::types::{DirectoryId, FileDescriptor, FileId, UserId, path_components};
use crate::nodes::selector::NodeSelector;
use crate::nodes::types::{NodeId, NodeSnapshot};

use std::sync::Arc;
use std::time::Duration;

pub struct FileService {
    repository: Arc<dyn MetadataRepository>,
    permissions: Arc<dyn PermissionService>,
    selector: Arc<NodeSelector>,
    queue: Arc<TaskQueue>,
    timeouts: OperationTimeouts,
    download_failover: bool,
}

impl FileService {
    pub fn new(
        repository: Arc<dyn MetadataRepository>,
        permissions: Arc<dyn PermissionService>,
        selector: Arc<NodeSelector>,
        queue: Arc<TaskQueue>,
        config: &OrchestratorConfig,
    ) -> Self {
        Self {
            repository,
            permissions,
            selector,
            queue,
            timeouts: config.timeouts.clone(),
            download_failover: config.download_failover,
        }
    }

    // ============================================================
    // Directories
    // ============================================================

    pub async fn create_directory(
        &self,
        path: &str,
        owner_id: UserId,
    ) -> ServiceResult<DirectoryId> {
        if path_components(path).is_empty() {
            return Err(reject(CommandError::Validation(
                "directory path must name at least one directory".to_string(),
            )));
        }

        let command = CreateDirectoryCommand::new(path, owner_id, self.repository.clone());
        self.run(command, self.timeouts.create_directory()).await
    }

    /// Deletes a directory subtree and returns how many files were cleaned from the nodes.
    pub async fn delete_directory_by_id(
        &self,
        directory_id: DirectoryId,
        user_id: UserId,
    ) -> ServiceResult<usize> {
        let owner = self
            .permissions
            .resolve_directory_owner(directory_id)
            .await
            .map_err(|e| collaborator_failure("resolve directory owner", e))?;
        match owner {
            None => {
                return Err(reject(CommandError::NotFound(format!(
                    "directory {}",
                    directory_id
                ))));
            }
            Some(owner) if owner != user_id => {
                return Err(reject(CommandError::PermissionDenied(format!(
                    "only the owner can delete directory {}",
                    directory_id
                ))));
            }
            Some(_) => {}
        }

        let command = DeleteDirectoryCommand::new(
            directory_id,
            user_id,
            self.repository.clone(),
            self.selector.clone(),
        );
        let cleanup = self
            .run(command, self.timeouts.delete_directory())
            .await?;
        Ok(cleanup.files_cleaned)
    }

    // ============================================================
    // Uploads
    // ============================================================

    /// Stores `content` as `name` in `directory_id`.
    ///
    /// Files written into a shared directory belong to the directory's owner.
    pub async fn upload_file(
        &self,
        directory_id: DirectoryId,
        name: &str,
        content: Vec<u8>,
        user_id: UserId,
    ) -> ServiceResult<UploadReceipt> {
        validate_file_name(name).map_err(reject)?;

        let allowed = self
            .permissions
            .can_write_to_directory(user_id, directory_id)
            .await
            .map_err(|e| collaborator_failure("check directory permission", e))?;
        if !allowed {
            return Err(reject(CommandError::PermissionDenied(format!(
                "cannot write to directory {}",
                directory_id
            ))));
        }

        let owner_id = self
            .permissions
            .resolve_directory_owner(directory_id)
            .await
            .map_err(|e| collaborator_failure("resolve directory owner", e))?
            .ok_or_else(|| reject(CommandError::NotFound(format!("directory {}", directory_id))))?;

        let size_bytes = content.len() as u64;
        let selection = self.selector.select_nodes_for_upload(size_bytes).await;
        if selection.is_empty() {
            return Err(reject(CommandError::NoNodesAvailable));
        }
        tracing::debug!("Uploading '{}' to {:?}", name, selection.node_ids());

        let command = UploadFileCommand::new(
            name,
            directory_id,
            owner_id,
            content,
            selection,
            self.repository.clone(),
        );
        let receipt = self.run(command, self.timeouts.upload()).await?;

        for node_id in &receipt.stored_on {
            self.selector.record_file_upload(*node_id, size_bytes);
        }
        Ok(receipt)
    }

    // ============================================================
    // Downloads
    // ============================================================

    pub async fn download_file(
        &self,
        file_id: &FileId,
        user_id: UserId,
    ) -> ServiceResult<FileDto> {
        let allowed = self
            .permissions
            .can_read_file(user_id, file_id)
            .await
            .map_err(|e| collaborator_failure("check file permission", e))?;
        if !allowed {
            // Unknown files and foreign files look the same to the caller.
            return Err(reject(CommandError::NotFound(format!("file {}", file_id))));
        }

        let command = DownloadFileCommand::new(
            file_id.clone(),
            self.download_failover,
            self.repository.clone(),
            self.selector.clone(),
        );
        self.run(command, self.timeouts.download())
            .await
            .map(FileDto::from)
    }

    /// Downloads several files, one batched call per node.
    ///
    /// Files are grouped by their first recorded placement. The result has one entry per
    /// requested id, in request order; anything unreadable, missing or failed becomes a
    /// placeholder entry.
    pub async fn download_files(&self, file_ids: &[FileId], user_id: UserId) -> Vec<FileDto> {
        let mut groups: Vec<(NodeId, Vec<(usize, FileDescriptor)>)> = Vec::new();

        for (position, file_id) in file_ids.iter().enumerate() {
            let Some((node_id, file)) = self.locate_readable(file_id, user_id).await else {
                continue;
            };
            match groups.iter_mut().find(|(id, _)| *id == node_id) {
                Some((_, members)) => members.push((position, file)),
                None => groups.push((node_id, vec![(position, file)])),
            }
        }

        let mut pending = Vec::with_capacity(groups.len());
        for (node_id, members) in groups {
            let Some(handle) = self.selector.get_stub_by_id(node_id) else {
                tracing::warn!("No handle for {}, {} file(s) skipped", node_id, members.len());
                continue;
            };
            let (positions, files): (Vec<usize>, Vec<FileDescriptor>) =
                members.into_iter().unzip();
            let task = self
                .queue
                .enqueue(DownloadFilesCommand::new(node_id, handle, files));
            pending.push((node_id, positions, task));
        }

        let mut results: Vec<Option<FileDto>> = vec![None; file_ids.len()];
        for (node_id, positions, task) in pending {
            match task.wait(self.timeouts.download_batch()).await {
                TaskOutcome::Succeeded(files) => {
                    for (position, file) in positions.into_iter().zip(files) {
                        results[position] = Some(file.into());
                    }
                }
                TaskOutcome::Failed(e) => {
                    tracing::warn!("Batch download from {} failed: {}", node_id, e);
                }
                TaskOutcome::TimedOut => {
                    tracing::warn!("Batch download from {} timed out", node_id);
                }
            }
        }

        results
            .into_iter()
            .map(|file| file.unwrap_or_else(FileDto::placeholder))
            .collect()
    }

    /// First placement of a file the user may read; `None` for anything else.
    async fn locate_readable(
        &self,
        file_id: &FileId,
        user_id: UserId,
    ) -> Option<(NodeId, FileDescriptor)> {
        match self.permissions.can_read_file(user_id, file_id).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!("User {} may not read {}", user_id, file_id);
                return None;
            }
            Err(e) => {
                tracing::warn!("Permission check for {} failed: {:#}", file_id, e);
                return None;
            }
        }

        let file = match self.repository.find_file(file_id).await {
            Ok(Some(file)) => file,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!("Lookup of {} failed: {:#}", file_id, e);
                return None;
            }
        };

        match self.repository.placements_for_file(file_id).await {
            Ok(placements) => placements.first().map(|node_id| (*node_id, file)),
            Err(e) => {
                tracing::warn!("Placements of {} unavailable: {:#}", file_id, e);
                None
            }
        }
    }

    // ============================================================
    // Path-level file operations
    // ============================================================

    /// Removes the file's content from its nodes, then its metadata.
    pub async fn delete_file_by_path(
        &self,
        directory_path: &str,
        name: &str,
        user_id: UserId,
    ) -> OperationResponse {
        let file = match self.owned_file(directory_path, name, user_id).await {
            Ok(file) => file,
            Err(response) => return response,
        };

        let placements = match self.repository.placements_for_file(&file.id).await {
            Ok(placements) => placements,
            Err(e) => return collaborator_failure("load placements", e),
        };

        let file_id = file.id.clone();
        let command = DeleteFileCommand::new(file, placements, self.selector.clone());
        let report = match self.run(command, self.timeouts.delete_file()).await {
            Ok(report) => report,
            Err(response) => return response,
        };

        if let Err(e) = self.repository.delete_file(&file_id).await {
            return collaborator_failure("delete file metadata", e);
        }

        OperationResponse::success(format!(
            "Deleted '{}' from {} node(s)",
            name,
            report.deleted_on.len()
        ))
    }

    pub async fn rename_file_by_path(
        &self,
        directory_path: &str,
        name: &str,
        new_name: &str,
        user_id: UserId,
    ) -> OperationResponse {
        if let Err(e) = validate_file_name(new_name) {
            return reject(e);
        }
        let file = match self.owned_file(directory_path, name, user_id).await {
            Ok(file) => file,
            Err(response) => return response,
        };

        match self.repository.rename_file(&file.id, new_name).await {
            Ok(true) => {
                OperationResponse::success(format!("Renamed '{}' to '{}'", name, new_name))
            }
            Ok(false) => reject(CommandError::Validation(format!(
                "a file named '{}' already exists",
                new_name
            ))),
            Err(e) => collaborator_failure("rename file", e),
        }
    }

    pub async fn move_file_by_path(
        &self,
        directory_path: &str,
        name: &str,
        destination_path: &str,
        user_id: UserId,
    ) -> OperationResponse {
        let file = match self.owned_file(directory_path, name, user_id).await {
            Ok(file) => file,
            Err(response) => return response,
        };

        let destination = match self
            .repository
            .resolve_directory_path(user_id, destination_path)
            .await
        {
            Ok(Some(destination)) => destination,
            Ok(None) => {
                return reject(CommandError::NotFound(format!(
                    "directory '{}'",
                    destination_path
                )));
            }
            Err(e) => return collaborator_failure("resolve destination", e),
        };

        match self.repository.move_file(&file.id, destination).await {
            Ok(true) => OperationResponse::success(format!(
                "Moved '{}' to '{}'",
                name, destination_path
            )),
            Ok(false) => reject(CommandError::Validation(format!(
                "'{}' already contains a file named '{}'",
                destination_path, name
            ))),
            Err(e) => collaborator_failure("move file", e),
        }
    }

    async fn owned_file(
        &self,
        directory_path: &str,
        name: &str,
        user_id: UserId,
    ) -> ServiceResult<FileDescriptor> {
        let file = self
            .repository
            .find_file_by_path(user_id, directory_path, name)
            .await
            .map_err(|e| collaborator_failure("find file", e))?
            .ok_or_else(|| {
                reject(CommandError::NotFound(format!(
                    "'{}' in '{}'",
                    name, directory_path
                )))
            })?;

        let owner = self
            .permissions
            .is_file_owner(user_id, &file.id)
            .await
            .map_err(|e| collaborator_failure("check file owner", e))?;
        if !owner {
            return Err(reject(CommandError::PermissionDenied(format!(
                "only the owner can modify '{}'",
                name
            ))));
        }

        Ok(file)
    }

    // ============================================================
    // Path-level directory operations
    // ============================================================

    pub async fn rename_directory_by_path(
        &self,
        directory_path: &str,
        new_name: &str,
        user_id: UserId,
    ) -> OperationResponse {
        if let Err(e) = validate_file_name(new_name) {
            return reject(e);
        }
        let directory_id = match self.owned_directory(directory_path, user_id).await {
            Ok(directory_id) => directory_id,
            Err(response) => return response,
        };

        match self.repository.rename_directory(directory_id, new_name).await {
            Ok(true) => OperationResponse::success(format!(
                "Renamed '{}' to '{}'",
                directory_path, new_name
            )),
            Ok(false) => reject(CommandError::Validation(format!(
                "a directory named '{}' already exists",
                new_name
            ))),
            Err(e) => collaborator_failure("rename directory", e),
        }
    }

    /// Moves a directory, with everything below it, under `destination_path`.
    pub async fn move_directory_by_path(
        &self,
        source_path: &str,
        destination_path: &str,
        user_id: UserId,
    ) -> OperationResponse {
        let directory_id = match self.owned_directory(source_path, user_id).await {
            Ok(directory_id) => directory_id,
            Err(response) => return response,
        };
        let destination = match self.owned_directory(destination_path, user_id).await {
            Ok(destination) => destination,
            Err(response) => return response,
        };

        match self
            .repository
            .move_directory(directory_id, destination)
            .await
        {
            Ok(true) => OperationResponse::success(format!(
                "Moved '{}' to '{}'",
                source_path, destination_path
            )),
            Ok(false) => reject(CommandError::Validation(format!(
                "'{}' cannot be moved into '{}'",
                source_path, destination_path
            ))),
            Err(e) => collaborator_failure("move directory", e),
        }
    }

    /// Resolves `directory_path` in the caller's tree and checks ownership.
    async fn owned_directory(
        &self,
        directory_path: &str,
        user_id: UserId,
    ) -> ServiceResult<DirectoryId> {
        if path_components(directory_path).is_empty() {
            return Err(reject(CommandError::Validation(
                "directory path must name at least one directory".to_string(),
            )));
        }

        let directory_id = self
            .repository
            .resolve_directory_path(user_id, directory_path)
            .await
            .map_err(|e| collaborator_failure("resolve directory", e))?
            .ok_or_else(|| {
                reject(CommandError::NotFound(format!(
                    "directory '{}'",
                    directory_path
                )))
            })?;

        let owner = self
            .permissions
            .is_directory_owner(user_id, directory_id)
            .await
            .map_err(|e| collaborator_failure("check directory owner", e))?;
        if !owner {
            return Err(reject(CommandError::PermissionDenied(format!(
                "only the owner can modify '{}'",
                directory_path
            ))));
        }

        Ok(directory_id)
    }

    // ============================================================
    // Sharing
    // ============================================================

    /// Lets `share_with` download one of the owner's files.
    pub async fn share_file_with_user(
        &self,
        directory_path: &str,
        name: &str,
        owner_id: UserId,
        share_with: UserId,
    ) -> OperationResponse {
        if share_with == owner_id {
            return reject(CommandError::Validation(
                "a file cannot be shared with its owner".to_string(),
            ));
        }
        let file = match self.owned_file(directory_path, name, owner_id).await {
            Ok(file) => file,
            Err(response) => return response,
        };

        match self.repository.share_file(&file.id, share_with).await {
            Ok(()) => {
                tracing::info!("Shared {} with user {}", file.id, share_with);
                OperationResponse::success(format!("Shared '{}' with user {}", name, share_with))
            }
            Err(e) => collaborator_failure("share file", e),
        }
    }

    /// Lets `share_with` upload into one of the owner's directories.
    pub async fn share_directory_with_user(
        &self,
        directory_path: &str,
        owner_id: UserId,
        share_with: UserId,
    ) -> OperationResponse {
        if share_with == owner_id {
            return reject(CommandError::Validation(
                "a directory cannot be shared with its owner".to_string(),
            ));
        }
        let directory_id = match self.owned_directory(directory_path, owner_id).await {
            Ok(directory_id) => directory_id,
            Err(response) => return response,
        };

        match self
            .repository
            .share_directory(directory_id, share_with)
            .await
        {
            Ok(()) => {
                tracing::info!("Shared {} with user {}", directory_id, share_with);
                OperationResponse::success(format!(
                    "Shared '{}' with user {}",
                    directory_path, share_with
                ))
            }
            Err(e) => collaborator_failure("share directory", e),
        }
    }

    // ============================================================
    // Lifecycle and introspection
    // ============================================================

    pub fn node_stats(&self) -> Vec<NodeSnapshot> {
        self.selector.node_stats()
    }

    pub fn queue_stats(&self) -> QueueStats {
        self.queue.stats()
    }

    /// Stops accepting work; see `TaskQueue::shutdown`.
    pub async fn shutdown(&self, grace: Option<Duration>) -> bool {
        self.queue.shutdown(grace).await
    }

    async fn run<C: StorageCommand>(
        &self,
        command: C,
        budget: Duration,
    ) -> ServiceResult<C::Output> {
        let operation = command.name();
        match self.queue.enqueue(command).wait(budget).await {
            TaskOutcome::Succeeded(output) => Ok(output),
            TaskOutcome::Failed(e) => {
                tracing::warn!("{} failed: {}", operation, e);
                Err(OperationResponse::from_error(&e))
            }
            TaskOutcome::TimedOut => Err(OperationResponse::timeout(operation)),
        }
    }
}

fn validate_file_name(name: &str) -> Result<(), CommandError> {
    if name.trim().is_empty() {
        return Err(CommandError::Validation("file name must not be empty".to_string()));
    }
    if name.contains('/') {
        return Err(CommandError::Validation(format!(
            "file name '{}' must not contain '/'",
            name
        )));
    }
    Ok(())
}

fn reject(error: CommandError) -> OperationResponse {
    tracing::debug!("Rejected request: {}", error);
    OperationResponse::from_error(&error)
}

fn collaborator_failure(context: &str, error: anyhow::Error) -> OperationResponse {
    tracing::error!("Failed to {}: {:#}", context, error);
    OperationResponse::from_error(&CommandError::metadata(error))
}
