//! In-Memory Metadata Repository
//!
//! Concurrent-map implementation of `MetadataRepository`. Each table is a `DashMap`;
//! directory creation and deletion additionally serialize on a small lock so that two
//! concurrent `mkdir -p` calls cannot create the same component twice.

use super::repository::MetadataRepository;
use super::types::*;
use crate::nodes::types::NodeId;

use anyhow::Result;
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

pub struct InMemoryMetadata {
    directories: DashMap<DirectoryId, DirectoryRecord>,
    files: DashMap<FileId, FileDescriptor>,
    /// File -> nodes holding a replica, in recording order.
    placements: DashMap<FileId, Vec<NodeId>>,
    /// Endpoint -> node id.
    nodes: DashMap<String, NodeId>,
    capacities: DashMap<NodeId, u64>,
    directory_shares: DashSet<(DirectoryId, UserId)>,
    file_shares: DashSet<(FileId, UserId)>,
    next_directory_id: AtomicU64,
    next_node_id: AtomicU64,
    tree_lock: Mutex<()>,
}

impl InMemoryMetadata {
    pub fn new() -> Self {
        Self {
            directories: DashMap::new(),
            files: DashMap::new(),
            placements: DashMap::new(),
            nodes: DashMap::new(),
            capacities: DashMap::new(),
            directory_shares: DashSet::new(),
            file_shares: DashSet::new(),
            next_directory_id: AtomicU64::new(1),
            next_node_id: AtomicU64::new(1),
            tree_lock: Mutex::new(()),
        }
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn directory_count(&self) -> usize {
        self.directories.len()
    }

    fn find_child(
        &self,
        parent_id: Option<DirectoryId>,
        name: &str,
        owner_id: UserId,
    ) -> Option<DirectoryId> {
        self.directories
            .iter()
            .find(|entry| {
                let dir = entry.value();
                dir.parent_id == parent_id && dir.owner_id == owner_id && dir.name == name
            })
            .map(|entry| *entry.key())
    }

    fn sibling_named(
        &self,
        parent_id: Option<DirectoryId>,
        name: &str,
        owner_id: UserId,
        except: DirectoryId,
    ) -> bool {
        self.find_child(parent_id, name, owner_id)
            .is_some_and(|existing| existing != except)
    }

    fn resolve_path(&self, owner_id: UserId, path: &str) -> Option<DirectoryId> {
        let mut current = None;
        for component in path_components(path) {
            current = Some(self.find_child(current, component, owner_id)?);
        }
        current
    }

    /// The directory itself plus every descendant.
    fn subtree(&self, root: DirectoryId) -> HashSet<DirectoryId> {
        let mut collected = HashSet::from([root]);
        let mut frontier = vec![root];

        while let Some(parent) = frontier.pop() {
            let children: Vec<DirectoryId> = self
                .directories
                .iter()
                .filter(|entry| entry.value().parent_id == Some(parent))
                .map(|entry| *entry.key())
                .collect();

            for child in children {
                if collected.insert(child) {
                    frontier.push(child);
                }
            }
        }

        collected
    }

    fn name_taken(&self, directory_id: DirectoryId, name: &str, except: &FileId) -> bool {
        self.files.iter().any(|entry| {
            let file = entry.value();
            file.directory_id == directory_id && file.name == name && &file.id != except
        })
    }

    fn remove_file_entries(&self, file_id: &FileId) -> Option<FileDescriptor> {
        self.placements.remove(file_id);
        self.file_shares.retain(|(shared, _)| shared != file_id);
        self.files.remove(file_id).map(|(_, file)| file)
    }
}

impl Default for InMemoryMetadata {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetadataRepository for InMemoryMetadata {
    async fn upsert_node(&self, endpoint: &str, capacity_bytes: u64) -> Result<NodeId> {
        let node_id = *self
            .nodes
            .entry(endpoint.to_string())
            .or_insert_with(|| NodeId(self.next_node_id.fetch_add(1, Ordering::SeqCst)));

        self.capacities.insert(node_id, capacity_bytes);
        tracing::debug!("Registered node {} at {}", node_id, endpoint);
        Ok(node_id)
    }

    async fn node_usage(&self, node_id: NodeId) -> Result<NodeUsage> {
        let capacity_bytes = self
            .capacities
            .get(&node_id)
            .map(|entry| *entry.value())
            .ok_or_else(|| anyhow::anyhow!("Unknown node: {}", node_id))?;

        let mut usage = NodeUsage {
            capacity_bytes,
            ..NodeUsage::default()
        };

        for entry in self.placements.iter() {
            if !entry.value().contains(&node_id) {
                continue;
            }
            if let Some(file) = self.files.get(entry.key()) {
                usage.space_used_bytes += file.size_bytes;
                usage.file_count += 1;
            }
        }

        Ok(usage)
    }

    async fn create_directory_hierarchy(
        &self,
        path: &str,
        owner_id: UserId,
    ) -> Result<DirectoryId> {
        let components = path_components(path);
        if components.is_empty() {
            anyhow::bail!("Directory path '{}' has no components", path);
        }

        let _guard = self.tree_lock.lock();
        let mut parent_id = None;

        for component in components {
            let id = match self.find_child(parent_id, component, owner_id) {
                Some(existing) => existing,
                None => {
                    let id = DirectoryId(self.next_directory_id.fetch_add(1, Ordering::SeqCst));
                    self.directories.insert(
                        id,
                        DirectoryRecord {
                            id,
                            name: component.to_string(),
                            owner_id,
                            parent_id,
                        },
                    );
                    tracing::debug!("Created directory {} ({})", component, id);
                    id
                }
            };
            parent_id = Some(id);
        }

        parent_id.ok_or_else(|| anyhow::anyhow!("Directory path '{}' resolved to nothing", path))
    }

    async fn find_directory(&self, directory_id: DirectoryId) -> Result<Option<DirectoryRecord>> {
        Ok(self
            .directories
            .get(&directory_id)
            .map(|entry| entry.value().clone()))
    }

    async fn resolve_directory_path(
        &self,
        owner_id: UserId,
        path: &str,
    ) -> Result<Option<DirectoryId>> {
        Ok(self.resolve_path(owner_id, path))
    }

    async fn is_directory_shared_with(
        &self,
        user_id: UserId,
        directory_id: DirectoryId,
    ) -> Result<bool> {
        Ok(self.directory_shares.contains(&(directory_id, user_id)))
    }

    async fn files_in_directory_recursive(
        &self,
        directory_id: DirectoryId,
    ) -> Result<Vec<FileDescriptor>> {
        if !self.directories.contains_key(&directory_id) {
            anyhow::bail!("Directory {} not found", directory_id);
        }

        let subtree = self.subtree(directory_id);
        let mut files: Vec<FileDescriptor> = self
            .files
            .iter()
            .filter(|entry| subtree.contains(&entry.value().directory_id))
            .map(|entry| entry.value().clone())
            .collect();
        files.sort_by(|a, b| a.id.cmp(&b.id));

        Ok(files)
    }

    async fn delete_directory(
        &self,
        directory_id: DirectoryId,
        user_id: UserId,
    ) -> Result<Vec<FileDescriptor>> {
        let _guard = self.tree_lock.lock();

        let owner_id = self
            .directories
            .get(&directory_id)
            .map(|entry| entry.value().owner_id)
            .ok_or_else(|| anyhow::anyhow!("Directory {} not found", directory_id))?;
        if owner_id != user_id {
            anyhow::bail!("User {} does not own directory {}", user_id, directory_id);
        }

        let subtree = self.subtree(directory_id);
        let doomed: Vec<FileId> = self
            .files
            .iter()
            .filter(|entry| subtree.contains(&entry.value().directory_id))
            .map(|entry| entry.key().clone())
            .collect();

        let removed: Vec<FileDescriptor> = doomed
            .iter()
            .filter_map(|file_id| self.remove_file_entries(file_id))
            .collect();

        for dir in &subtree {
            self.directories.remove(dir);
        }
        self.directory_shares
            .retain(|(shared, _)| !subtree.contains(shared));

        tracing::debug!(
            "Deleted directory {} ({} directories, {} files)",
            directory_id,
            subtree.len(),
            removed.len()
        );

        Ok(removed)
    }

    async fn rename_directory(&self, directory_id: DirectoryId, new_name: &str) -> Result<bool> {
        let _guard = self.tree_lock.lock();

        let Some(current) = self
            .directories
            .get(&directory_id)
            .map(|entry| entry.value().clone())
        else {
            return Ok(false);
        };
        if self.sibling_named(current.parent_id, new_name, current.owner_id, directory_id) {
            return Ok(false);
        }

        Ok(match self.directories.get_mut(&directory_id) {
            Some(mut directory) => {
                directory.name = new_name.to_string();
                true
            }
            None => false,
        })
    }

    async fn move_directory(
        &self,
        directory_id: DirectoryId,
        destination: DirectoryId,
    ) -> Result<bool> {
        let _guard = self.tree_lock.lock();

        if !self.directories.contains_key(&destination) {
            anyhow::bail!("Directory {} not found", destination);
        }
        let Some(current) = self
            .directories
            .get(&directory_id)
            .map(|entry| entry.value().clone())
        else {
            return Ok(false);
        };
        if self.subtree(directory_id).contains(&destination) {
            return Ok(false);
        }
        if self.sibling_named(Some(destination), &current.name, current.owner_id, directory_id) {
            return Ok(false);
        }

        Ok(match self.directories.get_mut(&directory_id) {
            Some(mut directory) => {
                directory.parent_id = Some(destination);
                true
            }
            None => false,
        })
    }

    async fn share_directory(&self, directory_id: DirectoryId, user_id: UserId) -> Result<()> {
        if !self.directories.contains_key(&directory_id) {
            anyhow::bail!("Directory {} not found", directory_id);
        }
        self.directory_shares.insert((directory_id, user_id));
        Ok(())
    }

    async fn insert_file(&self, file: &FileDescriptor) -> Result<()> {
        if !self.directories.contains_key(&file.directory_id) {
            anyhow::bail!("Directory {} not found", file.directory_id);
        }
        if self.name_taken(file.directory_id, &file.name, &file.id) {
            anyhow::bail!(
                "A file named '{}' already exists in directory {}",
                file.name,
                file.directory_id
            );
        }

        self.files.insert(file.id.clone(), file.clone());
        Ok(())
    }

    async fn find_file(&self, file_id: &FileId) -> Result<Option<FileDescriptor>> {
        Ok(self.files.get(file_id).map(|entry| entry.value().clone()))
    }

    async fn find_file_by_path(
        &self,
        owner_id: UserId,
        directory_path: &str,
        name: &str,
    ) -> Result<Option<FileDescriptor>> {
        let Some(directory_id) = self.resolve_path(owner_id, directory_path) else {
            return Ok(None);
        };

        Ok(self
            .files
            .iter()
            .find(|entry| entry.value().directory_id == directory_id && entry.value().name == name)
            .map(|entry| entry.value().clone()))
    }

    async fn is_file_shared_with(&self, user_id: UserId, file_id: &FileId) -> Result<bool> {
        Ok(self.file_shares.contains(&(file_id.clone(), user_id)))
    }

    async fn share_file(&self, file_id: &FileId, user_id: UserId) -> Result<()> {
        if !self.files.contains_key(file_id) {
            anyhow::bail!("File {} not found", file_id);
        }
        self.file_shares.insert((file_id.clone(), user_id));
        Ok(())
    }

    async fn delete_file(&self, file_id: &FileId) -> Result<bool> {
        Ok(self.remove_file_entries(file_id).is_some())
    }

    async fn rename_file(&self, file_id: &FileId, new_name: &str) -> Result<bool> {
        let Some(directory_id) = self.files.get(file_id).map(|entry| entry.directory_id) else {
            return Ok(false);
        };
        if self.name_taken(directory_id, new_name, file_id) {
            return Ok(false);
        }

        Ok(match self.files.get_mut(file_id) {
            Some(mut file) => {
                file.name = new_name.to_string();
                true
            }
            None => false,
        })
    }

    async fn move_file(&self, file_id: &FileId, destination: DirectoryId) -> Result<bool> {
        if !self.directories.contains_key(&destination) {
            anyhow::bail!("Directory {} not found", destination);
        }
        let Some(name) = self.files.get(file_id).map(|entry| entry.name.clone()) else {
            return Ok(false);
        };
        if self.name_taken(destination, &name, file_id) {
            return Ok(false);
        }

        Ok(match self.files.get_mut(file_id) {
            Some(mut file) => {
                file.directory_id = destination;
                true
            }
            None => false,
        })
    }

    async fn register_placement(&self, file_id: &FileId, node_id: NodeId) -> Result<()> {
        if !self.files.contains_key(file_id) {
            anyhow::bail!("File {} not found", file_id);
        }

        let mut nodes = self.placements.entry(file_id.clone()).or_default();
        if !nodes.contains(&node_id) {
            nodes.push(node_id);
        }
        Ok(())
    }

    async fn placements_for_file(&self, file_id: &FileId) -> Result<Vec<NodeId>> {
        Ok(self
            .placements
            .get(file_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default())
    }
}
