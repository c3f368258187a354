//! Test doubles shared by the unit test modules.

use crate::config::SelectorSettings;
use crate::metadata::memory::InMemoryMetadata;
use crate::metadata::repository::MetadataRepository;
use crate::metadata::types::*;
use crate::nodes::directory::NodeDirectory;
use crate::nodes::rpc::NodeRpc;
use crate::nodes::selector::NodeSelector;
use crate::nodes::types::NodeId;

use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// How a scripted node answers one kind of call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Behavior {
    Accept,
    /// `false` for stores and deletes, no content for downloads.
    Reject,
    Error,
    Panic,
    /// Sleeps, then accepts.
    Delay(Duration),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeCall {
    Upload(String),
    Download(String),
    DownloadBatch(Vec<String>),
    Delete(String),
}

/// Programmable `NodeRpc` that keeps blobs in memory and records every call.
pub struct ScriptedNode {
    upload: Mutex<Behavior>,
    download: Mutex<Behavior>,
    delete: Mutex<Behavior>,
    blobs: DashMap<String, Vec<u8>>,
    calls: Mutex<Vec<NodeCall>>,
}

impl ScriptedNode {
    pub fn accepting() -> Arc<Self> {
        Self::with(Behavior::Accept, Behavior::Accept, Behavior::Accept)
    }

    pub fn with(upload: Behavior, download: Behavior, delete: Behavior) -> Arc<Self> {
        Arc::new(Self {
            upload: Mutex::new(upload),
            download: Mutex::new(download),
            delete: Mutex::new(delete),
            blobs: DashMap::new(),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn set_upload(&self, behavior: Behavior) {
        *self.upload.lock() = behavior;
    }

    pub fn set_download(&self, behavior: Behavior) {
        *self.download.lock() = behavior;
    }

    pub fn set_delete(&self, behavior: Behavior) {
        *self.delete.lock() = behavior;
    }

    pub fn calls(&self) -> Vec<NodeCall> {
        self.calls.lock().clone()
    }

    pub fn upload_calls(&self) -> usize {
        self.count(|call| matches!(call, NodeCall::Upload(_)))
    }

    pub fn download_calls(&self) -> usize {
        self.count(|call| matches!(call, NodeCall::Download(_) | NodeCall::DownloadBatch(_)))
    }

    pub fn delete_calls(&self) -> usize {
        self.count(|call| matches!(call, NodeCall::Delete(_)))
    }

    pub fn stored_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.blobs.iter().map(|entry| entry.key().clone()).collect();
        keys.sort();
        keys
    }

    pub fn holds(&self, key: &str) -> bool {
        self.blobs.contains_key(key)
    }

    pub fn evict(&self, key: &str) {
        self.blobs.remove(key);
    }

    fn count(&self, predicate: impl Fn(&NodeCall) -> bool) -> usize {
        self.calls.lock().iter().filter(|call| predicate(call)).count()
    }

    fn record(&self, call: NodeCall) {
        self.calls.lock().push(call);
    }

    /// Applies the behaviour; `Ok(true)` means "go ahead".
    async fn perform(behavior: Behavior) -> Result<bool> {
        match behavior {
            Behavior::Accept => Ok(true),
            Behavior::Reject => Ok(false),
            Behavior::Error => anyhow::bail!("scripted node failure"),
            Behavior::Panic => panic!("scripted node panic"),
            Behavior::Delay(delay) => {
                tokio::time::sleep(delay).await;
                Ok(true)
            }
        }
    }

    /// Exact key first, then an owner-qualified key ending in `-{key}`.
    fn lookup(&self, key: &str) -> Option<Vec<u8>> {
        if let Some(content) = self.blobs.get(key) {
            return Some(content.clone());
        }
        let suffix = format!("-{}", key);
        self.blobs
            .iter()
            .find(|entry| entry.key().ends_with(&suffix))
            .map(|entry| entry.value().clone())
    }
}

#[async_trait]
impl NodeRpc for ScriptedNode {
    async fn upload_file(&self, file_key: &str, content: &[u8]) -> Result<bool> {
        self.record(NodeCall::Upload(file_key.to_string()));
        let behavior = *self.upload.lock();
        if !Self::perform(behavior).await? {
            return Ok(false);
        }
        self.blobs.insert(file_key.to_string(), content.to_vec());
        Ok(true)
    }

    async fn download_file(&self, file_key: &str) -> Result<Option<Vec<u8>>> {
        self.record(NodeCall::Download(file_key.to_string()));
        let behavior = *self.download.lock();
        if !Self::perform(behavior).await? {
            return Ok(None);
        }
        Ok(self.lookup(file_key))
    }

    async fn download_files(&self, file_keys: &[String]) -> Result<Vec<Option<Vec<u8>>>> {
        self.record(NodeCall::DownloadBatch(file_keys.to_vec()));
        let behavior = *self.download.lock();
        if !Self::perform(behavior).await? {
            return Ok(vec![None; file_keys.len()]);
        }
        Ok(file_keys.iter().map(|key| self.lookup(key)).collect())
    }

    async fn delete_file(&self, file_key: &str) -> Result<bool> {
        self.record(NodeCall::Delete(file_key.to_string()));
        let behavior = *self.delete.lock();
        if !Self::perform(behavior).await? {
            return Ok(false);
        }
        Ok(self.blobs.remove(file_key).is_some())
    }
}

/// `InMemoryMetadata` with switchable failures on selected calls.
#[derive(Default)]
pub struct FailingMetadata {
    pub inner: InMemoryMetadata,
    pub fail_node_usage: AtomicBool,
    pub fail_insert_file: AtomicBool,
    pub fail_listing: AtomicBool,
    pub fail_placements: AtomicBool,
    pub fail_delete_directory: AtomicBool,
}

impl FailingMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    fn check(flag: &AtomicBool, operation: &str) -> Result<()> {
        if flag.load(Ordering::SeqCst) {
            anyhow::bail!("injected failure in {}", operation);
        }
        Ok(())
    }
}

#[async_trait]
impl MetadataRepository for FailingMetadata {
    async fn upsert_node(&self, endpoint: &str, capacity_bytes: u64) -> Result<NodeId> {
        self.inner.upsert_node(endpoint, capacity_bytes).await
    }

    async fn node_usage(&self, node_id: NodeId) -> Result<NodeUsage> {
        Self::check(&self.fail_node_usage, "node_usage")?;
        self.inner.node_usage(node_id).await
    }

    async fn create_directory_hierarchy(
        &self,
        path: &str,
        owner_id: UserId,
    ) -> Result<DirectoryId> {
        self.inner.create_directory_hierarchy(path, owner_id).await
    }

    async fn find_directory(&self, directory_id: DirectoryId) -> Result<Option<DirectoryRecord>> {
        self.inner.find_directory(directory_id).await
    }

    async fn resolve_directory_path(
        &self,
        owner_id: UserId,
        path: &str,
    ) -> Result<Option<DirectoryId>> {
        self.inner.resolve_directory_path(owner_id, path).await
    }

    async fn is_directory_shared_with(
        &self,
        user_id: UserId,
        directory_id: DirectoryId,
    ) -> Result<bool> {
        self.inner.is_directory_shared_with(user_id, directory_id).await
    }

    async fn files_in_directory_recursive(
        &self,
        directory_id: DirectoryId,
    ) -> Result<Vec<FileDescriptor>> {
        Self::check(&self.fail_listing, "files_in_directory_recursive")?;
        self.inner.files_in_directory_recursive(directory_id).await
    }

    async fn delete_directory(
        &self,
        directory_id: DirectoryId,
        user_id: UserId,
    ) -> Result<Vec<FileDescriptor>> {
        Self::check(&self.fail_delete_directory, "delete_directory")?;
        self.inner.delete_directory(directory_id, user_id).await
    }

    async fn rename_directory(&self, directory_id: DirectoryId, new_name: &str) -> Result<bool> {
        self.inner.rename_directory(directory_id, new_name).await
    }

    async fn move_directory(
        &self,
        directory_id: DirectoryId,
        destination: DirectoryId,
    ) -> Result<bool> {
        self.inner.move_directory(directory_id, destination).await
    }

    async fn share_directory(&self, directory_id: DirectoryId, user_id: UserId) -> Result<()> {
        self.inner.share_directory(directory_id, user_id).await
    }

    async fn insert_file(&self, file: &FileDescriptor) -> Result<()> {
        Self::check(&self.fail_insert_file, "insert_file")?;
        self.inner.insert_file(file).await
    }

    async fn find_file(&self, file_id: &FileId) -> Result<Option<FileDescriptor>> {
        self.inner.find_file(file_id).await
    }

    async fn find_file_by_path(
        &self,
        owner_id: UserId,
        directory_path: &str,
        name: &str,
    ) -> Result<Option<FileDescriptor>> {
        self.inner
            .find_file_by_path(owner_id, directory_path, name)
            .await
    }

    async fn is_file_shared_with(&self, user_id: UserId, file_id: &FileId) -> Result<bool> {
        self.inner.is_file_shared_with(user_id, file_id).await
    }

    async fn share_file(&self, file_id: &FileId, user_id: UserId) -> Result<()> {
        self.inner.share_file(file_id, user_id).await
    }

    async fn delete_file(&self, file_id: &FileId) -> Result<bool> {
        self.inner.delete_file(file_id).await
    }

    async fn rename_file(&self, file_id: &FileId, new_name: &str) -> Result<bool> {
        self.inner.rename_file(file_id, new_name).await
    }

    async fn move_file(&self, file_id: &FileId, destination: DirectoryId) -> Result<bool> {
        self.inner.move_file(file_id, destination).await
    }

    async fn register_placement(&self, file_id: &FileId, node_id: NodeId) -> Result<()> {
        Self::check(&self.fail_placements, "register_placement")?;
        self.inner.register_placement(file_id, node_id).await
    }

    async fn placements_for_file(&self, file_id: &FileId) -> Result<Vec<NodeId>> {
        Self::check(&self.fail_placements, "placements_for_file")?;
        self.inner.placements_for_file(file_id).await
    }
}

/// A selector over scripted nodes, metrics already loaded.
pub struct TestCluster {
    pub repository: Arc<dyn MetadataRepository>,
    pub selector: Arc<NodeSelector>,
    pub nodes: Vec<Arc<ScriptedNode>>,
    pub node_ids: Vec<NodeId>,
}

/// Registers `count` accepting nodes of `capacity_bytes` each against `repository`.
pub async fn cluster_on(
    repository: Arc<dyn MetadataRepository>,
    count: usize,
    capacity_bytes: u64,
    settings: SelectorSettings,
) -> TestCluster {
    let mut directory = NodeDirectory::new();
    let mut nodes = Vec::with_capacity(count);

    for index in 0..count {
        let node = ScriptedNode::accepting();
        directory
            .register(
                repository.as_ref(),
                &format!("scripted://node-{}", index),
                capacity_bytes,
                node.clone(),
            )
            .await
            .expect("register scripted node");
        nodes.push(node);
    }

    let node_ids = directory.nodes().iter().map(|node| node.id).collect();
    let selector = NodeSelector::new(directory.into_nodes(), repository.clone(), settings)
        .expect("non-empty node set");
    selector.load_initial_metrics().await;

    TestCluster {
        repository,
        selector,
        nodes,
        node_ids,
    }
}

pub async fn cluster(count: usize, settings: SelectorSettings) -> TestCluster {
    cluster_on(Arc::new(InMemoryMetadata::new()), count, 1_000_000, settings).await
}

pub fn settings(replication_factor: usize) -> SelectorSettings {
    SelectorSettings {
        replication_factor,
        ..SelectorSettings::default()
    }
}
