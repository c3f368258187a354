//! Node RPC Contract
//!
//! The operations a storage node exposes to the orchestrator. Keys are
//! `"{ownerId}-{uuid}"` for store and delete, and the bare uuid for downloads.

use anyhow::Result;
use async_trait::async_trait;

#[async_trait]
pub trait NodeRpc: Send + Sync {
    /// Stores `content` under `file_key`. `Ok(false)` means the node refused it.
    async fn upload_file(&self, file_key: &str, content: &[u8]) -> Result<bool>;

    /// `Ok(None)` when the node does not hold the file.
    async fn download_file(&self, file_key: &str) -> Result<Option<Vec<u8>>>;

    /// One entry per requested key, in request order.
    async fn download_files(&self, file_keys: &[String]) -> Result<Vec<Option<Vec<u8>>>>;

    async fn delete_file(&self, file_key: &str) -> Result<bool>;
}
