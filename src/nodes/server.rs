//! Storage Node Server
//!
//! The node side of the HTTP protocol: blobs kept in a concurrent map and served
//! through a small axum router. Used by the binary's `node` mode and by the
//! transport round-trip tests.
//!
//! Stores and deletes address blobs by `"{ownerId}-{uuid}"` while downloads use the bare
//! uuid, so lookups fall back to the owner-qualified key ending in `-{uuid}`.

use super::protocol::*;

use axum::body::Bytes;
use axum::routing::{get, post};
use axum::{
    Extension, Json, Router,
    extract::Path,
    http::StatusCode,
};
use dashmap::DashMap;
use std::sync::Arc;

#[derive(Default)]
pub struct BlobStore {
    blobs: DashMap<String, Vec<u8>>,
}

impl BlobStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn put(&self, key: &str, content: Vec<u8>) {
        self.blobs.insert(key.to_string(), content);
    }

    /// Exact key first, then an owner-qualified key ending in `-{key}`.
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        if let Some(content) = self.blobs.get(key) {
            return Some(content.value().clone());
        }

        let suffix = format!("-{}", key);
        self.blobs
            .iter()
            .find(|entry| entry.key().ends_with(&suffix))
            .map(|entry| entry.value().clone())
    }

    pub fn remove(&self, key: &str) -> bool {
        self.blobs.remove(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    pub fn bytes_stored(&self) -> u64 {
        self.blobs
            .iter()
            .map(|entry| entry.value().len() as u64)
            .sum()
    }
}

pub fn router(store: Arc<BlobStore>) -> Router {
    Router::new()
        .route(
            &format!("{}/:key", ENDPOINT_FILES),
            get(handle_download).put(handle_upload).delete(handle_delete),
        )
        .route(ENDPOINT_BATCH_DOWNLOAD, post(handle_batch_download))
        .route(ENDPOINT_HEALTH, get(handle_health))
        .layer(Extension(store))
}

pub async fn handle_upload(
    Extension(store): Extension<Arc<BlobStore>>,
    Path(key): Path<String>,
    body: Bytes,
) -> (StatusCode, Json<StoreResponse>) {
    tracing::debug!("Storing {} ({} bytes)", key, body.len());
    store.put(&key, body.to_vec());

    (StatusCode::OK, Json(StoreResponse { success: true }))
}

pub async fn handle_download(
    Extension(store): Extension<Arc<BlobStore>>,
    Path(key): Path<String>,
) -> (StatusCode, Vec<u8>) {
    match store.get(&key) {
        Some(content) => (StatusCode::OK, content),
        None => {
            tracing::debug!("Blob not found: {}", key);
            (StatusCode::NOT_FOUND, Vec::new())
        }
    }
}

pub async fn handle_batch_download(
    Extension(store): Extension<Arc<BlobStore>>,
    Json(req): Json<BatchDownloadRequest>,
) -> (StatusCode, Json<BatchDownloadResponse>) {
    let contents = req.file_keys.iter().map(|key| store.get(key)).collect();

    (StatusCode::OK, Json(BatchDownloadResponse { contents }))
}

pub async fn handle_delete(
    Extension(store): Extension<Arc<BlobStore>>,
    Path(key): Path<String>,
) -> (StatusCode, Json<StoreResponse>) {
    let success = store.remove(&key);
    if !success {
        tracing::debug!("Delete of unknown blob {}", key);
    }

    (StatusCode::OK, Json(StoreResponse { success }))
}

pub async fn handle_health(
    Extension(store): Extension<Arc<BlobStore>>,
) -> (StatusCode, Json<NodeHealthResponse>) {
    (
        StatusCode::OK,
        Json(NodeHealthResponse {
            file_count: store.len(),
            bytes_stored: store.bytes_stored(),
        }),
    )
}
