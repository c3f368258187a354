//! Node Network Protocol
//!
//! Endpoints and Data Transfer Objects spoken between the orchestrator's
//! `HttpNodeClient` and a storage node's HTTP server.
//!
//! File content travels as the raw request/response body for single-file calls;
//! only the batch download wraps content in JSON.

use serde::{Deserialize, Serialize};

/// `PUT` stores the body, `GET` returns it, `DELETE` removes it. Suffixed with `/{key}`.
pub const ENDPOINT_FILES: &str = "/files";
/// `POST` with a `BatchDownloadRequest`.
pub const ENDPOINT_BATCH_DOWNLOAD: &str = "/internal/batch_download";
/// `GET` node health and local usage.
pub const ENDPOINT_HEALTH: &str = "/health";

/// Acknowledgment for store and delete calls.
#[derive(Debug, Serialize, Deserialize)]
pub struct StoreResponse {
    pub success: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BatchDownloadRequest {
    pub file_keys: Vec<String>,
}

/// `contents[i]` answers `file_keys[i]`; `None` marks a key the node does not hold.
#[derive(Debug, Serialize, Deserialize)]
pub struct BatchDownloadResponse {
    pub contents: Vec<Option<Vec<u8>>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NodeHealthResponse {
    pub file_count: usize,
    pub bytes_stored: u64,
}
