//! HTTP Node Client
//!
//! `NodeRpc` over HTTP. Transport errors are retried with exponential backoff plus
//! jitter; a response with a non-success status is returned to the caller as-is and
//! interpreted per operation.

use super::protocol::*;
use super::rpc::NodeRpc;

use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

const SINGLE_FILE_TIMEOUT: Duration = Duration::from_secs(30);
const BATCH_TIMEOUT: Duration = Duration::from_secs(60);
const RETRY_ATTEMPTS: usize = 3;

pub struct HttpNodeClient {
    base_url: String,
    http_client: reqwest::Client,
}

impl HttpNodeClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http_client: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn file_url(&self, file_key: &str) -> String {
        format!("{}{}/{}", self.base_url, ENDPOINT_FILES, file_key)
    }

    async fn send_with_retry<F>(&self, build: F, attempts: usize) -> Result<reqwest::Response>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut delay_ms = 150u64;

        for attempt in 0..attempts {
            match build().send().await {
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    if attempt + 1 == attempts {
                        return Err(anyhow::anyhow!(e));
                    }
                    tracing::debug!(
                        "Request to {} failed (attempt {}): {}",
                        self.base_url,
                        attempt + 1,
                        e
                    );
                    // Simple jitter to prevent thundering herd
                    let jitter = rand::random::<u64>() % 50;
                    tokio::time::sleep(Duration::from_millis(delay_ms + jitter)).await;
                    delay_ms = (delay_ms * 2).min(1200);
                }
            }
        }

        Err(anyhow::anyhow!("Retry attempts exhausted"))
    }
}

#[async_trait]
impl NodeRpc for HttpNodeClient {
    async fn upload_file(&self, file_key: &str, content: &[u8]) -> Result<bool> {
        let url = self.file_url(file_key);
        let response = self
            .send_with_retry(
                || {
                    self.http_client
                        .put(url.clone())
                        .body(content.to_vec())
                        .timeout(SINGLE_FILE_TIMEOUT)
                },
                RETRY_ATTEMPTS,
            )
            .await?;

        if !response.status().is_success() {
            tracing::debug!("Upload to {} answered {}", url, response.status());
            return Ok(false);
        }

        let ack: StoreResponse = response.json().await?;
        Ok(ack.success)
    }

    async fn download_file(&self, file_key: &str) -> Result<Option<Vec<u8>>> {
        let url = self.file_url(file_key);
        let response = self
            .send_with_retry(
                || self.http_client.get(url.clone()).timeout(SINGLE_FILE_TIMEOUT),
                RETRY_ATTEMPTS,
            )
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(anyhow::anyhow!("Download failed: {}", response.status()));
        }

        Ok(Some(response.bytes().await?.to_vec()))
    }

    async fn download_files(&self, file_keys: &[String]) -> Result<Vec<Option<Vec<u8>>>> {
        let url = format!("{}{}", self.base_url, ENDPOINT_BATCH_DOWNLOAD);
        let payload = BatchDownloadRequest {
            file_keys: file_keys.to_vec(),
        };
        let response = self
            .send_with_retry(
                || {
                    self.http_client
                        .post(url.clone())
                        .json(&payload)
                        .timeout(BATCH_TIMEOUT)
                },
                RETRY_ATTEMPTS,
            )
            .await?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!(
                "Batch download failed: {}",
                response.status()
            ));
        }

        let batch: BatchDownloadResponse = response.json().await?;
        Ok(batch.contents)
    }

    async fn delete_file(&self, file_key: &str) -> Result<bool> {
        let url = self.file_url(file_key);
        let response = self
            .send_with_retry(
                || self.http_client.delete(url.clone()).timeout(SINGLE_FILE_TIMEOUT),
                RETRY_ATTEMPTS,
            )
            .await?;

        if !response.status().is_success() {
            return Ok(false);
        }

        let ack: StoreResponse = response.json().await?;
        Ok(ack.success)
    }
}
