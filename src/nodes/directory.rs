//! Node Directory
//!
//! Registers storage node endpoints with the metadata repository and collects the
//! `(nodeId, handle)` list the selector is built from.

use super::http::HttpNodeClient;
use super::rpc::NodeRpc;
use super::types::{NodeId, RegisteredNode};
use crate::config::NodeEndpoint;
use crate::metadata::repository::MetadataRepository;

use anyhow::Result;
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct NodeDirectory {
    nodes: Vec<RegisteredNode>,
}

impl NodeDirectory {
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    /// Registers every configured endpoint behind an `HttpNodeClient`.
    ///
    /// Endpoints the repository refuses are skipped; it is an error only if none
    /// could be registered.
    pub async fn from_endpoints(
        repository: &dyn MetadataRepository,
        endpoints: &[NodeEndpoint],
    ) -> Result<Self> {
        let mut directory = Self::new();

        for endpoint in endpoints {
            let handle = Arc::new(HttpNodeClient::new(&endpoint.url));
            if let Err(e) = directory
                .register(repository, &endpoint.url, endpoint.capacity_bytes, handle)
                .await
            {
                tracing::warn!("Skipping node {}: {:#}", endpoint.url, e);
            }
        }

        if directory.is_empty() {
            anyhow::bail!("No storage node could be registered");
        }

        tracing::info!("Registered {} storage node(s)", directory.len());
        Ok(directory)
    }

    /// Registers one node. Re-registering a known endpoint replaces its handle.
    pub async fn register(
        &mut self,
        repository: &dyn MetadataRepository,
        endpoint: &str,
        capacity_bytes: u64,
        handle: Arc<dyn NodeRpc>,
    ) -> Result<NodeId> {
        let id = repository.upsert_node(endpoint, capacity_bytes).await?;

        let node = RegisteredNode {
            id,
            endpoint: endpoint.to_string(),
            handle,
        };
        match self.nodes.iter_mut().find(|existing| existing.id == id) {
            Some(existing) => *existing = node,
            None => self.nodes.push(node),
        }

        tracing::info!("Node {} registered at {}", id, endpoint);
        Ok(id)
    }

    pub fn nodes(&self) -> &[RegisteredNode] {
        &self.nodes
    }

    pub fn into_nodes(self) -> Vec<RegisteredNode> {
        self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
