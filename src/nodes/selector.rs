//! Load-Aware Node Selector
//!
//! Decides which nodes store each uploaded file and keeps the load signals those
//! decisions rest on.
//!
//! ## Selection weight
//! `weight = space_used / capacity + active_task_weight * active_tasks`, lower is better.
//! Nodes at or above `max_active_tasks` are skipped unless every node is, in which case
//! all nodes compete again. Ties keep registration order.
//!
//! ## Metrics lifecycle
//! 1. **Preload**: a background pass reads every node's usage from the repository and then
//!    opens a one-shot gate. Selections arriving earlier wait on the gate for a bounded
//!    time and fall back to whatever metrics exist.
//! 2. **Bookkeeping**: confirmed uploads and deletions adjust the counters immediately.
//! 3. **Resync**: a periodic pass overwrites usage with the repository's ground truth.

use super::rpc::NodeRpc;
use super::types::*;
use crate::config::SelectorSettings;
use crate::metadata::repository::MetadataRepository;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectorError {
    #[error("a node selector needs at least one registered node")]
    NoNodesRegistered,
    #[error("node {0} registered twice")]
    DuplicateNode(NodeId),
}

struct NodeRecord {
    id: NodeId,
    endpoint: String,
    handle: Arc<dyn NodeRpc>,
    metrics: NodeMetrics,
}

pub struct NodeSelector {
    /// Registration order; doubles as the tie-break order.
    nodes: Vec<NodeRecord>,
    index: HashMap<NodeId, usize>,
    repository: Arc<dyn MetadataRepository>,
    settings: SelectorSettings,
    metrics_ready: watch::Sender<bool>,
}

impl NodeSelector {
    pub fn new(
        nodes: Vec<RegisteredNode>,
        repository: Arc<dyn MetadataRepository>,
        settings: SelectorSettings,
    ) -> Result<Arc<Self>, SelectorError> {
        if nodes.is_empty() {
            return Err(SelectorError::NoNodesRegistered);
        }

        let mut index = HashMap::with_capacity(nodes.len());
        let mut records = Vec::with_capacity(nodes.len());
        for (position, node) in nodes.into_iter().enumerate() {
            if index.insert(node.id, position).is_some() {
                return Err(SelectorError::DuplicateNode(node.id));
            }
            records.push(NodeRecord {
                id: node.id,
                endpoint: node.endpoint,
                handle: node.handle,
                metrics: NodeMetrics::default(),
            });
        }

        let (metrics_ready, _) = watch::channel(false);

        Ok(Arc::new(Self {
            nodes: records,
            index,
            repository,
            settings,
            metrics_ready,
        }))
    }

    /// Spawns the metrics preload followed by the periodic resync loop.
    pub fn start(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let selector = self.clone();

        tokio::spawn(async move {
            selector.load_initial_metrics().await;

            let mut interval = tokio::time::interval(selector.settings.resync_interval());
            // The first tick completes immediately; the preload already covered it.
            interval.tick().await;

            loop {
                interval.tick().await;
                let refreshed = selector.refresh_metrics().await;
                tracing::debug!(
                    "Resynced usage for {}/{} nodes",
                    refreshed,
                    selector.nodes.len()
                );
            }
        })
    }

    /// Reads every node's usage once and opens the selection gate, even if some
    /// nodes could not be read.
    pub async fn load_initial_metrics(&self) {
        let refreshed = self.refresh_metrics().await;
        self.metrics_ready.send_replace(true);
        tracing::info!(
            "Node metrics loaded for {}/{} nodes",
            refreshed,
            self.nodes.len()
        );
    }

    /// Overwrites capacity, space used and file count with the repository's values.
    /// Returns how many nodes were refreshed.
    pub async fn refresh_metrics(&self) -> usize {
        let mut refreshed = 0;

        for node in &self.nodes {
            match self.repository.node_usage(node.id).await {
                Ok(usage) => {
                    node.metrics.overwrite_usage(
                        usage.capacity_bytes,
                        usage.space_used_bytes,
                        usage.file_count,
                    );
                    refreshed += 1;
                }
                Err(e) => {
                    tracing::warn!("Failed to load usage for {}: {:#}", node.id, e);
                }
            }
        }

        refreshed
    }

    pub fn metrics_loaded(&self) -> bool {
        *self.metrics_ready.borrow()
    }

    async fn wait_for_metrics(&self) {
        if self.metrics_loaded() {
            return;
        }

        let mut ready = self.metrics_ready.subscribe();
        let gate = self.settings.metrics_gate_timeout();
        if tokio::time::timeout(gate, ready.wait_for(|loaded| *loaded))
            .await
            .is_err()
        {
            tracing::warn!(
                "Node metrics not loaded after {:?}, selecting with current values",
                gate
            );
        }
    }

    /// Picks a primary plus up to `replication_factor - 1` replicas for an upload.
    ///
    /// Every returned node has its active-task counter incremented; the returned
    /// `NodeSelection` gives each increment back when dropped.
    pub async fn select_nodes_for_upload(self: &Arc<Self>, file_size: u64) -> NodeSelection {
        self.wait_for_metrics().await;

        let ceiling = self.settings.max_active_tasks;
        let mut candidates: Vec<(usize, f64)> = self
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| node.metrics.active_tasks() < ceiling)
            .map(|(position, node)| (position, self.weight(node)))
            .collect();

        if candidates.is_empty() {
            tracing::warn!(
                "All {} nodes are at {} active tasks or more, ignoring the ceiling",
                self.nodes.len(),
                ceiling
            );
            candidates = self
                .nodes
                .iter()
                .enumerate()
                .map(|(position, node)| (position, self.weight(node)))
                .collect();
        }

        // Stable sort keeps registration order among equal weights.
        candidates.sort_by(|a, b| a.1.total_cmp(&b.1));
        let wanted = self.settings.replication_factor.max(1);
        candidates.truncate(wanted);

        let mut selected = Vec::with_capacity(candidates.len());
        for (position, weight) in candidates {
            let node = &self.nodes[position];
            let active = node.metrics.task_started();
            tracing::debug!(
                "Selected {} (weight {:.3}, {} active) for {} bytes",
                node.id,
                weight,
                active,
                file_size
            );
            selected.push(SelectedNode {
                id: node.id,
                handle: node.handle.clone(),
            });
        }

        NodeSelection {
            selector: self.clone(),
            nodes: selected,
        }
    }

    /// Gives back one active task on `node_id`.
    pub fn complete_task(&self, node_id: NodeId) {
        match self.record(node_id) {
            Some(node) => {
                if !node.metrics.task_finished() {
                    tracing::warn!("Unpaired task completion for {}", node_id);
                }
            }
            None => tracing::warn!("complete_task for unknown {}", node_id),
        }
    }

    pub fn record_file_upload(&self, node_id: NodeId, size_bytes: u64) {
        match self.record(node_id) {
            Some(node) => node.metrics.add_file(size_bytes),
            None => tracing::warn!("record_file_upload for unknown {}", node_id),
        }
    }

    pub fn record_file_deletion(&self, node_id: NodeId, size_bytes: u64) {
        match self.record(node_id) {
            Some(node) => node.metrics.remove_file(size_bytes),
            None => tracing::warn!("record_file_deletion for unknown {}", node_id),
        }
    }

    /// Handle of a previously registered node, for reads and deletes that target
    /// recorded placements.
    pub fn get_stub_by_id(&self, node_id: NodeId) -> Option<Arc<dyn NodeRpc>> {
        self.record(node_id).map(|node| node.handle.clone())
    }

    pub fn weight_of(&self, node_id: NodeId) -> Option<f64> {
        self.record(node_id).map(|node| self.weight(node))
    }

    pub fn active_tasks(&self, node_id: NodeId) -> Option<usize> {
        self.record(node_id).map(|node| node.metrics.active_tasks())
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.iter().map(|node| node.id).collect()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn node_stats(&self) -> Vec<NodeSnapshot> {
        self.nodes
            .iter()
            .map(|node| NodeSnapshot {
                id: node.id,
                endpoint: node.endpoint.clone(),
                capacity_bytes: node.metrics.capacity_bytes(),
                space_used_bytes: node.metrics.space_used_bytes(),
                file_count: node.metrics.file_count(),
                active_tasks: node.metrics.active_tasks(),
                weight: self.weight(node),
            })
            .collect()
    }

    fn record(&self, node_id: NodeId) -> Option<&NodeRecord> {
        self.index.get(&node_id).map(|&position| &self.nodes[position])
    }

    fn weight(&self, node: &NodeRecord) -> f64 {
        node.metrics.usage_ratio()
            + self.settings.active_task_weight * node.metrics.active_tasks() as f64
    }
}

#[derive(Clone)]
pub struct SelectedNode {
    pub id: NodeId,
    pub handle: Arc<dyn NodeRpc>,
}

/// Nodes chosen for one upload, primary first.
///
/// Owns the active-task increments taken at selection time and releases each of them
/// exactly once when dropped, whatever path the owning command took.
pub struct NodeSelection {
    selector: Arc<NodeSelector>,
    nodes: Vec<SelectedNode>,
}

impl NodeSelection {
    pub fn nodes(&self) -> &[SelectedNode] {
        &self.nodes
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.iter().map(|node| node.id).collect()
    }

    pub fn primary(&self) -> Option<NodeId> {
        self.nodes.first().map(|node| node.id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl Drop for NodeSelection {
    fn drop(&mut self) {
        for node in &self.nodes {
            self.selector.complete_task(node.id);
        }
    }
}

impl fmt::Debug for NodeSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeSelection")
            .field("nodes", &self.node_ids())
            .finish()
    }
}
