use super::rpc::NodeRpc;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Stable identifier of a storage node, assigned by the metadata repository.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node-{}", self.0)
    }
}

/// A node known to the orchestrator, before any metrics are attached.
#[derive(Clone)]
pub struct RegisteredNode {
    pub id: NodeId,
    pub endpoint: String,
    pub handle: Arc<dyn NodeRpc>,
}

impl fmt::Debug for RegisteredNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredNode")
            .field("id", &self.id)
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

/// Mutable load signals of one node.
///
/// Every update is a single atomic operation. Decrements saturate at zero so an
/// unpaired decrement can never wrap the counter.
#[derive(Debug, Default)]
pub struct NodeMetrics {
    capacity_bytes: AtomicU64,
    space_used_bytes: AtomicU64,
    file_count: AtomicU64,
    active_tasks: AtomicUsize,
}

impl NodeMetrics {
    pub fn capacity_bytes(&self) -> u64 {
        self.capacity_bytes.load(Ordering::Relaxed)
    }

    pub fn space_used_bytes(&self) -> u64 {
        self.space_used_bytes.load(Ordering::Relaxed)
    }

    pub fn file_count(&self) -> u64 {
        self.file_count.load(Ordering::Relaxed)
    }

    pub fn active_tasks(&self) -> usize {
        self.active_tasks.load(Ordering::SeqCst)
    }

    /// Fraction of capacity in use; `0.0` while capacity is still unknown.
    pub fn usage_ratio(&self) -> f64 {
        let capacity = self.capacity_bytes();
        if capacity == 0 {
            return 0.0;
        }
        self.space_used_bytes() as f64 / capacity as f64
    }

    pub(crate) fn overwrite_usage(&self, capacity_bytes: u64, space_used_bytes: u64, files: u64) {
        self.capacity_bytes.store(capacity_bytes, Ordering::Relaxed);
        self.space_used_bytes.store(space_used_bytes, Ordering::Relaxed);
        self.file_count.store(files, Ordering::Relaxed);
    }

    pub(crate) fn add_file(&self, size_bytes: u64) {
        self.space_used_bytes.fetch_add(size_bytes, Ordering::Relaxed);
        self.file_count.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn remove_file(&self, size_bytes: u64) {
        let _ = self
            .space_used_bytes
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |used| {
                Some(used.saturating_sub(size_bytes))
            });
        let _ = self
            .file_count
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |count| {
                Some(count.saturating_sub(1))
            });
    }

    pub(crate) fn task_started(&self) -> usize {
        self.active_tasks.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Returns `false` if the counter was already zero.
    pub(crate) fn task_finished(&self) -> bool {
        self.active_tasks
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |active| {
                active.checked_sub(1)
            })
            .is_ok()
    }
}

/// Point-in-time view of a node, used for logging and diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeSnapshot {
    pub id: NodeId,
    pub endpoint: String,
    pub capacity_bytes: u64,
    pub space_used_bytes: u64,
    pub file_count: u64,
    pub active_tasks: usize,
    pub weight: f64,
}
