//! Orchestrator Configuration
//!
//! All tunables of the orchestration layer. Every field has a default, so an empty
//! JSON object (`{}`) is a valid configuration; the binary only needs to list the
//! storage node endpoints.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_REPLICATION_FACTOR: usize = 2;
pub const DEFAULT_ACTIVE_TASK_WEIGHT: f64 = 0.1;
pub const DEFAULT_MAX_ACTIVE_TASKS: usize = 10;
pub const DEFAULT_WORKER_COUNT: usize = 5;
pub const DEFAULT_METRICS_GATE_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_RESYNC_INTERVAL: Duration = Duration::from_secs(300);

/// A storage node the orchestrator should register at startup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeEndpoint {
    /// Base URL of the node, e.g. `http://127.0.0.1:7001`.
    pub url: String,
    /// Advertised capacity in bytes.
    pub capacity_bytes: u64,
}

/// How long the service waits on a task handle, per operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OperationTimeouts {
    pub create_directory_secs: u64,
    pub upload_secs: u64,
    pub download_secs: u64,
    pub download_batch_secs: u64,
    pub delete_file_secs: u64,
    pub delete_directory_secs: u64,
}

impl Default for OperationTimeouts {
    fn default() -> Self {
        Self {
            create_directory_secs: 10,
            upload_secs: 100,
            download_secs: 30,
            download_batch_secs: 60,
            delete_file_secs: 30,
            delete_directory_secs: 60,
        }
    }
}

impl OperationTimeouts {
    pub fn create_directory(&self) -> Duration {
        Duration::from_secs(self.create_directory_secs)
    }

    pub fn upload(&self) -> Duration {
        Duration::from_secs(self.upload_secs)
    }

    pub fn download(&self) -> Duration {
        Duration::from_secs(self.download_secs)
    }

    pub fn download_batch(&self) -> Duration {
        Duration::from_secs(self.download_batch_secs)
    }

    pub fn delete_file(&self) -> Duration {
        Duration::from_secs(self.delete_file_secs)
    }

    pub fn delete_directory(&self) -> Duration {
        Duration::from_secs(self.delete_directory_secs)
    }
}

/// Parameters of the load-aware node selector.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SelectorSettings {
    /// Nodes receiving a copy of each uploaded file (primary included).
    pub replication_factor: usize,
    /// Weight of one in-flight task relative to a fully used disk.
    pub active_task_weight: f64,
    /// Nodes at or above this many in-flight tasks are skipped while others remain.
    pub max_active_tasks: usize,
    /// Bound on how long a selection waits for the initial metrics load.
    pub metrics_gate_timeout_secs: u64,
    /// Period of the authoritative usage resync.
    pub resync_interval_secs: u64,
}

impl Default for SelectorSettings {
    fn default() -> Self {
        Self {
            replication_factor: DEFAULT_REPLICATION_FACTOR,
            active_task_weight: DEFAULT_ACTIVE_TASK_WEIGHT,
            max_active_tasks: DEFAULT_MAX_ACTIVE_TASKS,
            metrics_gate_timeout_secs: DEFAULT_METRICS_GATE_TIMEOUT.as_secs(),
            resync_interval_secs: DEFAULT_RESYNC_INTERVAL.as_secs(),
        }
    }
}

impl SelectorSettings {
    pub fn metrics_gate_timeout(&self) -> Duration {
        Duration::from_secs(self.metrics_gate_timeout_secs)
    }

    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_interval_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub nodes: Vec<NodeEndpoint>,
    pub selector: SelectorSettings,
    /// Size of the task queue's worker pool.
    pub worker_count: usize,
    pub timeouts: OperationTimeouts,
    /// Try further replicas when the first placement cannot deliver a file.
    pub download_failover: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            selector: SelectorSettings::default(),
            worker_count: DEFAULT_WORKER_COUNT,
            timeouts: OperationTimeouts::default(),
            download_failover: true,
        }
    }
}

impl OrchestratorConfig {
    /// Reads and validates a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: OrchestratorConfig = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.worker_count == 0 {
            anyhow::bail!("worker_count must be at least 1");
        }
        if self.selector.replication_factor == 0 {
            anyhow::bail!("selector.replication_factor must be at least 1");
        }
        if !self.selector.active_task_weight.is_finite() || self.selector.active_task_weight < 0.0
        {
            anyhow::bail!("selector.active_task_weight must be a finite, non-negative number");
        }
        if self.selector.resync_interval_secs == 0 {
            anyhow::bail!("selector.resync_interval_secs must be at least 1");
        }
        if self.selector.metrics_gate_timeout_secs == 0 {
            anyhow::bail!("selector.metrics_gate_timeout_secs must be at least 1");
        }
        for node in &self.nodes {
            if node.url.trim().is_empty() {
                anyhow::bail!("node endpoint url must not be empty");
            }
        }
        Ok(())
    }
}
