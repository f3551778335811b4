use engine_processing::PartitionFailurePolicy;
use serde::Deserialize;
use std::path::PathBuf;

/// Engine-wide settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory of the on-disk execution store.
    pub state_dir: PathBuf,

    pub partition_failure: PartitionFailurePolicy,

    /// Upper bound on partitions of one step running at the same time.
    pub max_concurrent_partitions: Option<usize>,

    /// Flush the store to disk on every chunk commit.
    pub flush_on_commit: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            partition_failure: PartitionFailurePolicy::FailFast,
            max_concurrent_partitions: None,
            flush_on_commit: true,
        }
    }
}

impl EngineConfig {
    pub fn with_state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.state_dir = dir.into();
        self
    }

    pub fn with_partition_failure(mut self, policy: PartitionFailurePolicy) -> Self {
        self.partition_failure = policy;
        self
    }

    pub fn with_max_concurrent_partitions(mut self, limit: usize) -> Self {
        self.max_concurrent_partitions = Some(limit);
        self
    }

    pub fn with_flush_on_commit(mut self, flush: bool) -> Self {
        self.flush_on_commit = flush;
        self
    }
}

fn default_state_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".batch/state")
}
