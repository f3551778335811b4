use crate::state_manager::StateManager;
use engine_core::metrics::Metrics;
use serde::{Deserialize, Serialize};

/// What happens to the remaining partitions once one of them fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionFailurePolicy {
    /// Cancel the siblings; they stop at their next chunk boundary.
    #[default]
    FailFast,
    /// Let every sibling run to its own terminal status.
    RunToCompletion,
}

/// Shared services every step and partition runs against.
#[derive(Clone)]
pub struct StepEnv {
    pub state: StateManager,
    pub metrics: Metrics,
    pub partition_failure: PartitionFailurePolicy,
    pub max_concurrent_partitions: Option<usize>,
}

impl StepEnv {
    pub fn new(state: StateManager, metrics: Metrics) -> Self {
        Self {
            state,
            metrics,
            partition_failure: PartitionFailurePolicy::default(),
            max_concurrent_partitions: None,
        }
    }

    pub fn with_partition_failure(mut self, policy: PartitionFailurePolicy) -> Self {
        self.partition_failure = policy;
        self
    }

    pub fn with_max_concurrent_partitions(mut self, limit: Option<usize>) -> Self {
        self.max_concurrent_partitions = limit;
        self
    }
}
