use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status shared by job and step executions.
///
/// `Created -> Starting -> Started -> {Completed, Failed, Stopped}`. A run may
/// also fail or stop while still `Starting`. Terminal states have no exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BatchStatus {
    Created,
    Starting,
    Started,
    Completed,
    Failed,
    Stopped,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Created => "CREATED",
            BatchStatus::Starting => "STARTING",
            BatchStatus::Started => "STARTED",
            BatchStatus::Completed => "COMPLETED",
            BatchStatus::Failed => "FAILED",
            BatchStatus::Stopped => "STOPPED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BatchStatus::Completed | BatchStatus::Failed | BatchStatus::Stopped
        )
    }

    pub fn is_running(&self) -> bool {
        matches!(self, BatchStatus::Starting | BatchStatus::Started)
    }

    pub fn can_transition_to(&self, next: BatchStatus) -> bool {
        use BatchStatus::*;
        matches!(
            (self, next),
            (Created, Starting)
                | (Starting, Started)
                | (Starting, Failed)
                | (Starting, Stopped)
                | (Started, Completed)
                | (Started, Failed)
                | (Started, Stopped)
        )
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
