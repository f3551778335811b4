use crate::{
    core::identifiers::{JobExecutionId, StepExecutionId},
    error::{BatchError, FailureDetail},
    execution::{context::ExecutionContext, status::BatchStatus},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Item counts contributed by one committed chunk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkCounts {
    pub read: u64,
    pub written: u64,
    pub filtered: u64,
}

/// One run of a step, or of one partition of a partitioned step.
///
/// The execution context is persisted under its own key (see the execution
/// store), so it is skipped when the row itself is serialized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepExecution {
    pub id: StepExecutionId,
    pub job_execution_id: JobExecutionId,
    pub step_name: String,
    pub parent_id: Option<StepExecutionId>,
    pub partition: Option<usize>,
    status: BatchStatus,
    read_count: u64,
    write_count: u64,
    filter_count: u64,
    commit_count: u64,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
    failure: Option<FailureDetail>,
    #[serde(skip)]
    context: ExecutionContext,
}

impl StepExecution {
    pub fn new(job_execution_id: JobExecutionId, step_name: impl Into<String>) -> Self {
        Self {
            id: StepExecutionId::generate(),
            job_execution_id,
            step_name: step_name.into(),
            parent_id: None,
            partition: None,
            status: BatchStatus::Created,
            read_count: 0,
            write_count: 0,
            filter_count: 0,
            commit_count: 0,
            start_time: None,
            end_time: None,
            failure: None,
            context: ExecutionContext::new(),
        }
    }

    /// Child execution for partition `index` of `parent`.
    pub fn partition_of(parent: &StepExecution, index: usize, context: ExecutionContext) -> Self {
        let mut child = Self::new(
            parent.job_execution_id.clone(),
            partition_name(&parent.step_name, index),
        );
        child.parent_id = Some(parent.id.clone());
        child.partition = Some(index);
        child.context = context;
        child
    }

    pub fn status(&self) -> BatchStatus {
        self.status
    }

    pub fn read_count(&self) -> u64 {
        self.read_count
    }

    pub fn write_count(&self) -> u64 {
        self.write_count
    }

    pub fn filter_count(&self) -> u64 {
        self.filter_count
    }

    pub fn commit_count(&self) -> u64 {
        self.commit_count
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    pub fn failure(&self) -> Option<&FailureDetail> {
        self.failure.as_ref()
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut ExecutionContext {
        &mut self.context
    }

    pub fn set_context(&mut self, context: ExecutionContext) {
        self.context = context;
    }

    pub fn is_partition(&self) -> bool {
        self.parent_id.is_some()
    }

    pub fn transition(&mut self, next: BatchStatus) -> Result<(), BatchError> {
        if !self.status.can_transition_to(next) {
            return Err(BatchError::internal(format!(
                "step execution {} ({}) cannot move from {} to {}",
                self.id, self.step_name, self.status, next
            )));
        }

        let now = Utc::now();
        if next == BatchStatus::Started {
            self.start_time = Some(now);
        }
        if next.is_terminal() {
            self.end_time = Some(now);
        }
        self.status = next;
        Ok(())
    }

    pub fn fail(&mut self, failure: FailureDetail) -> Result<(), BatchError> {
        self.transition(BatchStatus::Failed)?;
        self.failure = Some(failure);
        Ok(())
    }

    /// Adds the counts of a committed chunk. Rejected once terminal.
    pub fn record_chunk(&mut self, counts: ChunkCounts) -> Result<(), BatchError> {
        if self.status.is_terminal() {
            return Err(BatchError::internal(format!(
                "step execution {} is already {}",
                self.id, self.status
            )));
        }

        self.read_count += counts.read;
        self.write_count += counts.written;
        self.filter_count += counts.filtered;
        self.commit_count += 1;
        Ok(())
    }

    /// Folds the counts of a finished partition into its parent.
    pub fn absorb(&mut self, child: &StepExecution) {
        self.read_count += child.read_count;
        self.write_count += child.write_count;
        self.filter_count += child.filter_count;
        self.commit_count += child.commit_count;
    }
}

/// Name under which partition `index` of `step_name` is recorded.
pub fn partition_name(step_name: &str, index: usize) -> String {
    format!("{step_name}:partition-{index}")
}
