use crate::transaction::Transaction;
use async_trait::async_trait;
use model::{
    core::identifiers::{JobExecutionId, StepExecutionId},
    error::BatchError,
    execution::{context::ExecutionContext, job::JobExecution, step::StepExecution},
};

pub mod sled_store;

/// Durable record of job executions, step executions and their contexts.
///
/// `stage_*` methods write through a [`Transaction`] obtained from the
/// transaction manager paired with this store; everything else writes
/// immediately.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn save_job_execution(&self, execution: &JobExecution) -> Result<(), BatchError>;

    async fn load_job_execution(
        &self,
        id: &JobExecutionId,
    ) -> Result<Option<JobExecution>, BatchError>;

    /// All executions of `job_name`, oldest first.
    async fn job_executions(&self, job_name: &str) -> Result<Vec<JobExecution>, BatchError>;

    /// Persists the step row. The execution context is left untouched.
    async fn save_step_execution(&self, execution: &StepExecution) -> Result<(), BatchError>;

    /// Stages the step row together with its execution context.
    fn stage_step_execution(
        &self,
        tx: &mut dyn Transaction,
        execution: &StepExecution,
    ) -> Result<(), BatchError>;

    /// Loads the step row with its last committed context.
    async fn load_step_execution(
        &self,
        id: &StepExecutionId,
    ) -> Result<Option<StepExecution>, BatchError>;

    /// Step executions (partitions included) of one job execution, in start order.
    async fn step_executions(
        &self,
        job_execution_id: &JobExecutionId,
    ) -> Result<Vec<StepExecution>, BatchError>;

    async fn save_context(
        &self,
        id: &StepExecutionId,
        context: &ExecutionContext,
    ) -> Result<(), BatchError>;

    /// Last persisted context; empty if none was ever saved.
    async fn load_context(&self, id: &StepExecutionId) -> Result<ExecutionContext, BatchError>;
}
