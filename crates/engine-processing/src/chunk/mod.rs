use crate::{env::StepEnv, step::StepOutcome};
use async_trait::async_trait;
use model::execution::{job::JobExecution, step::StepExecution};
use tokio_util::sync::CancellationToken;

mod oriented;

pub use oriented::ChunkOrientedStep;

/// A read-process-write loop with its item types erased, so steps of any
/// item type can share one job.
#[async_trait]
pub trait ChunkPipeline: Send + Sync {
    fn chunk_size(&self) -> usize;

    /// Drives `execution` chunk by chunk until the reader is exhausted, an
    /// error occurs or `cancel` fires. Committed chunks are already persisted
    /// when this returns; the terminal status is left to the caller.
    async fn run(
        &self,
        job: &JobExecution,
        execution: &mut StepExecution,
        env: &StepEnv,
        cancel: &CancellationToken,
    ) -> StepOutcome;
}
