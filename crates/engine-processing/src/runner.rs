use crate::{
    env::StepEnv,
    partition::run_partitions,
    step::{Step, StepKind, StepOutcome},
    tasklet::run_tasklet,
};
use model::{
    error::BatchError,
    execution::{context::ExecutionContext, job::JobExecution, step::StepExecution},
};
use tokio_util::sync::CancellationToken;

/// Runs one step execution to a terminal status and records it.
///
/// Collaborator failures end up on the returned execution; `Err` is only
/// returned when the execution itself could not be persisted.
pub async fn execute_step(
    step: &Step,
    job: &JobExecution,
    mut execution: StepExecution,
    partition_seeds: Vec<ExecutionContext>,
    env: &StepEnv,
    cancel: &CancellationToken,
) -> Result<StepExecution, BatchError> {
    env.state.begin_step(&mut execution).await?;

    let outcome = match step.kind() {
        StepKind::Tasklet(tasklet) => {
            run_tasklet(tasklet.as_ref(), job, &mut execution, cancel).await
        }
        StepKind::Chunk(chunk) => chunk.pipeline.run(job, &mut execution, env, cancel).await,
        StepKind::Partitioned(partitioned) => {
            run_partitions(
                partitioned,
                job,
                &mut execution,
                partition_seeds,
                env,
                cancel,
            )
            .await
        }
    };

    if matches!(outcome, StepOutcome::Failed(_)) {
        env.metrics.increment_failed_steps();
    }
    env.state.finish_step(&mut execution, outcome).await?;
    Ok(execution)
}
