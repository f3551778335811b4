use crate::step::StepOutcome;
use engine_core::tasklet::Tasklet;
use model::execution::{job::JobExecution, step::StepExecution};
use tokio_util::sync::CancellationToken;

/// Runs a tasklet step once. A step cancelled before it starts is stopped.
pub async fn run_tasklet(
    tasklet: &dyn Tasklet,
    job: &JobExecution,
    execution: &mut StepExecution,
    cancel: &CancellationToken,
) -> StepOutcome {
    if cancel.is_cancelled() {
        return StepOutcome::Stopped;
    }
    StepOutcome::from_result(tasklet.execute(execution, job).await)
}
