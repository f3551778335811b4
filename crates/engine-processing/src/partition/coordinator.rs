use crate::{
    chunk::ChunkPipeline,
    env::{PartitionFailurePolicy, StepEnv},
    step::{PartitionedStep, StepOutcome},
};
use futures::FutureExt;
use model::{
    error::BatchError,
    execution::{
        context::ExecutionContext, job::JobExecution, status::BatchStatus, step::StepExecution,
    },
};
use std::{panic::AssertUnwindSafe, sync::Arc};
use tokio::{sync::Semaphore, task::JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Runs every partition of `step` to a terminal status and folds the results
/// into `parent`.
///
/// `seeds` replaces the partitioner on restart: one context per partition,
/// in partition order.
pub async fn run_partitions(
    step: &PartitionedStep,
    job: &JobExecution,
    parent: &mut StepExecution,
    seeds: Vec<ExecutionContext>,
    env: &StepEnv,
    cancel: &CancellationToken,
) -> StepOutcome {
    let contexts = if seeds.is_empty() {
        match step
            .partitioner
            .partition(job, parent, step.partitions)
            .await
        {
            Ok(contexts) => contexts,
            Err(e) => return StepOutcome::Failed(e),
        }
    } else {
        seeds
    };

    info!(
        step = %parent.step_name,
        step_execution_id = %parent.id,
        partitions = contexts.len(),
        "Dispatching partitions"
    );

    let token = cancel.child_token();
    let semaphore = env
        .max_concurrent_partitions
        .map(|limit| Arc::new(Semaphore::new(limit.max(1))));
    let job = Arc::new(job.clone());

    let mut workers = JoinSet::new();
    for (index, context) in contexts.into_iter().enumerate() {
        let child = StepExecution::partition_of(parent, index, context);
        workers.spawn(run_partition(
            child,
            step.chunk.pipeline.clone(),
            Arc::clone(&job),
            env.clone(),
            token.clone(),
            semaphore.clone(),
        ));
    }

    let mut failure: Option<BatchError> = None;
    let mut stopped = false;
    while let Some(joined) = workers.join_next().await {
        let child = match joined {
            Ok(Ok(child)) => child,
            Ok(Err(e)) => {
                failure.get_or_insert(e);
                continue;
            }
            Err(e) => {
                failure.get_or_insert(BatchError::internal(format!(
                    "partition worker aborted: {e}"
                )));
                continue;
            }
        };

        parent.absorb(&child);
        match child.status() {
            BatchStatus::Completed => {}
            BatchStatus::Stopped => stopped = true,
            _ => {
                if failure.is_none() {
                    failure = Some(match child.failure() {
                        Some(detail) => detail.to_error(),
                        None => BatchError::internal(format!(
                            "partition {} ended as {}",
                            child.step_name,
                            child.status()
                        )),
                    });
                }
            }
        }
    }

    match failure {
        Some(e) => StepOutcome::Failed(e),
        None if stopped => StepOutcome::Stopped,
        None => StepOutcome::Completed,
    }
}

async fn run_partition(
    mut child: StepExecution,
    pipeline: Arc<dyn ChunkPipeline>,
    job: Arc<JobExecution>,
    env: StepEnv,
    token: CancellationToken,
    semaphore: Option<Arc<Semaphore>>,
) -> Result<StepExecution, BatchError> {
    let _permit = match semaphore {
        Some(semaphore) => Some(
            semaphore
                .acquire_owned()
                .await
                .map_err(|e| BatchError::internal(format!("partition limiter closed: {e}")))?,
        ),
        None => None,
    };

    env.state.begin_step(&mut child).await?;

    let outcome = if token.is_cancelled() {
        StepOutcome::Stopped
    } else {
        let result = AssertUnwindSafe(pipeline.run(&job, &mut child, &env, &token))
            .catch_unwind()
            .await;
        result.unwrap_or_else(|_| {
            error!(
                step = %child.step_name,
                step_execution_id = %child.id,
                "Partition worker panicked"
            );
            StepOutcome::Failed(BatchError::internal("partition worker panicked"))
        })
    };

    if matches!(outcome, StepOutcome::Failed(_))
        && env.partition_failure == PartitionFailurePolicy::FailFast
    {
        warn!(
            step = %child.step_name,
            partition = child.partition,
            "Partition failed, cancelling siblings"
        );
        token.cancel();
    }

    env.state.finish_step(&mut child, outcome).await?;
    Ok(child)
}
