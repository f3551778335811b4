use engine_core::state::StateStore;
use model::{
    error::BatchError,
    execution::{
        context::ExecutionContext, job::JobExecution, status::BatchStatus, step::StepExecution,
    },
};
use std::collections::HashMap;

/// The most recent run of one step across a restart chain.
pub(crate) struct PriorStep {
    pub execution: StepExecution,
    pub partitions: Vec<StepExecution>,
}

impl PriorStep {
    pub fn is_completed(&self) -> bool {
        self.execution.status() == BatchStatus::Completed
    }

    /// Contexts the next run of a partitioned step resumes from, by index.
    pub fn partition_seeds(&self) -> Vec<ExecutionContext> {
        let mut partitions: Vec<&StepExecution> = self.partitions.iter().collect();
        partitions.sort_by_key(|p| p.partition);
        partitions.iter().map(|p| p.context().clone()).collect()
    }
}

/// Walks `restart_of` links back from `latest` and keeps, per step name, the
/// newest step execution found.
pub(crate) async fn prior_steps(
    store: &dyn StateStore,
    latest: &JobExecution,
) -> Result<HashMap<String, PriorStep>, BatchError> {
    let mut found: HashMap<String, PriorStep> = HashMap::new();
    let mut cursor = Some(latest.clone());

    while let Some(execution) = cursor {
        let steps = store.step_executions(&execution.id).await?;
        let (parents, children): (Vec<_>, Vec<_>) =
            steps.into_iter().partition(|s| !s.is_partition());

        for parent in parents {
            if found.contains_key(&parent.step_name) {
                continue;
            }
            let partitions = children
                .iter()
                .filter(|c| c.parent_id.as_ref() == Some(&parent.id))
                .cloned()
                .collect();
            found.insert(
                parent.step_name.clone(),
                PriorStep {
                    execution: parent,
                    partitions,
                },
            );
        }

        cursor = match &execution.restart_of {
            Some(previous) => store.load_job_execution(previous).await?,
            None => None,
        };
    }

    Ok(found)
}
