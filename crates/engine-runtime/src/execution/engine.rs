use crate::{
    config::EngineConfig,
    execution::history::{PriorStep, prior_steps},
    job::Job,
    registry::JobRegistry,
};
use dashmap::DashMap;
use engine_core::{
    metrics::{Metrics, MetricsSnapshot},
    state::{StateStore, sled_store::SledStateStore},
    transaction::TransactionManager,
};
use engine_processing::{StepEnv, execute_step, state_manager::StateManager};
use futures::FutureExt;
use model::{
    core::identifiers::JobExecutionId,
    error::BatchError,
    execution::{
        job::JobExecution, params::JobParameters, status::BatchStatus, step::StepExecution,
    },
};
use std::{collections::HashMap, panic::AssertUnwindSafe, sync::Arc};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Runs registered jobs against one execution store.
///
/// Cheap to clone; clones share the registry, the store and the set of
/// running executions.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    registry: JobRegistry,
    store: Arc<dyn StateStore>,
    env: StepEnv,
    running: DashMap<JobExecutionId, CancellationToken>,
    /// Held while a restart is checked and recorded.
    restart_lock: Mutex<()>,
}

impl Engine {
    pub fn new(
        store: Arc<dyn StateStore>,
        transactions: Arc<dyn TransactionManager>,
        config: &EngineConfig,
    ) -> Self {
        let env = StepEnv::new(StateManager::new(store.clone(), transactions), Metrics::new())
            .with_partition_failure(config.partition_failure)
            .with_max_concurrent_partitions(config.max_concurrent_partitions);

        Self {
            inner: Arc::new(EngineInner {
                registry: JobRegistry::new(),
                store,
                env,
                running: DashMap::new(),
                restart_lock: Mutex::new(()),
            }),
        }
    }

    /// Opens the sled store under `config.state_dir`.
    pub fn open(config: EngineConfig) -> Result<Self, BatchError> {
        let store = Arc::new(
            SledStateStore::open(&config.state_dir)?.with_flush(config.flush_on_commit),
        );
        info!(state_dir = %config.state_dir.display(), "Execution store opened");
        Ok(Self::new(store.clone(), store, &config))
    }

    /// Engine over a throwaway in-memory store.
    pub fn temporary(config: EngineConfig) -> Result<Self, BatchError> {
        let store = Arc::new(SledStateStore::temporary()?);
        Ok(Self::new(store.clone(), store, &config))
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.inner.registry
    }

    pub fn register(&self, job: Job) -> Result<(), BatchError> {
        self.inner.registry.register(job)
    }

    /// Runs `job_name` to a terminal status.
    ///
    /// Returns the completed execution, or the error that failed or stopped it.
    pub async fn start(
        &self,
        cancel: &CancellationToken,
        job_name: &str,
        parameters: JobParameters,
    ) -> Result<JobExecution, BatchError> {
        let job = self.inner.registry.lookup(job_name)?;
        let execution = JobExecution::new(job_name, parameters);
        self.inner.store.save_job_execution(&execution).await?;

        let execution = self.run(&job, execution, HashMap::new(), cancel).await?;
        outcome(execution)
    }

    /// Schedules `job_name` on a background task and returns its execution id.
    ///
    /// Only configuration and persistence errors come back from here; the
    /// outcome of the run itself is recorded on the job execution.
    pub async fn start_async(
        &self,
        cancel: &CancellationToken,
        job_name: &str,
        parameters: JobParameters,
    ) -> Result<JobExecutionId, BatchError> {
        let job = self.inner.registry.lookup(job_name)?;
        let execution = JobExecution::new(job_name, parameters);
        self.inner.store.save_job_execution(&execution).await?;

        let id = execution.id.clone();
        self.spawn(job, execution, HashMap::new(), cancel.clone());
        Ok(id)
    }

    /// Runs a failed or stopped execution again as a new job execution.
    ///
    /// Completed steps are skipped; the others resume from their last
    /// committed execution context.
    pub async fn restart(
        &self,
        cancel: &CancellationToken,
        job_execution_id: &JobExecutionId,
    ) -> Result<JobExecution, BatchError> {
        let (job, execution, prior) = self.prepare_restart(job_execution_id).await?;
        let execution = self.run(&job, execution, prior, cancel).await?;
        outcome(execution)
    }

    /// Background variant of [`Engine::restart`].
    pub async fn restart_async(
        &self,
        cancel: &CancellationToken,
        job_execution_id: &JobExecutionId,
    ) -> Result<JobExecutionId, BatchError> {
        let (job, execution, prior) = self.prepare_restart(job_execution_id).await?;
        let id = execution.id.clone();
        self.spawn(job, execution, prior, cancel.clone());
        Ok(id)
    }

    /// Requests a running execution to stop at its next chunk boundary.
    /// Returns `false` if the execution is not running in this engine.
    pub fn stop(&self, job_execution_id: &JobExecutionId) -> bool {
        match self.inner.running.get(job_execution_id) {
            Some(token) => {
                info!(job_execution_id = %job_execution_id, "Stop requested");
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self, job_execution_id: &JobExecutionId) -> bool {
        self.inner.running.contains_key(job_execution_id)
    }

    pub async fn job_execution(
        &self,
        id: &JobExecutionId,
    ) -> Result<Option<JobExecution>, BatchError> {
        self.inner.store.load_job_execution(id).await
    }

    pub async fn job_executions(&self, job_name: &str) -> Result<Vec<JobExecution>, BatchError> {
        self.inner.store.job_executions(job_name).await
    }

    pub async fn step_executions(
        &self,
        job_execution_id: &JobExecutionId,
    ) -> Result<Vec<StepExecution>, BatchError> {
        self.inner.store.step_executions(job_execution_id).await
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.env.metrics.snapshot()
    }

    async fn prepare_restart(
        &self,
        job_execution_id: &JobExecutionId,
    ) -> Result<(Arc<Job>, JobExecution, HashMap<String, PriorStep>), BatchError> {
        let previous = self
            .inner
            .store
            .load_job_execution(job_execution_id)
            .await?
            .ok_or_else(|| {
                BatchError::configuration(format!("no job execution {job_execution_id}"))
            })?;

        if previous.status() == BatchStatus::Completed {
            return Err(BatchError::configuration(format!(
                "job execution {job_execution_id} already completed"
            )));
        }
        if self.is_running(job_execution_id) {
            return Err(BatchError::configuration(format!(
                "job execution {job_execution_id} is still running"
            )));
        }

        let job = self.inner.registry.lookup(&previous.job_name)?;

        let _guard = self.inner.restart_lock.lock().await;
        let successor = self
            .inner
            .store
            .job_executions(&previous.job_name)
            .await?
            .into_iter()
            .find(|e| e.restart_of.as_ref() == Some(job_execution_id));
        if let Some(successor) = successor {
            return Err(BatchError::configuration(format!(
                "job execution {job_execution_id} was already restarted as {}",
                successor.id
            )));
        }

        let prior = prior_steps(self.inner.store.as_ref(), &previous).await?;

        let execution = JobExecution::restart_of(&previous);
        self.inner.store.save_job_execution(&execution).await?;
        info!(
            job = %job.name(),
            job_execution_id = %execution.id,
            restart_of = %previous.id,
            "Restarting job"
        );
        Ok((job, execution, prior))
    }

    fn spawn(
        &self,
        job: Arc<Job>,
        execution: JobExecution,
        prior: HashMap<String, PriorStep>,
        cancel: CancellationToken,
    ) {
        let engine = self.clone();
        tokio::spawn(async move {
            let id = execution.id.clone();
            match engine.run(&job, execution, prior, &cancel).await {
                Ok(execution) => {
                    info!(job_execution_id = %id, status = %execution.status(), "Background run finished");
                }
                Err(e) => {
                    error!(job_execution_id = %id, error = %e, "Background run aborted");
                }
            }
        });
    }

    async fn record_panic(&self, id: &JobExecutionId) {
        let store = &self.inner.store;
        let Ok(Some(mut execution)) = store.load_job_execution(id).await else {
            return;
        };
        if execution.status().is_terminal() {
            return;
        }

        let detail = BatchError::internal("job execution panicked").detail();
        match store.step_executions(id).await {
            Ok(steps) => {
                for mut step in steps.into_iter().filter(|s| s.status().is_running()) {
                    if step.fail(detail.clone()).is_ok() {
                        if let Err(e) = store.save_step_execution(&step).await {
                            warn!(step_execution_id = %step.id, error = %e, "Failed to record panicked step");
                        }
                    }
                }
            }
            Err(e) => warn!(job_execution_id = %id, error = %e, "Failed to load steps of panicked job"),
        }
        if execution.fail(detail).is_ok() {
            if let Err(e) = store.save_job_execution(&execution).await {
                warn!(job_execution_id = %id, error = %e, "Failed to record panicked job");
            }
        }
    }

    /// Drives a persisted CREATED execution through its steps.
    ///
    /// `Err` means the execution could not be recorded; step failures end up
    /// on the returned execution.
    async fn run(
        &self,
        job: &Job,
        mut execution: JobExecution,
        prior: HashMap<String, PriorStep>,
        cancel: &CancellationToken,
    ) -> Result<JobExecution, BatchError> {
        let store = &self.inner.store;
        let token = cancel.child_token();
        self.inner
            .running
            .insert(execution.id.clone(), token.clone());

        let result = AssertUnwindSafe(async {
            execution.transition(BatchStatus::Starting)?;
            store.save_job_execution(&execution).await?;
            execution.transition(BatchStatus::Started)?;
            store.save_job_execution(&execution).await?;
            info!(
                job = %job.name(),
                job_execution_id = %execution.id,
                "Job started"
            );

            let status = self.run_steps(job, &execution, &prior, &token).await?;
            match status {
                StepsEnded::Completed => execution.transition(BatchStatus::Completed)?,
                StepsEnded::Stopped => execution.transition(BatchStatus::Stopped)?,
                StepsEnded::Failed(detail) => execution.fail(detail)?,
            }
            store.save_job_execution(&execution).await
        })
        .catch_unwind()
        .await;

        self.inner.running.remove(&execution.id);

        let Ok(result) = result else {
            error!(
                job = %job.name(),
                job_execution_id = %execution.id,
                "Job execution panicked"
            );
            self.record_panic(&execution.id).await;
            return Err(BatchError::internal(format!(
                "job execution {} panicked",
                execution.id
            )));
        };

        if let Err(e) = result {
            error!(
                job = %job.name(),
                job_execution_id = %execution.id,
                error = %e,
                "Job execution could not be recorded"
            );
            if !execution.status().is_terminal() && execution.fail(e.detail()).is_ok() {
                if let Err(save) = store.save_job_execution(&execution).await {
                    warn!(job_execution_id = %execution.id, error = %save, "Failed to record job failure");
                }
            }
            return Err(e);
        }

        match execution.status() {
            BatchStatus::Completed => info!(
                job = %job.name(),
                job_execution_id = %execution.id,
                "Job completed"
            ),
            status => warn!(
                job = %job.name(),
                job_execution_id = %execution.id,
                status = %status,
                "Job ended"
            ),
        }
        Ok(execution)
    }

    async fn run_steps(
        &self,
        job: &Job,
        execution: &JobExecution,
        prior: &HashMap<String, PriorStep>,
        cancel: &CancellationToken,
    ) -> Result<StepsEnded, BatchError> {
        for step in job.steps() {
            let previous = prior.get(step.name());
            if previous.is_some_and(PriorStep::is_completed) {
                info!(
                    job_execution_id = %execution.id,
                    step = %step.name(),
                    "Step already completed, skipping"
                );
                continue;
            }

            if cancel.is_cancelled() {
                return Ok(StepsEnded::Stopped);
            }

            let mut step_execution = StepExecution::new(execution.id.clone(), step.name());
            let mut seeds = Vec::new();
            if let Some(previous) = previous {
                if step.is_partitioned() {
                    seeds = previous.partition_seeds();
                } else {
                    step_execution.set_context(previous.execution.context().clone());
                }
            }

            let finished = execute_step(
                step,
                execution,
                step_execution,
                seeds,
                &self.inner.env,
                cancel,
            )
            .await?;

            match finished.status() {
                BatchStatus::Completed => continue,
                BatchStatus::Stopped => return Ok(StepsEnded::Stopped),
                _ => {
                    let detail = finished.failure().cloned().unwrap_or_else(|| {
                        BatchError::internal(format!("step {} did not complete", step.name()))
                            .detail()
                    });
                    return Ok(StepsEnded::Failed(detail));
                }
            }
        }

        Ok(StepsEnded::Completed)
    }
}

enum StepsEnded {
    Completed,
    Stopped,
    Failed(model::error::FailureDetail),
}

fn outcome(execution: JobExecution) -> Result<JobExecution, BatchError> {
    match execution.status() {
        BatchStatus::Completed => Ok(execution),
        BatchStatus::Stopped => Err(BatchError::stopped(format!(
            "job execution {} was stopped",
            execution.id
        ))),
        _ => Err(execution
            .failure()
            .map(|f| f.to_error())
            .unwrap_or_else(|| {
                BatchError::internal(format!("job execution {} failed", execution.id))
            })),
    }
}
