use super::{NumberReader, READ_NUM, SharedWriter};
use crate::{Engine, EngineConfig, JobBuilder};
use async_trait::async_trait;
use engine_core::{
    state::{StateStore, sled_store::SledStateStore},
    transaction::Transaction,
};
use engine_processing::StepBuilder;
use model::{
    core::identifiers::{JobExecutionId, StepExecutionId},
    error::{BatchError, ErrorCode},
    execution::{
        context::ExecutionContext, job::JobExecution, params::JobParameters,
        status::BatchStatus, step::StepExecution,
    },
};
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};
use tokio_util::sync::CancellationToken;
use tracing_test::traced_test;

fn engine() -> Engine {
    Engine::temporary(EngineConfig::default()).unwrap()
}

fn counting_step(name: &str, counter: &Arc<AtomicUsize>) -> engine_processing::Step {
    let counter = Arc::clone(counter);
    StepBuilder::new(name)
        .handler_fn(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .build()
        .unwrap()
}

async fn wait_terminal(engine: &Engine, id: &JobExecutionId) -> JobExecution {
    for _ in 0..500 {
        if let Some(execution) = engine.job_execution(id).await.unwrap() {
            if execution.status().is_terminal() && !engine.is_running(id) {
                return execution;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job execution {id} never finished");
}

#[tokio::test]
async fn failing_step_skips_the_rest() {
    let engine = engine();
    let c_runs = Arc::new(AtomicUsize::new(0));
    let job = JobBuilder::new("abc")
        .step(StepBuilder::new("a").handler_fn(|| Ok(())).build().unwrap())
        .step(
            StepBuilder::new("b")
                .handler_fn(|| Err(BatchError::process("b broke")))
                .build()
                .unwrap(),
        )
        .step(counting_step("c", &c_runs))
        .build()
        .unwrap();
    engine.register(job).unwrap();

    let err = engine
        .start(&CancellationToken::new(), "abc", JobParameters::new())
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Process);
    assert_eq!(c_runs.load(Ordering::SeqCst), 0);

    let execution = engine.job_executions("abc").await.unwrap().pop().unwrap();
    assert_eq!(execution.status(), BatchStatus::Failed);

    let steps = engine.step_executions(&execution.id).await.unwrap();
    let names: Vec<_> = steps.iter().map(|s| s.step_name.as_str()).collect();
    assert_eq!(names, vec!["a", "b"]);
    assert_eq!(steps[0].status(), BatchStatus::Completed);
    assert_eq!(steps[1].status(), BatchStatus::Failed);
}

#[tokio::test]
async fn unknown_job_is_a_configuration_error() {
    let engine = engine();
    let err = engine
        .start(&CancellationToken::new(), "missing", JobParameters::new())
        .await
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::Configuration);
    assert!(engine.job_executions("missing").await.unwrap().is_empty());
}

#[tokio::test]
async fn async_start_records_outcome() {
    let engine = engine();
    let writer = SharedWriter::default();
    let job = JobBuilder::new("load")
        .step(
            StepBuilder::new("numbers")
                .reader(NumberReader { total: 100 })
                .writer(writer.clone())
                .chunk_size(10)
                .build()
                .unwrap(),
        )
        .build()
        .unwrap();
    engine.register(job).unwrap();

    let id = engine
        .start_async(&CancellationToken::new(), "load", JobParameters::new())
        .await
        .unwrap();
    let execution = wait_terminal(&engine, &id).await;

    assert_eq!(execution.status(), BatchStatus::Completed);
    assert_eq!(writer.items().len(), 100);

    let step = engine.step_executions(&id).await.unwrap().pop().unwrap();
    assert_eq!(step.context().get_int(READ_NUM, 0), 100);
    assert_eq!(engine.metrics().items_written, 100);
}

#[tokio::test]
async fn restart_resumes_after_last_commit() {
    let engine = engine();
    let prepare_runs = Arc::new(AtomicUsize::new(0));
    let writer = SharedWriter::failing_on_call(4);
    let job = JobBuilder::new("load")
        .step(counting_step("prepare", &prepare_runs))
        .step(
            StepBuilder::new("numbers")
                .reader(NumberReader { total: 100 })
                .writer(writer.clone())
                .chunk_size(10)
                .build()
                .unwrap(),
        )
        .build()
        .unwrap();
    engine.register(job).unwrap();

    let cancel = CancellationToken::new();
    let err = engine
        .start(&cancel, "load", JobParameters::new().with("date", "2024-03-01"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Write);
    assert_eq!(writer.items().len(), 30);

    let failed = engine.job_executions("load").await.unwrap().pop().unwrap();
    let restarted = engine.restart(&cancel, &failed.id).await.unwrap();

    assert_eq!(restarted.status(), BatchStatus::Completed);
    assert_eq!(restarted.restart_of.as_ref(), Some(&failed.id));
    assert_eq!(restarted.parameters, failed.parameters);
    assert_eq!(prepare_runs.load(Ordering::SeqCst), 1);

    let items = writer.items();
    assert_eq!(items.len(), 100);
    assert_eq!(items[30], "value-30");

    let steps = engine.step_executions(&restarted.id).await.unwrap();
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0].read_count(), 70);

    let err = engine.restart(&cancel, &restarted.id).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::Configuration);
}

#[tokio::test]
async fn stop_ends_the_run_stopped() {
    let engine = engine();
    let writer = SharedWriter::slow(Duration::from_millis(20));
    let job = JobBuilder::new("slow")
        .step(
            StepBuilder::new("numbers")
                .reader(NumberReader { total: 10_000 })
                .writer(writer.clone())
                .chunk_size(10)
                .build()
                .unwrap(),
        )
        .build()
        .unwrap();
    engine.register(job).unwrap();

    let id = engine
        .start_async(&CancellationToken::new(), "slow", JobParameters::new())
        .await
        .unwrap();
    while !engine.is_running(&id) {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    assert!(engine.stop(&id));

    let execution = wait_terminal(&engine, &id).await;
    assert_eq!(execution.status(), BatchStatus::Stopped);
    assert!(writer.items().len() < 10_000);
    assert!(!engine.stop(&id));

    let step = engine.step_executions(&id).await.unwrap().pop().unwrap();
    assert_eq!(step.status(), BatchStatus::Stopped);
    assert_eq!(
        step.context().get_int(READ_NUM, 0) as u64,
        step.write_count()
    );
}

#[tokio::test]
async fn panicking_background_run_is_marked_failed() {
    let engine = engine();
    let job = JobBuilder::new("explodes")
        .step(
            StepBuilder::new("boom")
                .handler_fn(|| -> Result<(), BatchError> { panic!("tasklet blew up") })
                .build()
                .unwrap(),
        )
        .build()
        .unwrap();
    engine.register(job).unwrap();

    let id = engine
        .start_async(&CancellationToken::new(), "explodes", JobParameters::new())
        .await
        .unwrap();
    let execution = wait_terminal(&engine, &id).await;

    assert_eq!(execution.status(), BatchStatus::Failed);
    assert_eq!(execution.failure().map(|f| f.code), Some(ErrorCode::Internal));

    let step = engine.step_executions(&id).await.unwrap().pop().unwrap();
    assert_eq!(step.status(), BatchStatus::Failed);
}

#[tokio::test]
async fn restarted_execution_cannot_be_restarted_again() {
    let engine = engine();
    let writer = SharedWriter::failing_on_call(4);
    let job = JobBuilder::new("load")
        .step(
            StepBuilder::new("numbers")
                .reader(NumberReader { total: 100 })
                .writer(writer.clone())
                .chunk_size(10)
                .build()
                .unwrap(),
        )
        .build()
        .unwrap();
    engine.register(job).unwrap();

    let cancel = CancellationToken::new();
    engine
        .start(&cancel, "load", JobParameters::new())
        .await
        .unwrap_err();
    let failed = engine.job_executions("load").await.unwrap().pop().unwrap();
    engine.restart(&cancel, &failed.id).await.unwrap();

    let err = engine.restart(&cancel, &failed.id).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::Configuration);
    let err = engine.restart_async(&cancel, &failed.id).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::Configuration);

    let mut items = writer.items();
    assert_eq!(items.len(), 100);
    items.sort();
    items.dedup();
    assert_eq!(items.len(), 100);
    assert_eq!(engine.job_executions("load").await.unwrap().len(), 2);
}

#[tokio::test]
async fn concurrent_restarts_admit_one_successor() {
    let engine = engine();
    let job = JobBuilder::new("flaky")
        .step(
            StepBuilder::new("once")
                .handler_fn(|| Err(BatchError::process("not yet")))
                .build()
                .unwrap(),
        )
        .build()
        .unwrap();
    engine.register(job).unwrap();

    let cancel = CancellationToken::new();
    engine
        .start(&cancel, "flaky", JobParameters::new())
        .await
        .unwrap_err();
    let failed = engine.job_executions("flaky").await.unwrap().pop().unwrap();

    let (a, b) = tokio::join!(
        engine.restart_async(&cancel, &failed.id),
        engine.restart_async(&cancel, &failed.id)
    );
    assert!(a.is_ok() != b.is_ok());
    let successor = a.or(b).unwrap();
    wait_terminal(&engine, &successor).await;

    let successors = engine
        .job_executions("flaky")
        .await
        .unwrap()
        .into_iter()
        .filter(|e| e.restart_of.as_ref() == Some(&failed.id))
        .count();
    assert_eq!(successors, 1);
}

#[tokio::test]
async fn panicking_run_fails_and_releases_the_execution() {
    let engine = engine();
    let panicked = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&panicked);
    let job = JobBuilder::new("explodes-once")
        .step(
            StepBuilder::new("boom")
                .handler_fn(move || {
                    if !flag.swap(true, Ordering::SeqCst) {
                        panic!("tasklet blew up");
                    }
                    Ok(())
                })
                .build()
                .unwrap(),
        )
        .build()
        .unwrap();
    engine.register(job).unwrap();

    let cancel = CancellationToken::new();
    let err = engine
        .start(&cancel, "explodes-once", JobParameters::new())
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Internal);

    let execution = engine
        .job_executions("explodes-once")
        .await
        .unwrap()
        .pop()
        .unwrap();
    assert_eq!(execution.status(), BatchStatus::Failed);
    assert!(!engine.is_running(&execution.id));

    let step = engine.step_executions(&execution.id).await.unwrap().pop().unwrap();
    assert_eq!(step.status(), BatchStatus::Failed);

    let restarted = engine.restart(&cancel, &execution.id).await.unwrap();
    assert_eq!(restarted.status(), BatchStatus::Completed);
}

/// Store whose job rows stop saving once a run reaches STARTED.
struct BrokenAfterStart {
    inner: SledStateStore,
    broken: AtomicBool,
}

#[async_trait]
impl StateStore for BrokenAfterStart {
    async fn save_job_execution(&self, execution: &JobExecution) -> Result<(), BatchError> {
        if execution.status() == BatchStatus::Started {
            self.broken.store(true, Ordering::SeqCst);
        }
        if self.broken.load(Ordering::SeqCst) {
            return Err(BatchError::persistence("disk full"));
        }
        self.inner.save_job_execution(execution).await
    }

    async fn load_job_execution(
        &self,
        id: &JobExecutionId,
    ) -> Result<Option<JobExecution>, BatchError> {
        self.inner.load_job_execution(id).await
    }

    async fn job_executions(&self, job_name: &str) -> Result<Vec<JobExecution>, BatchError> {
        self.inner.job_executions(job_name).await
    }

    async fn save_step_execution(&self, execution: &StepExecution) -> Result<(), BatchError> {
        self.inner.save_step_execution(execution).await
    }

    fn stage_step_execution(
        &self,
        tx: &mut dyn Transaction,
        execution: &StepExecution,
    ) -> Result<(), BatchError> {
        self.inner.stage_step_execution(tx, execution)
    }

    async fn load_step_execution(
        &self,
        id: &StepExecutionId,
    ) -> Result<Option<StepExecution>, BatchError> {
        self.inner.load_step_execution(id).await
    }

    async fn step_executions(
        &self,
        job_execution_id: &JobExecutionId,
    ) -> Result<Vec<StepExecution>, BatchError> {
        self.inner.step_executions(job_execution_id).await
    }

    async fn save_context(
        &self,
        id: &StepExecutionId,
        context: &ExecutionContext,
    ) -> Result<(), BatchError> {
        self.inner.save_context(id, context).await
    }

    async fn load_context(&self, id: &StepExecutionId) -> Result<ExecutionContext, BatchError> {
        self.inner.load_context(id).await
    }
}

#[traced_test]
#[tokio::test]
async fn unrecordable_failure_is_logged() {
    let sled = Arc::new(SledStateStore::temporary().unwrap());
    let store = Arc::new(BrokenAfterStart {
        inner: SledStateStore::clone(&sled),
        broken: AtomicBool::new(false),
    });
    let engine = Engine::new(store, sled, &EngineConfig::default());
    let job = JobBuilder::new("noop")
        .step(StepBuilder::new("a").handler_fn(|| Ok(())).build().unwrap())
        .build()
        .unwrap();
    engine.register(job).unwrap();

    let err = engine
        .start(&CancellationToken::new(), "noop", JobParameters::new())
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Persistence);

    let execution = engine.job_executions("noop").await.unwrap().pop().unwrap();
    assert_eq!(execution.status(), BatchStatus::Starting);
    assert!(!engine.is_running(&execution.id));
    assert!(logs_contain("Failed to record job failure"));
}
