//! Collaborators shared by the unit tests of this crate.

use crate::{env::StepEnv, state_manager::StateManager};
use async_trait::async_trait;
use engine_core::{
    context::ChunkContext,
    item::{ItemProcessor, ItemReader, ItemWriter},
    metrics::Metrics,
    partition::{PARTITION_END_KEY, PARTITION_START_KEY},
    state::sled_store::SledStateStore,
};
use model::{
    error::BatchError,
    execution::{job::JobExecution, params::JobParameters, status::BatchStatus},
};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

pub const READ_NUM: &str = "read.num";

pub fn env() -> (StepEnv, Arc<SledStateStore>) {
    let store = Arc::new(SledStateStore::temporary().unwrap());
    let state = StateManager::new(store.clone(), store.clone());
    (StepEnv::new(state, Metrics::new()), store)
}

pub fn started_job() -> JobExecution {
    let mut job = JobExecution::new("test-job", JobParameters::new());
    job.transition(BatchStatus::Starting).unwrap();
    job.transition(BatchStatus::Started).unwrap();
    job
}

/// Emits `value-{n}` for n in the assigned range, cursor in `read.num`.
pub struct RangeReader {
    total: u64,
}

impl RangeReader {
    pub fn new(total: u64) -> Self {
        Self { total }
    }
}

#[async_trait]
impl ItemReader for RangeReader {
    type Item = String;

    async fn read(&self, ctx: &mut ChunkContext<'_>) -> Result<Option<String>, BatchError> {
        let start = ctx.context().get_int(PARTITION_START_KEY, 0);
        let end = ctx.context().get_int(PARTITION_END_KEY, self.total as i64);
        let next = ctx.context().get_int(READ_NUM, start);
        if next >= end {
            return Ok(None);
        }
        ctx.context_mut().put(READ_NUM, next + 1);
        Ok(Some(format!("value-{next}")))
    }
}

/// Drops items with an odd number.
pub struct SkipOdd;

#[async_trait]
impl ItemProcessor for SkipOdd {
    type Input = String;
    type Output = String;

    async fn process(
        &self,
        item: String,
        _ctx: &mut ChunkContext<'_>,
    ) -> Result<Option<String>, BatchError> {
        let n: u64 = item
            .trim_start_matches("value-")
            .parse()
            .map_err(|e| BatchError::process_with(format!("bad item {item}"), e))?;
        Ok((n % 2 == 0).then_some(item))
    }
}

/// Records every chunk it is handed. Can be told to fail or panic.
#[derive(Clone, Default)]
pub struct CollectingWriter {
    pub chunks: Arc<Mutex<Vec<Vec<String>>>>,
    fail_on_chunk: Option<u64>,
    fail_partition: Option<usize>,
    panic_partition: Option<usize>,
    cancel_after_chunk: Option<(u64, CancellationToken)>,
}

impl CollectingWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on_chunk(mut self, chunk: u64) -> Self {
        self.fail_on_chunk = Some(chunk);
        self
    }

    pub fn failing_partition(mut self, partition: usize) -> Self {
        self.fail_partition = Some(partition);
        self
    }

    pub fn panicking_partition(mut self, partition: usize) -> Self {
        self.panic_partition = Some(partition);
        self
    }

    pub fn cancelling_after(mut self, chunk: u64, token: CancellationToken) -> Self {
        self.cancel_after_chunk = Some((chunk, token));
        self
    }

    pub fn sizes(&self) -> Vec<usize> {
        self.chunks.lock().unwrap().iter().map(Vec::len).collect()
    }

    pub fn items(&self) -> Vec<String> {
        self.chunks.lock().unwrap().concat()
    }
}

#[async_trait]
impl ItemWriter for CollectingWriter {
    type Item = String;

    async fn write(&self, items: &[String], ctx: &mut ChunkContext<'_>) -> Result<(), BatchError> {
        if ctx.transaction().is_none() {
            return Err(BatchError::internal("write outside of a transaction"));
        }
        let partition = ctx.step_execution().partition;
        if partition.is_some() && partition == self.panic_partition {
            panic!("writer blew up");
        }
        let partition_matches = self.fail_partition.is_none() || partition == self.fail_partition;
        if partition_matches && self.fail_on_chunk == Some(ctx.chunk()) {
            return Err(BatchError::write(format!("chunk {} rejected", ctx.chunk())));
        }

        self.chunks.lock().unwrap().push(items.to_vec());
        if let Some((chunk, token)) = &self.cancel_after_chunk {
            if *chunk == ctx.chunk() {
                token.cancel();
            }
        }
        Ok(())
    }
}
