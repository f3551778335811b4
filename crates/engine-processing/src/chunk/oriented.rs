use crate::{chunk::ChunkPipeline, env::StepEnv, step::StepOutcome};
use async_trait::async_trait;
use engine_core::{
    context::ChunkContext,
    item::{ItemProcessor, ItemReader, ItemWriter},
    transaction::Transaction,
};
use model::{
    error::BatchError,
    execution::{
        job::JobExecution,
        step::{ChunkCounts, StepExecution},
    },
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Result of one chunk iteration.
enum ChunkStatus {
    /// Chunk committed, more input may follow.
    Continue,
    /// Input exhausted; the last chunk (if any) is committed.
    Finished,
}

/// A chunk that was written but not yet committed.
struct WrittenChunk {
    tx: Box<dyn Transaction>,
    counts: ChunkCounts,
    exhausted: bool,
}

/// Reader, optional processor and optional writer driven in chunks.
pub struct ChunkOrientedStep<I, O>
where
    I: Send + 'static,
    O: Send + Sync + 'static,
{
    reader: Arc<dyn ItemReader<Item = I>>,
    processor: Arc<dyn ItemProcessor<Input = I, Output = O>>,
    writer: Option<Arc<dyn ItemWriter<Item = O>>>,
    chunk_size: usize,
}

impl<I, O> ChunkOrientedStep<I, O>
where
    I: Send + 'static,
    O: Send + Sync + 'static,
{
    pub fn new(
        reader: Arc<dyn ItemReader<Item = I>>,
        processor: Arc<dyn ItemProcessor<Input = I, Output = O>>,
        writer: Option<Arc<dyn ItemWriter<Item = O>>>,
        chunk_size: usize,
    ) -> Self {
        Self {
            reader,
            processor,
            writer,
            chunk_size,
        }
    }

    async fn open(
        &self,
        job: &JobExecution,
        execution: &mut StepExecution,
    ) -> Result<(), BatchError> {
        let mut ctx = ChunkContext::new(job, execution, 0);
        self.reader.open(&mut ctx).await?;
        if let Some(writer) = &self.writer {
            writer.open(&mut ctx).await?;
        }
        Ok(())
    }

    async fn close(
        &self,
        job: &JobExecution,
        execution: &mut StepExecution,
        stopped: bool,
    ) -> Result<(), BatchError> {
        let mut ctx = ChunkContext::new(job, execution, 0);
        if stopped {
            ctx.mark_stopped();
        }
        self.reader.close(&mut ctx).await?;
        if let Some(writer) = &self.writer {
            writer.close(&mut ctx).await?;
        }
        Ok(())
    }

    /// Reads up to one chunk, processes it and hands it to the writer inside
    /// a fresh transaction. `None` means the reader had nothing left.
    async fn write_chunk(
        &self,
        job: &JobExecution,
        execution: &mut StepExecution,
        env: &StepEnv,
        chunk: u64,
    ) -> Result<Option<WrittenChunk>, BatchError> {
        let mut ctx = ChunkContext::new(job, execution, chunk);

        let mut items = Vec::with_capacity(self.chunk_size);
        let mut exhausted = false;
        while items.len() < self.chunk_size {
            match self.reader.read(&mut ctx).await? {
                Some(item) => items.push(item),
                None => {
                    exhausted = true;
                    break;
                }
            }
        }

        if items.is_empty() {
            return Ok(None);
        }

        let read = items.len() as u64;
        let mut outputs = Vec::with_capacity(items.len());
        for item in items {
            if let Some(out) = self.processor.process(item, &mut ctx).await? {
                outputs.push(out);
            }
        }
        let counts = ChunkCounts {
            read,
            written: outputs.len() as u64,
            filtered: read - outputs.len() as u64,
        };

        ctx.attach_transaction(env.state.begin_chunk().await?);
        let written = match &self.writer {
            Some(writer) if !outputs.is_empty() => writer.write(&outputs, &mut ctx).await,
            _ => Ok(()),
        };

        let tx = ctx
            .detach_transaction()
            .ok_or_else(|| BatchError::internal("chunk transaction went missing"))?;

        if let Err(e) = written {
            env.state.rollback(tx).await;
            return Err(e);
        }

        Ok(Some(WrittenChunk {
            tx,
            counts,
            exhausted,
        }))
    }

    async fn run_chunk(
        &self,
        job: &JobExecution,
        execution: &mut StepExecution,
        env: &StepEnv,
        chunk: u64,
    ) -> Result<ChunkStatus, BatchError> {
        let checkpoint = execution.context().clone();

        let written = match self.write_chunk(job, execution, env, chunk).await {
            Ok(Some(written)) => written,
            Ok(None) => return Ok(ChunkStatus::Finished),
            Err(e) => {
                env.metrics.increment_rollbacks();
                execution.set_context(checkpoint);
                return Err(e);
            }
        };

        let WrittenChunk {
            tx,
            counts,
            exhausted,
        } = written;

        let mut staged = execution.clone();
        let committed = match staged.record_chunk(counts) {
            Ok(()) => env.state.commit_chunk(tx, &staged).await,
            Err(e) => {
                env.state.rollback(tx).await;
                Err(e)
            }
        };
        if let Err(e) = committed {
            env.metrics.increment_rollbacks();
            execution.set_context(checkpoint);
            return Err(e);
        }

        *execution = staged;
        env.metrics
            .record_commit(counts.read, counts.written, counts.filtered);
        debug!(
            step = %execution.step_name,
            step_execution_id = %execution.id,
            chunk,
            items = counts.read,
            written = counts.written,
            "Chunk committed"
        );

        Ok(if exhausted {
            ChunkStatus::Finished
        } else {
            ChunkStatus::Continue
        })
    }
}

#[async_trait]
impl<I, O> ChunkPipeline for ChunkOrientedStep<I, O>
where
    I: Send + 'static,
    O: Send + Sync + 'static,
{
    fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    async fn run(
        &self,
        job: &JobExecution,
        execution: &mut StepExecution,
        env: &StepEnv,
        cancel: &CancellationToken,
    ) -> StepOutcome {
        if let Err(e) = self.open(job, execution).await {
            return StepOutcome::Failed(e);
        }

        let mut chunk = 0u64;
        let stopped = loop {
            if cancel.is_cancelled() {
                info!(
                    step = %execution.step_name,
                    step_execution_id = %execution.id,
                    chunk,
                    "Cancellation requested. Stopping step."
                );
                break true;
            }

            chunk += 1;
            match self.run_chunk(job, execution, env, chunk).await {
                Ok(ChunkStatus::Continue) => continue,
                Ok(ChunkStatus::Finished) => break false,
                Err(e) => {
                    warn!(
                        step = %execution.step_name,
                        step_execution_id = %execution.id,
                        chunk,
                        error = %e,
                        "Chunk rolled back"
                    );
                    return StepOutcome::Failed(e);
                }
            }
        };

        if let Err(e) = self.close(job, execution, stopped).await {
            return StepOutcome::Failed(e);
        }

        if stopped {
            StepOutcome::Stopped
        } else {
            StepOutcome::Completed
        }
    }
}
