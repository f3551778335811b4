use crate::{
    chunk::ChunkOrientedStep,
    step::{ChunkStep, DEFAULT_CHUNK_SIZE, PartitionedStep, Step, StepKind},
};
use engine_core::{
    item::{ItemProcessor, ItemReader, ItemWriter, PassThrough},
    partition::Partitioner,
    tasklet::{FnTasklet, Tasklet},
};
use model::error::BatchError;
use std::sync::Arc;

/// Entry point for defining a step.
///
/// ```ignore
/// let step = StepBuilder::new("load")
///     .reader(reader)
///     .processor(processor)
///     .writer(writer)
///     .chunk_size(100)
///     .build()?;
/// ```
pub struct StepBuilder {
    name: String,
}

impl StepBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn tasklet<T: Tasklet + 'static>(self, tasklet: T) -> TaskletStepBuilder {
        TaskletStepBuilder {
            name: self.name,
            tasklet: Arc::new(tasklet),
        }
    }

    pub fn handler_fn<F>(self, f: F) -> TaskletStepBuilder
    where
        F: Fn() -> Result<(), BatchError> + Send + Sync + 'static,
    {
        self.tasklet(FnTasklet::new(f))
    }

    pub fn reader<R>(self, reader: R) -> ChunkStepBuilder<R::Item, R::Item>
    where
        R: ItemReader + 'static,
        R::Item: Sync,
    {
        ChunkStepBuilder {
            name: self.name,
            reader: Arc::new(reader),
            processor: Arc::new(PassThrough::new()),
            writer: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            partitions: 1,
            partitioner: None,
            writer_discarded: false,
        }
    }
}

pub struct TaskletStepBuilder {
    name: String,
    tasklet: Arc<dyn Tasklet>,
}

impl TaskletStepBuilder {
    pub fn build(self) -> Result<Step, BatchError> {
        validate_name(&self.name)?;
        Ok(Step::new(self.name, StepKind::Tasklet(self.tasklet)))
    }
}

pub struct ChunkStepBuilder<I, O>
where
    I: Send + 'static,
    O: Send + Sync + 'static,
{
    name: String,
    reader: Arc<dyn ItemReader<Item = I>>,
    processor: Arc<dyn ItemProcessor<Input = I, Output = O>>,
    writer: Option<Arc<dyn ItemWriter<Item = O>>>,
    chunk_size: usize,
    partitions: usize,
    partitioner: Option<Arc<dyn Partitioner>>,
    writer_discarded: bool,
}

impl<I, O> ChunkStepBuilder<I, O>
where
    I: Send + 'static,
    O: Send + Sync + 'static,
{
    /// Replaces the processor. Must come before [`ChunkStepBuilder::writer`].
    pub fn processor<P>(self, processor: P) -> ChunkStepBuilder<I, P::Output>
    where
        P: ItemProcessor<Input = I> + 'static,
        P::Output: Sync,
    {
        ChunkStepBuilder {
            name: self.name,
            reader: self.reader,
            processor: Arc::new(processor),
            writer: None,
            chunk_size: self.chunk_size,
            partitions: self.partitions,
            partitioner: self.partitioner,
            writer_discarded: self.writer_discarded || self.writer.is_some(),
        }
    }

    pub fn writer<W>(mut self, writer: W) -> Self
    where
        W: ItemWriter<Item = O> + 'static,
    {
        self.writer = Some(Arc::new(writer));
        self
    }

    pub fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size;
        self
    }

    pub fn partitions(mut self, partitions: usize) -> Self {
        self.partitions = partitions;
        self
    }

    pub fn partitioner<P: Partitioner + 'static>(mut self, partitioner: P) -> Self {
        self.partitioner = Some(Arc::new(partitioner));
        self
    }

    pub fn build(self) -> Result<Step, BatchError> {
        validate_name(&self.name)?;
        if self.chunk_size == 0 {
            return Err(BatchError::configuration(format!(
                "step '{}': chunk size must be greater than zero",
                self.name
            )));
        }
        if self.partitions == 0 {
            return Err(BatchError::configuration(format!(
                "step '{}': partition count must be greater than zero",
                self.name
            )));
        }
        if self.writer_discarded {
            return Err(BatchError::configuration(format!(
                "step '{}': writer must be set after the processor",
                self.name
            )));
        }

        let chunk = ChunkStep {
            pipeline: Arc::new(ChunkOrientedStep::new(
                self.reader,
                self.processor,
                self.writer,
                self.chunk_size,
            )),
        };

        if self.partitions == 1 {
            return Ok(Step::new(self.name, StepKind::Chunk(chunk)));
        }

        let partitioner = self.partitioner.ok_or_else(|| {
            BatchError::configuration(format!(
                "step '{}': {} partitions requested but no partitioner set",
                self.name, self.partitions
            ))
        })?;

        Ok(Step::new(
            self.name,
            StepKind::Partitioned(PartitionedStep {
                chunk,
                partitions: self.partitions,
                partitioner,
            }),
        ))
    }
}

fn validate_name(name: &str) -> Result<(), BatchError> {
    if name.trim().is_empty() {
        return Err(BatchError::configuration("step name must not be empty"));
    }
    Ok(())
}
