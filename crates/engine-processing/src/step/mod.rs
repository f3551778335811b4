use crate::chunk::ChunkPipeline;
use engine_core::{partition::Partitioner, tasklet::Tasklet};
use model::error::BatchError;
use std::{fmt, sync::Arc};

pub mod builder;

pub use builder::{ChunkStepBuilder, StepBuilder, TaskletStepBuilder};

pub const DEFAULT_CHUNK_SIZE: usize = 10;

/// How a step finished, before it is recorded on the execution.
#[derive(Debug)]
pub enum StepOutcome {
    Completed,
    Stopped,
    Failed(BatchError),
}

impl StepOutcome {
    pub fn from_result(result: Result<(), BatchError>) -> Self {
        match result {
            Ok(()) => StepOutcome::Completed,
            Err(e) => StepOutcome::Failed(e),
        }
    }
}

/// A named unit of work inside a job.
#[derive(Clone)]
pub struct Step {
    name: String,
    kind: StepKind,
}

#[derive(Clone)]
pub enum StepKind {
    Tasklet(Arc<dyn Tasklet>),
    Chunk(ChunkStep),
    Partitioned(PartitionedStep),
}

#[derive(Clone)]
pub struct ChunkStep {
    pub pipeline: Arc<dyn ChunkPipeline>,
}

/// A chunk step fanned out over independent partitions.
#[derive(Clone)]
pub struct PartitionedStep {
    pub chunk: ChunkStep,
    pub partitions: usize,
    pub partitioner: Arc<dyn Partitioner>,
}

impl Step {
    pub(crate) fn new(name: String, kind: StepKind) -> Self {
        Self { name, kind }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &StepKind {
        &self.kind
    }

    pub fn is_partitioned(&self) -> bool {
        matches!(self.kind, StepKind::Partitioned(_))
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.kind {
            StepKind::Tasklet(_) => "tasklet".to_string(),
            StepKind::Chunk(c) => format!("chunk(size={})", c.pipeline.chunk_size()),
            StepKind::Partitioned(p) => format!(
                "partitioned(size={}, partitions={})",
                p.chunk.pipeline.chunk_size(),
                p.partitions
            ),
        };
        f.debug_struct("Step")
            .field("name", &self.name)
            .field("kind", &kind)
            .finish()
    }
}
