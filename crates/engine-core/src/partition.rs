use async_trait::async_trait;
use model::{
    error::BatchError,
    execution::{context::ExecutionContext, job::JobExecution, step::StepExecution},
};

pub const PARTITION_START_KEY: &str = "partition.start";
pub const PARTITION_END_KEY: &str = "partition.end";

/// Splits a step's input into independent partitions.
///
/// Each returned context seeds the execution context of one partition; the
/// step's reader finds its assignment there.
#[async_trait]
pub trait Partitioner: Send + Sync {
    async fn partition(
        &self,
        job: &JobExecution,
        step: &StepExecution,
        partitions: usize,
    ) -> Result<Vec<ExecutionContext>, BatchError>;
}

/// Partitions `[0, total)` into contiguous, disjoint ranges.
#[derive(Debug, Clone)]
pub struct RangePartitioner {
    total: u64,
}

impl RangePartitioner {
    pub fn new(total: u64) -> Self {
        Self { total }
    }
}

#[async_trait]
impl Partitioner for RangePartitioner {
    async fn partition(
        &self,
        _job: &JobExecution,
        _step: &StepExecution,
        partitions: usize,
    ) -> Result<Vec<ExecutionContext>, BatchError> {
        Ok(contiguous_ranges(self.total, partitions)
            .into_iter()
            .map(|(start, end)| {
                let mut ctx = ExecutionContext::new();
                ctx.put(PARTITION_START_KEY, start);
                ctx.put(PARTITION_END_KEY, end);
                ctx
            })
            .collect())
    }
}

/// Half-open ranges covering `[0, total)`; sizes differ by at most one.
/// Never returns more ranges than items, and at least one.
pub fn contiguous_ranges(total: u64, partitions: usize) -> Vec<(u64, u64)> {
    let parts = (partitions.max(1) as u64).min(total.max(1));
    let base = total / parts;
    let extra = total % parts;

    let mut ranges = Vec::with_capacity(parts as usize);
    let mut start = 0;
    for i in 0..parts {
        let len = base + u64::from(i < extra);
        ranges.push((start, start + len));
        start += len;
    }
    ranges
}
