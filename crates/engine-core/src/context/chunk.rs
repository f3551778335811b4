use crate::transaction::Transaction;
use model::execution::{context::ExecutionContext, job::JobExecution, step::StepExecution};

/// Handle passed to readers, processors and writers for one chunk.
///
/// Exposes the running step execution (and through it the execution context
/// that gets checkpointed) plus, during the write phase, the chunk's open
/// transaction.
pub struct ChunkContext<'a> {
    job_execution: &'a JobExecution,
    step_execution: &'a mut StepExecution,
    chunk: u64,
    transaction: Option<Box<dyn Transaction>>,
    stopped: bool,
}

impl<'a> ChunkContext<'a> {
    pub fn new(
        job_execution: &'a JobExecution,
        step_execution: &'a mut StepExecution,
        chunk: u64,
    ) -> Self {
        Self {
            job_execution,
            step_execution,
            chunk,
            transaction: None,
            stopped: false,
        }
    }

    pub fn job_execution(&self) -> &JobExecution {
        self.job_execution
    }

    pub fn step_execution(&self) -> &StepExecution {
        self.step_execution
    }

    pub fn step_execution_mut(&mut self) -> &mut StepExecution {
        self.step_execution
    }

    /// Shortcut for the step execution's context.
    pub fn context(&self) -> &ExecutionContext {
        self.step_execution.context()
    }

    pub fn context_mut(&mut self) -> &mut ExecutionContext {
        self.step_execution.context_mut()
    }

    /// Sequence number of the chunk, starting at 1. Zero for open/close hooks.
    pub fn chunk(&self) -> u64 {
        self.chunk
    }

    /// The chunk's transaction. Only present while the writer runs.
    pub fn transaction(&mut self) -> Option<&mut (dyn Transaction + 'static)> {
        self.transaction.as_deref_mut()
    }

    pub fn attach_transaction(&mut self, tx: Box<dyn Transaction>) {
        self.transaction = Some(tx);
    }

    pub fn detach_transaction(&mut self) -> Option<Box<dyn Transaction>> {
        self.transaction.take()
    }

    /// Marks a close hook that runs because the step was stopped before the
    /// reader was exhausted.
    pub fn mark_stopped(&mut self) {
        self.stopped = true;
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }
}
