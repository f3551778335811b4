use async_trait::async_trait;
use model::{
    error::BatchError,
    execution::{job::JobExecution, step::StepExecution},
};

/// A step implemented as a single call.
#[async_trait]
pub trait Tasklet: Send + Sync {
    async fn execute(&self, step: &mut StepExecution, job: &JobExecution)
    -> Result<(), BatchError>;
}

/// Adapts a zero-argument closure into a [`Tasklet`].
pub struct FnTasklet<F>(F);

impl<F> FnTasklet<F>
where
    F: Fn() -> Result<(), BatchError> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F> Tasklet for FnTasklet<F>
where
    F: Fn() -> Result<(), BatchError> + Send + Sync,
{
    async fn execute(
        &self,
        _step: &mut StepExecution,
        _job: &JobExecution,
    ) -> Result<(), BatchError> {
        (self.0)()
    }
}
