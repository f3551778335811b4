use crate::context::ChunkContext;
use async_trait::async_trait;
use model::error::BatchError;

/// Sink receiving each chunk as a whole.
///
/// During `write` the chunk's transaction is available through
/// [`ChunkContext::transaction`]; writes staged there commit atomically with
/// the step's checkpoint.
#[async_trait]
pub trait ItemWriter: Send + Sync {
    type Item: Send + Sync + 'static;

    async fn open(&self, _ctx: &mut ChunkContext<'_>) -> Result<(), BatchError> {
        Ok(())
    }

    async fn write(&self, items: &[Self::Item], ctx: &mut ChunkContext<'_>)
    -> Result<(), BatchError>;

    async fn close(&self, _ctx: &mut ChunkContext<'_>) -> Result<(), BatchError> {
        Ok(())
    }
}
