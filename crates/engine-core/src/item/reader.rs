use crate::context::ChunkContext;
use async_trait::async_trait;
use model::error::BatchError;

/// Source of items for a chunk step.
///
/// Readers are shared by every partition of a step, so any position they need
/// to resume from belongs in the execution context, not in `self`.
#[async_trait]
pub trait ItemReader: Send + Sync {
    type Item: Send + 'static;

    /// Called once per step (or partition) execution before the first read.
    async fn open(&self, _ctx: &mut ChunkContext<'_>) -> Result<(), BatchError> {
        Ok(())
    }

    /// Returns the next item, or `Ok(None)` once the input is exhausted.
    async fn read(&self, ctx: &mut ChunkContext<'_>) -> Result<Option<Self::Item>, BatchError>;

    /// Called once after the last chunk was committed.
    async fn close(&self, _ctx: &mut ChunkContext<'_>) -> Result<(), BatchError> {
        Ok(())
    }
}
