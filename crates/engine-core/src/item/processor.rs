use crate::context::ChunkContext;
use async_trait::async_trait;
use model::error::BatchError;
use std::marker::PhantomData;

/// Per-item transformation between reading and writing.
#[async_trait]
pub trait ItemProcessor: Send + Sync {
    type Input: Send + 'static;
    type Output: Send + 'static;

    /// Returns the transformed item, or `Ok(None)` to filter it out of the
    /// chunk. Filtered items count as read but not as written.
    async fn process(
        &self,
        item: Self::Input,
        ctx: &mut ChunkContext<'_>,
    ) -> Result<Option<Self::Output>, BatchError>;
}

/// Identity processor used when a step has none configured.
pub struct PassThrough<T>(PhantomData<fn() -> T>);

impl<T> PassThrough<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for PassThrough<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: Send + 'static> ItemProcessor for PassThrough<T> {
    type Input = T;
    type Output = T;

    async fn process(
        &self,
        item: Self::Input,
        _ctx: &mut ChunkContext<'_>,
    ) -> Result<Option<Self::Output>, BatchError> {
        Ok(Some(item))
    }
}
