use async_trait::async_trait;
use model::error::BatchError;

/// An atomic unit of staged writes.
///
/// Nothing is visible to readers of the store before [`Transaction::commit`]
/// returns. Dropping a transaction without committing discards it.
#[async_trait]
pub trait Transaction: Send {
    fn id(&self) -> &str;

    fn put(&mut self, key: &str, value: Vec<u8>);

    fn remove(&mut self, key: &str);

    async fn commit(self: Box<Self>) -> Result<(), BatchError>;

    async fn rollback(self: Box<Self>) -> Result<(), BatchError>;
}

/// Hands out one transaction per chunk.
#[async_trait]
pub trait TransactionManager: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn Transaction>, BatchError>;
}
