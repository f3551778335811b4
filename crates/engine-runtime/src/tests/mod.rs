mod engine;

use async_trait::async_trait;
use engine_core::{
    context::ChunkContext,
    item::{ItemReader, ItemWriter},
};
use model::error::BatchError;
use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

pub(crate) const READ_NUM: &str = "read.num";

/// Emits `value-0` .. `value-{total-1}`, cursor in `read.num`.
pub(crate) struct NumberReader {
    pub total: i64,
}

#[async_trait]
impl ItemReader for NumberReader {
    type Item = String;

    async fn read(&self, ctx: &mut ChunkContext<'_>) -> Result<Option<String>, BatchError> {
        let next = ctx.context().get_int(READ_NUM, 0);
        if next >= self.total {
            return Ok(None);
        }
        ctx.context_mut().put(READ_NUM, next + 1);
        Ok(Some(format!("value-{next}")))
    }
}

/// Collects items; optionally fails on the n-th write call overall, or
/// sleeps before each write.
#[derive(Clone, Default)]
pub(crate) struct SharedWriter {
    pub items: Arc<Mutex<Vec<String>>>,
    calls: Arc<AtomicUsize>,
    fail_on_call: Option<usize>,
    delay: Option<Duration>,
}

impl SharedWriter {
    pub fn failing_on_call(call: usize) -> Self {
        Self {
            fail_on_call: Some(call),
            ..Self::default()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn items(&self) -> Vec<String> {
        self.items.lock().unwrap().clone()
    }
}

#[async_trait]
impl ItemWriter for SharedWriter {
    type Item = String;

    async fn write(&self, items: &[String], _ctx: &mut ChunkContext<'_>) -> Result<(), BatchError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on_call == Some(call) {
            return Err(BatchError::write(format!("write call {call} rejected")));
        }
        self.items.lock().unwrap().extend_from_slice(items);
        Ok(())
    }
}
