use crate::Workspace;
use async_trait::async_trait;
use engine_core::{
    context::ChunkContext,
    item::{ItemProcessor, ItemWriter},
};
use engine_runtime::Engine;
use model::{
    core::identifiers::JobExecutionId,
    error::BatchError,
    execution::job::JobExecution,
};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

#[derive(Debug, Clone, Deserialize)]
pub struct Trade {
    pub id: u32,
    pub account: String,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Posting {
    pub trade_id: u32,
    pub account: String,
    pub amount_cents: i64,
}

/// CSV with `count` trades; every fifth trade has a zero amount.
pub fn trades_csv(count: u32) -> String {
    let mut out = String::from("id,account,amount\n");
    for id in 1..=count {
        let amount = if id % 5 == 0 { 0.0 } else { id as f64 * 1.5 };
        out.push_str(&format!("{id},ACC-{},{amount}\n", id % 3));
    }
    out
}

/// Number of trades of [`trades_csv`] that carry an amount.
pub fn booked(count: u32) -> usize {
    (1..=count).filter(|id| id % 5 != 0).count()
}

pub fn write_inbound(ws: &Workspace, name: &str, content: &str) {
    let path = ws.path().join("inbound").join(name);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

pub fn read_work(ws: &Workspace, name: &str) -> String {
    fs::read_to_string(ws.path().join("work").join(name)).unwrap()
}

pub fn work_file_exists(ws: &Workspace, name: &str) -> bool {
    ws.path().join("work").join(name).exists()
}

/// Data lines of a delimited file, without the header.
pub fn file_row_count(content: &str, has_headers: bool) -> usize {
    let lines = content.lines().filter(|l| !l.is_empty()).count();
    if has_headers && lines > 0 {
        lines - 1
    } else {
        lines
    }
}

/// Turns a trade into a posting in cents; zero amounts are dropped.
///
/// Can be told to fail once on a given trade, or to pause before each item.
#[derive(Clone, Default)]
pub struct PostTrade {
    fail_once_on: Option<u32>,
    failed: Arc<AtomicBool>,
    delay: Option<Duration>,
    pub seen: Arc<AtomicUsize>,
}

impl PostTrade {
    pub fn failing_once_on(id: u32) -> Self {
        Self {
            fail_once_on: Some(id),
            ..Self::default()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }
}

#[async_trait]
impl ItemProcessor for PostTrade {
    type Input = Trade;
    type Output = Posting;

    async fn process(
        &self,
        trade: Trade,
        _ctx: &mut ChunkContext<'_>,
    ) -> Result<Option<Posting>, BatchError> {
        self.seen.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_once_on == Some(trade.id) && !self.failed.swap(true, Ordering::SeqCst) {
            return Err(BatchError::process(format!("trade {} rejected", trade.id)));
        }
        if trade.amount == 0.0 {
            return Ok(None);
        }
        Ok(Some(Posting {
            trade_id: trade.id,
            account: trade.account,
            amount_cents: (trade.amount * 100.0).round() as i64,
        }))
    }
}

/// Keeps every posting it is handed, across partitions.
#[derive(Clone, Default)]
pub struct CollectingWriter {
    items: Arc<Mutex<Vec<Posting>>>,
}

impl CollectingWriter {
    pub fn trade_ids(&self) -> Vec<u32> {
        let mut ids: Vec<_> = self
            .items
            .lock()
            .unwrap()
            .iter()
            .map(|p| p.trade_id)
            .collect();
        ids.sort_unstable();
        ids
    }
}

#[async_trait]
impl ItemWriter for CollectingWriter {
    type Item = Posting;

    async fn write(&self, items: &[Posting], ctx: &mut ChunkContext<'_>) -> Result<(), BatchError> {
        assert!(ctx.transaction().is_some(), "writer called outside a chunk transaction");
        self.items.lock().unwrap().extend_from_slice(items);
        Ok(())
    }
}

/// Waits until the execution is recorded terminal and the engine has let go
/// of it, so it can be restarted right away.
pub async fn wait_terminal(engine: &Engine, id: &JobExecutionId) -> JobExecution {
    for _ in 0..1000 {
        if let Some(execution) = engine.job_execution(id).await.unwrap() {
            if execution.status().is_terminal() && !engine.is_running(id) {
                return execution;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job execution {id} never finished");
}
