use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

#[derive(Debug, Default)]
struct InnerMetrics {
    items_read: AtomicU64,
    items_written: AtomicU64,
    items_filtered: AtomicU64,
    chunks_committed: AtomicU64,
    chunks_rolled_back: AtomicU64,
    steps_failed: AtomicU64,
}

/// Engine-wide counters, shared by every step and partition.
#[derive(Debug, Clone)]
pub struct Metrics {
    inner: Arc<InnerMetrics>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub items_read: u64,
    pub items_written: u64,
    pub items_filtered: u64,
    pub chunks_committed: u64,
    pub chunks_rolled_back: u64,
    pub steps_failed: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Metrics {
            inner: Arc::new(InnerMetrics::default()),
        }
    }

    pub fn record_commit(&self, read: u64, written: u64, filtered: u64) {
        self.inner.items_read.fetch_add(read, Ordering::Relaxed);
        self.inner.items_written.fetch_add(written, Ordering::Relaxed);
        self.inner
            .items_filtered
            .fetch_add(filtered, Ordering::Relaxed);
        self.inner.chunks_committed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_rollbacks(&self) {
        self.inner.chunks_rolled_back.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_failed_steps(&self) {
        self.inner.steps_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            items_read: self.inner.items_read.load(Ordering::Relaxed),
            items_written: self.inner.items_written.load(Ordering::Relaxed),
            items_filtered: self.inner.items_filtered.load(Ordering::Relaxed),
            chunks_committed: self.inner.chunks_committed.load(Ordering::Relaxed),
            chunks_rolled_back: self.inner.chunks_rolled_back.load(Ordering::Relaxed),
            steps_failed: self.inner.steps_failed.load(Ordering::Relaxed),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
