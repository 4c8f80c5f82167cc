//! Periodic batch flushing with capped retry.
//!
//! Snapshots accumulate in a pending list. Every tick the list is swapped out
//! and written to the sink in one call. A failed batch is cut down to its
//! oldest `max_retained` records and put back in front of whatever arrived
//! during the write, so memory stays bounded during a long sink outage.

use crate::core::Metric;
use crate::monitoring::PipelineStats;
use crate::sink::BatchSink;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};

/// Default flush interval.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(1);

/// Default number of records kept after a failed write.
pub const DEFAULT_MAX_RETAINED: usize = 100;

/// Result of a single flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing was pending.
    Empty,
    /// The whole batch was written.
    Written(usize),
    /// The write failed; `retained` records were requeued, `discarded` dropped.
    Failed { retained: usize, discarded: usize },
}

/// Accumulates snapshots and flushes them to a [`BatchSink`].
pub struct BatchWriter {
    pending: Mutex<Vec<Metric>>,
    sink: Arc<dyn BatchSink>,
    flush_interval: Duration,
    max_retained: usize,
    stats: Arc<PipelineStats>,
}

impl BatchWriter {
    /// Create a writer for `sink`.
    pub fn new(
        sink: Arc<dyn BatchSink>,
        flush_interval: Duration,
        max_retained: usize,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            pending: Mutex::new(Vec::new()),
            sink,
            flush_interval,
            max_retained,
            stats,
        }
    }

    /// Append a record to the pending list.
    pub fn push(&self, metric: Metric) {
        self.pending.lock().push(metric);
    }

    /// Number of records awaiting flush.
    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Copy of the pending list, oldest first.
    pub fn pending(&self) -> Vec<Metric> {
        self.pending.lock().clone()
    }

    /// Drain the dispatcher into the pending list until it is closed.
    pub async fn collect(&self, mut updates: mpsc::Receiver<Metric>) {
        while let Some(metric) = updates.recv().await {
            let pending = {
                let mut pending = self.pending.lock();
                pending.push(metric);
                pending.len()
            };
            tracing::trace!("{} metric entries in buffer", pending);
        }
        tracing::debug!("Dispatcher drained, batch collector stopping");
    }

    /// Write everything pending to the sink once.
    pub async fn flush(&self) -> FlushOutcome {
        let mut batch = std::mem::take(&mut *self.pending.lock());
        if batch.is_empty() {
            return FlushOutcome::Empty;
        }

        let size = batch.len();
        tracing::debug!("Writing {} metric entries", size);

        match self.sink.write_batch(&batch).await {
            Ok(()) => {
                self.stats.record_flush_ok(size);
                FlushOutcome::Written(size)
            },
            Err(e) => {
                batch.truncate(self.max_retained);
                let retained = batch.len();
                let discarded = size - retained;

                {
                    let mut pending = self.pending.lock();
                    batch.append(&mut pending);
                    *pending = batch;
                }

                self.stats.record_flush_failed(discarded);
                tracing::error!(
                    "Batch write failed ({}), returning {} of {} entries to buffer: {}",
                    e.category(),
                    retained,
                    size,
                    e
                );
                FlushOutcome::Failed { retained, discarded }
            },
        }
    }

    /// Flush on every tick until `shutdown` turns true. A flush in progress
    /// is always allowed to finish; one last flush runs before returning.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker =
            tokio::time::interval_at(Instant::now() + self.flush_interval, self.flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {},
                _ = shutdown.wait_for(|stop| *stop) => break,
            }
            self.flush().await;
        }

        match self.flush().await {
            FlushOutcome::Failed { retained, .. } => {
                tracing::warn!("Final flush failed, {} entries not written", retained);
            },
            FlushOutcome::Written(n) => tracing::info!("Final flush wrote {} entries", n),
            FlushOutcome::Empty => {},
        }
    }
}
