//! Bounded snapshot queue between ingestion and the sinks.
//!
//! Ingestion must never stall indefinitely on a slow consumer: a send waits
//! a bounded time for queue space and then drops the snapshot.

use crate::core::Metric;
use crate::monitoring::PipelineStats;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// Default queue capacity.
pub const DEFAULT_CAPACITY: usize = 50;

/// Default time a send waits for space.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// What happened to a snapshot handed to [`Dispatcher::send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Enqueued for the consumer.
    Delivered,
    /// Queue stayed full for the whole timeout, or the consumer is gone.
    Dropped,
    /// Dispatcher was closed before or during the send.
    Closed,
}

/// Bounded, closeable queue of metric snapshots.
pub struct Dispatcher {
    tx: Mutex<Option<mpsc::Sender<Metric>>>,
    closed: watch::Sender<bool>,
    send_timeout: Duration,
    stats: Arc<PipelineStats>,
}

impl Dispatcher {
    /// Create a dispatcher and the receiving end its consumer drains.
    pub fn new(
        capacity: usize,
        send_timeout: Duration,
        stats: Arc<PipelineStats>,
    ) -> (Self, mpsc::Receiver<Metric>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (closed, _) = watch::channel(false);
        let dispatcher = Self {
            tx: Mutex::new(Some(tx)),
            closed,
            send_timeout,
            stats,
        };
        (dispatcher, rx)
    }

    /// Deliver a snapshot, waiting at most the send timeout for room.
    pub async fn send(&self, metric: Metric) -> SendOutcome {
        let mut closed = self.closed.subscribe();
        let Some(tx) = self.tx.lock().clone() else {
            return SendOutcome::Closed;
        };

        let outcome = tokio::select! {
            result = tx.send_timeout(metric, self.send_timeout) => match result {
                Ok(()) => SendOutcome::Delivered,
                Err(mpsc::error::SendTimeoutError::Timeout(metric)) => {
                    tracing::warn!(
                        "Dropped snapshot {} (id {}), queue full for {:?}",
                        metric.name,
                        metric.id().unwrap_or("-"),
                        self.send_timeout
                    );
                    SendOutcome::Dropped
                },
                Err(mpsc::error::SendTimeoutError::Closed(metric)) => {
                    tracing::warn!("Dropped snapshot {}, consumer has stopped", metric.name);
                    SendOutcome::Dropped
                },
            },
            _ = closed.wait_for(|closed| *closed) => SendOutcome::Closed,
        };

        match outcome {
            SendOutcome::Delivered => self.stats.record_dispatched(),
            SendOutcome::Dropped => self.stats.record_dropped(),
            SendOutcome::Closed => {},
        }
        outcome
    }

    /// Stop accepting snapshots and wake blocked senders. The consumer sees the
    /// end of the stream once queued snapshots are drained. Idempotent.
    pub fn close(&self) {
        if self.tx.lock().take().is_some() {
            tracing::debug!("Dispatcher closed");
        }
        self.closed.send_replace(true);
    }

    /// True once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}
