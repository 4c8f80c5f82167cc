//! Pipeline counters.
//!
//! Every stage bumps its counters with relaxed atomics; readers take a
//! [`StatsSnapshot`] for logging or the `/health` endpoint.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Lock-free counters shared by all pipeline stages.
#[derive(Debug)]
pub struct PipelineStats {
    started: Instant,
    messages_received: AtomicU64,
    ignored_topics: AtomicU64,
    decode_errors: AtomicU64,
    snapshots_dispatched: AtomicU64,
    snapshots_dropped: AtomicU64,
    flushes_ok: AtomicU64,
    flushes_failed: AtomicU64,
    records_written: AtomicU64,
    records_discarded: AtomicU64,
    gauges_updated: AtomicU64,
}

/// Point-in-time copy of [`PipelineStats`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub uptime_seconds: u64,
    pub messages_received: u64,
    pub ignored_topics: u64,
    pub decode_errors: u64,
    pub snapshots_dispatched: u64,
    pub snapshots_dropped: u64,
    pub flushes_ok: u64,
    pub flushes_failed: u64,
    pub records_written: u64,
    pub records_discarded: u64,
    pub gauges_updated: u64,
}

impl Default for PipelineStats {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineStats {
    /// Zeroed counters.
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            messages_received: AtomicU64::new(0),
            ignored_topics: AtomicU64::new(0),
            decode_errors: AtomicU64::new(0),
            snapshots_dispatched: AtomicU64::new(0),
            snapshots_dropped: AtomicU64::new(0),
            flushes_ok: AtomicU64::new(0),
            flushes_failed: AtomicU64::new(0),
            records_written: AtomicU64::new(0),
            records_discarded: AtomicU64::new(0),
            gauges_updated: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn record_message(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_ignored(&self) {
        self.ignored_topics.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_dispatched(&self) {
        self.snapshots_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_dropped(&self) {
        self.snapshots_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Successful flush of `records` records.
    pub fn record_flush_ok(&self, records: usize) {
        self.flushes_ok.fetch_add(1, Ordering::Relaxed);
        self.records_written.fetch_add(records as u64, Ordering::Relaxed);
    }

    /// Failed flush; `discarded` records were cut by retry truncation.
    pub fn record_flush_failed(&self, discarded: usize) {
        self.flushes_failed.fetch_add(1, Ordering::Relaxed);
        self.records_discarded.fetch_add(discarded as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_gauges(&self, count: usize) {
        self.gauges_updated.fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Read all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            uptime_seconds: self.started.elapsed().as_secs(),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            ignored_topics: self.ignored_topics.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            snapshots_dispatched: self.snapshots_dispatched.load(Ordering::Relaxed),
            snapshots_dropped: self.snapshots_dropped.load(Ordering::Relaxed),
            flushes_ok: self.flushes_ok.load(Ordering::Relaxed),
            flushes_failed: self.flushes_failed.load(Ordering::Relaxed),
            records_written: self.records_written.load(Ordering::Relaxed),
            records_discarded: self.records_discarded.load(Ordering::Relaxed),
            gauges_updated: self.gauges_updated.load(Ordering::Relaxed),
        }
    }
}
