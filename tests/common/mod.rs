//! Common test utilities and fixtures.

#![allow(dead_code)]

use homemetrics_lib::core::{HomeMetricsError, Metric, Result};
use homemetrics_lib::ingest::{AliasTable, Dispatcher, EntityCache, Subscriber};
use homemetrics_lib::monitoring::PipelineStats;
use homemetrics_lib::sink::BatchSink;
use homemetrics_lib::transport::Transport;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Transport that records every call instead of talking to a broker.
#[derive(Default)]
pub struct MemoryTransport {
    pub subscriptions: Mutex<Vec<String>>,
    pub unsubscriptions: Mutex<Vec<String>>,
    pub published: Mutex<Vec<(String, Vec<u8>)>>,
    pub fail_subscribe: AtomicBool,
}

impl MemoryTransport {
    pub fn failing_subscribe() -> Self {
        let transport = Self::default();
        transport.fail_subscribe.store(true, Ordering::SeqCst);
        transport
    }
}

#[async_trait::async_trait]
impl Transport for MemoryTransport {
    async fn subscribe(&self, filter: &str) -> Result<()> {
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(HomeMetricsError::transport("subscription refused"));
        }
        self.subscriptions.lock().push(filter.to_string());
        Ok(())
    }

    async fn unsubscribe(&self, filter: &str) -> Result<()> {
        self.unsubscriptions.lock().push(filter.to_string());
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        self.published.lock().push((topic.to_string(), payload));
        Ok(())
    }
}

/// Sink that keeps every batch it accepts and can be switched to failing.
#[derive(Default)]
pub struct RecordingSink {
    pub batches: Mutex<Vec<Vec<Metric>>>,
    pub fail: AtomicBool,
}

impl RecordingSink {
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn written(&self) -> Vec<Metric> {
        self.batches.lock().iter().flatten().cloned().collect()
    }
}

#[async_trait::async_trait]
impl BatchSink for RecordingSink {
    async fn write_batch(&self, batch: &[Metric]) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(HomeMetricsError::sink("database unavailable"));
        }
        self.batches.lock().push(batch.to_vec());
        Ok(())
    }
}

/// A subscriber wired to an in-memory transport, plus the dispatcher's
/// receiving end.
pub struct Harness {
    pub transport: Arc<MemoryTransport>,
    pub subscriber: Arc<Subscriber>,
    pub dispatcher: Arc<Dispatcher>,
    pub cache: Arc<EntityCache>,
    pub updates: mpsc::Receiver<Metric>,
    pub stats: Arc<PipelineStats>,
}

impl Harness {
    pub async fn start(topic: &str, aliases: AliasTable, capacity: usize) -> Self {
        let transport = Arc::new(MemoryTransport::default());
        let stats = Arc::new(PipelineStats::new());
        let cache = Arc::new(EntityCache::new(aliases));
        let (dispatcher, updates) =
            Dispatcher::new(capacity, Duration::from_secs(5), Arc::clone(&stats));
        let dispatcher = Arc::new(dispatcher);

        let subscriber = Subscriber::start(
            Arc::clone(&transport) as Arc<dyn Transport>,
            topic,
            Arc::clone(&cache),
            Arc::clone(&dispatcher),
            Arc::clone(&stats),
        )
        .await
        .expect("subscriber should start");

        Self {
            transport,
            subscriber: Arc::new(subscriber),
            dispatcher,
            cache,
            updates,
            stats,
        }
    }
}
