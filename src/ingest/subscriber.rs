//! Subscription lifecycle and per-message ingestion.

use crate::core::Result;
use crate::ingest::cache::EntityCache;
use crate::ingest::dispatcher::{Dispatcher, SendOutcome};
use crate::monitoring::PipelineStats;
use crate::transport::{InboundMessage, Transport};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Feeds broker messages through the entity cache into the dispatcher.
pub struct Subscriber {
    transport: Arc<dyn Transport>,
    topic: String,
    cache: Arc<EntityCache>,
    dispatcher: Arc<Dispatcher>,
    stats: Arc<PipelineStats>,
}

impl Subscriber {
    /// Subscribe to `topic` and request a state dump from devices.
    ///
    /// Any failure here is fatal to startup.
    pub async fn start(
        transport: Arc<dyn Transport>,
        topic: impl Into<String>,
        cache: Arc<EntityCache>,
        dispatcher: Arc<Dispatcher>,
        stats: Arc<PipelineStats>,
    ) -> Result<Self> {
        let subscriber = Self {
            transport,
            topic: topic.into(),
            cache,
            dispatcher,
            stats,
        };

        subscriber.transport.subscribe(&subscriber.topic).await?;
        tracing::info!("Subscribed to {}", subscriber.topic);

        let request = state_request_topic(&subscriber.topic);
        subscriber.transport.publish(&request, Vec::new()).await?;
        tracing::info!("Requested device state dump on {}", request);

        Ok(subscriber)
    }

    /// Process one inbound message.
    pub async fn handle(&self, message: &InboundMessage) -> Option<SendOutcome> {
        self.stats.record_message();

        let snapshot = match self.cache.on_message(&message.topic, &message.payload, Utc::now()) {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                self.stats.record_ignored();
                tracing::trace!("Ignoring non-metric topic {}", message.topic);
                return None;
            },
            Err(e) => {
                self.stats.record_decode_error();
                tracing::warn!("Dropping message on {}: {}", message.topic, e);
                return None;
            },
        };

        Some(self.dispatcher.send(snapshot).await)
    }

    /// Process messages until the inbound stream ends or the dispatcher is
    /// closed.
    pub async fn run(&self, mut inbound: mpsc::Receiver<InboundMessage>) {
        while let Some(message) = inbound.recv().await {
            if self.dispatcher.is_closed() {
                break;
            }
            if self.handle(&message).await == Some(SendOutcome::Closed) {
                break;
            }
        }
        tracing::debug!("Subscriber loop finished");
    }

    /// Stop accepting messages: unsubscribe, then close the dispatcher so
    /// blocked and future sends return immediately.
    pub async fn close(&self) -> Result<()> {
        let result = self.transport.unsubscribe(&self.topic).await;
        self.dispatcher.close();
        result
    }
}

/// `<root>/get`, where root is the topic up to its first `/`.
pub fn state_request_topic(topic: &str) -> String {
    let root = topic.split('/').next().unwrap_or_default();
    format!("{root}/get")
}
