//! Pub/sub transport abstraction.
//!
//! The ingest path only needs to subscribe, unsubscribe and publish; inbound
//! messages arrive on a channel owned by whoever drives the connection.

pub mod mqtt;

use crate::core::Result;
use bytes::Bytes;

pub use mqtt::{MqttConnection, MqttTransport};

/// A message received from the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Full topic the message was published on
    pub topic: String,
    /// Raw payload
    pub payload: Bytes,
}

impl InboundMessage {
    /// Build a message from anything convertible to topic and payload.
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// Operations the subscriber performs against the broker.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Subscribe to a topic filter with at-least-once delivery.
    async fn subscribe(&self, filter: &str) -> Result<()>;

    /// Drop a subscription.
    async fn unsubscribe(&self, filter: &str) -> Result<()>;

    /// Publish a payload (at-least-once, not retained).
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()>;
}
