//! MQTT transport built on `rumqttc`.
//!
//! [`MqttConnection::connect`] waits for the broker's ConnAck so that a bad
//! address or credentials fail startup, then drives the event loop in a
//! background task that forwards every publish to an inbound channel.

use crate::core::config::MqttConfig;
use crate::core::{HomeMetricsError, Result};
use crate::transport::{InboundMessage, Transport};
use parking_lot::Mutex;
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Packet, QoS};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Time allowed for the initial ConnAck.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Pause after a connection error before the event loop reconnects.
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Pending requests buffered between the client handle and the event loop.
const REQUEST_CAPACITY: usize = 64;

/// Inbound messages buffered ahead of the subscriber.
const INBOUND_CAPACITY: usize = 256;

/// [`Transport`] backed by a `rumqttc` client handle.
#[derive(Clone)]
pub struct MqttTransport {
    client: AsyncClient,
    subscriptions: Arc<Mutex<Vec<String>>>,
}

#[async_trait::async_trait]
impl Transport for MqttTransport {
    async fn subscribe(&self, filter: &str) -> Result<()> {
        self.client.subscribe(filter, QoS::AtLeastOnce).await?;
        let mut subscriptions = self.subscriptions.lock();
        if !subscriptions.iter().any(|s| s == filter) {
            subscriptions.push(filter.to_string());
        }
        Ok(())
    }

    async fn unsubscribe(&self, filter: &str) -> Result<()> {
        self.client.unsubscribe(filter).await?;
        self.subscriptions.lock().retain(|s| s != filter);
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await?;
        Ok(())
    }
}

/// Handle on the background event-loop task.
pub struct MqttConnection {
    client: AsyncClient,
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl MqttConnection {
    /// Connect to the broker and start the event loop.
    ///
    /// Returns the transport, the stream of inbound messages and the
    /// connection handle used for shutdown.
    pub async fn connect(
        config: &MqttConfig,
    ) -> Result<(MqttTransport, mpsc::Receiver<InboundMessage>, Self)> {
        let (client, mut eventloop) = AsyncClient::new(mqtt_options(config), REQUEST_CAPACITY);

        tokio::time::timeout(CONNECT_TIMEOUT, wait_for_connack(&mut eventloop))
            .await
            .map_err(|_| HomeMetricsError::Timeout {
                timeout_ms: u64::try_from(CONNECT_TIMEOUT.as_millis()).unwrap_or(u64::MAX),
            })??;

        tracing::info!("Connected to MQTT broker {}:{}", config.host, config.port);

        let transport = MqttTransport {
            client: client.clone(),
            subscriptions: Arc::new(Mutex::new(Vec::new())),
        };
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CAPACITY);
        let (shutdown, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(run_event_loop(
            eventloop,
            transport.clone(),
            inbound_tx,
            shutdown_rx,
        ));

        Ok((
            transport,
            inbound_rx,
            Self {
                client,
                shutdown,
                handle,
            },
        ))
    }

    /// Disconnect from the broker and stop the event loop.
    pub async fn shutdown(self) -> Result<()> {
        if let Err(e) = self.client.try_disconnect() {
            tracing::debug!("MQTT disconnect request failed: {}", e);
        }
        self.shutdown.send_replace(true);
        self.handle.await?;
        tracing::info!("MQTT connection closed");
        Ok(())
    }
}

fn mqtt_options(config: &MqttConfig) -> MqttOptions {
    let mut options = MqttOptions::new(config.client_id.as_str(), config.host.as_str(), config.port);
    options.set_keep_alive(config.keep_alive);
    options.set_max_packet_size(config.max_packet_size, config.max_packet_size);
    if let Some(username) = &config.username {
        options.set_credentials(
            username.as_str(),
            config.password.as_deref().unwrap_or_default(),
        );
    }
    options
}

async fn wait_for_connack(eventloop: &mut EventLoop) -> Result<()> {
    loop {
        if let Event::Incoming(Packet::ConnAck(ack)) = eventloop.poll().await? {
            return match ack.code {
                ConnectReturnCode::Success => Ok(()),
                code => Err(HomeMetricsError::transport(format!(
                    "broker refused connection: {code:?}"
                ))),
            };
        }
    }
}

async fn run_event_loop(
    mut eventloop: EventLoop,
    transport: MqttTransport,
    inbound: mpsc::Sender<InboundMessage>,
    mut shutdown: watch::Receiver<bool>,
) {
    let stopped = async move {
        let _ = shutdown.wait_for(|stop| *stop).await;
    };
    tokio::pin!(stopped);

    loop {
        tokio::select! {
            () = &mut stopped => break,
            event = eventloop.poll() => match event {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    let message = InboundMessage {
                        topic: publish.topic,
                        payload: publish.payload,
                    };
                    if inbound.send(message).await.is_err() {
                        tracing::debug!("Inbound channel closed, stopping MQTT event loop");
                        break;
                    }
                },
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    tracing::info!("Reconnected to MQTT broker");
                    resubscribe(&transport);
                },
                Ok(_) => {},
                Err(e) => {
                    tracing::warn!("MQTT connection error: {}, retrying in {:?}", e, RECONNECT_DELAY);
                    tokio::time::sleep(RECONNECT_DELAY).await;
                },
            },
        }
    }
}

fn resubscribe(transport: &MqttTransport) {
    let filters = transport.subscriptions.lock().clone();
    for filter in filters {
        if let Err(e) = transport.client.try_subscribe(filter.as_str(), QoS::AtLeastOnce) {
            tracing::error!("Failed to restore subscription {}: {}", filter, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_from_config() {
        let config = MqttConfig {
            host: "broker.lan".to_string(),
            port: 1884,
            client_id: "bridge-1".to_string(),
            username: Some("user".to_string()),
            password: None,
            keep_alive: Duration::from_secs(15),
            ..MqttConfig::default()
        };

        let options = mqtt_options(&config);
        assert_eq!(options.broker_address(), ("broker.lan".to_string(), 1884));
        assert_eq!(options.client_id(), "bridge-1");
        assert_eq!(options.keep_alive(), Duration::from_secs(15));
        assert_eq!(options.max_packet_size(), config.max_packet_size);
        assert_eq!(
            options.credentials(),
            Some(("user".to_string(), String::new()))
        );
    }

    #[test]
    fn test_default_packet_limit_fits_bridge_state_dumps() {
        let options = mqtt_options(&MqttConfig::default());
        assert_eq!(options.max_packet_size(), crate::core::config::DEFAULT_MAX_PACKET_SIZE);
        assert!(options.max_packet_size() > 10 * 1024);
    }

    #[tokio::test]
    async fn test_event_loop_task_is_spawnable() {
        let (client, eventloop) = AsyncClient::new(
            MqttOptions::new("spawn-check", "127.0.0.1", 1),
            REQUEST_CAPACITY,
        );
        let transport = MqttTransport {
            client,
            subscriptions: Arc::new(Mutex::new(Vec::new())),
        };
        let (inbound_tx, _inbound_rx) = mpsc::channel(1);
        let (shutdown, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(run_event_loop(eventloop, transport, inbound_tx, shutdown_rx));
        shutdown.send_replace(true);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_failure_is_an_error() {
        let config = MqttConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
            ..MqttConfig::default()
        };
        assert!(MqttConnection::connect(&config).await.is_err());
    }
}
