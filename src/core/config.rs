//! Configuration management for homemetrics.
//!
//! This module provides configuration handling with:
//! - YAML file support
//! - CLI argument overrides (see [`crate::cli`])
//! - Validation and defaults

use crate::core::{HomeMetricsError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;

/// Default MQTT packet size limit. Bridge state dumps such as a retained
/// device list easily exceed the client library's 10 KiB default.
pub const DEFAULT_MAX_PACKET_SIZE: usize = 1024 * 1024;

/// Complete configuration for homemetrics
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// MQTT broker and subscription
    pub mqtt: MqttConfig,
    /// InfluxDB sink
    pub influx: InfluxConfig,
    /// Scrape endpoint for the gauge registry
    pub http: HttpConfig,
    /// Dispatcher and batch writer tuning
    pub pipeline: PipelineConfig,
    /// Entity cache limits
    pub cache: CacheConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Display names keyed by `<metricName>:<id>`
    pub aliases: HashMap<String, String>,
}

/// MQTT configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// Broker hostname
    pub host: String,
    /// Broker port
    pub port: u16,
    /// Client id presented to the broker
    pub client_id: String,
    /// Optional username
    pub username: Option<String>,
    /// Optional password
    pub password: Option<String>,
    /// Topic filter to subscribe to
    pub topic: String,
    /// Keep-alive interval
    #[serde(with = "humantime_serde")]
    pub keep_alive: Duration,
    /// Largest packet accepted from or sent to the broker, in bytes
    pub max_packet_size: usize,
}

/// InfluxDB v2 configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InfluxConfig {
    /// Base URL of the InfluxDB server
    pub address: String,
    /// API token
    pub token: String,
    /// Organization name
    pub org: String,
    /// Bucket name
    pub bucket: String,
    /// Per-request timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

/// HTTP scrape endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Bind address
    pub bind_address: IpAddr,
    /// Listen port
    pub port: u16,
}

/// Pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Dispatcher queue capacity
    pub queue_capacity: usize,
    /// How long a send waits for queue space before dropping
    #[serde(with = "humantime_serde")]
    pub send_timeout: Duration,
    /// Batch flush interval
    #[serde(with = "humantime_serde")]
    pub flush_interval: Duration,
    /// Records kept for retry after a failed flush
    pub max_retained: usize,
}

/// Entity cache configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of entities; unbounded when unset
    pub max_entries: Option<usize>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: LogLevel,
    /// Include targets, thread ids and line numbers
    pub structured: bool,
}

/// Log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            mqtt: MqttConfig::default(),
            influx: InfluxConfig::default(),
            http: HttpConfig::default(),
            pipeline: PipelineConfig::default(),
            cache: CacheConfig::default(),
            logging: LoggingConfig::default(),
            aliases: HashMap::new(),
        }
    }
}

impl Default for MqttConfig {
    fn default() -> Self {
        MqttConfig {
            host: "localhost".to_string(),
            port: 1883,
            client_id: "homemetrics".to_string(),
            username: None,
            password: None,
            topic: "home/#".to_string(),
            keep_alive: Duration::from_secs(30),
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
        }
    }
}

impl Default for InfluxConfig {
    fn default() -> Self {
        InfluxConfig {
            address: "http://localhost:8086".to_string(),
            token: String::new(),
            org: String::new(),
            bucket: String::new(),
            timeout: Duration::from_secs(10),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        HttpConfig {
            bind_address: IpAddr::from([0, 0, 0, 0]),
            port: 8080,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            queue_capacity: 50,
            send_timeout: Duration::from_secs(5),
            flush_interval: Duration::from_secs(1),
            max_retained: 100,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: LogLevel::Info,
            structured: false,
        }
    }
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Result<Self> {
        let config = Config::default();
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.mqtt.topic.trim().is_empty() {
            return Err(HomeMetricsError::config("mqtt.topic must not be empty"));
        }

        if self.mqtt.host.trim().is_empty() {
            return Err(HomeMetricsError::config("mqtt.host must not be empty"));
        }

        if self.mqtt.max_packet_size == 0 {
            return Err(HomeMetricsError::config("mqtt.max_packet_size must be greater than 0"));
        }

        if self.pipeline.queue_capacity == 0 {
            return Err(HomeMetricsError::config("queue_capacity must be greater than 0"));
        }

        if self.pipeline.send_timeout.is_zero() {
            return Err(HomeMetricsError::config("send_timeout must be greater than 0"));
        }

        if self.pipeline.flush_interval.is_zero() {
            return Err(HomeMetricsError::config("flush_interval must be greater than 0"));
        }

        if self.pipeline.max_retained == 0 {
            return Err(HomeMetricsError::config("max_retained must be greater than 0"));
        }

        if self.cache.max_entries == Some(0) {
            return Err(HomeMetricsError::config("cache.max_entries must be greater than 0"));
        }

        Ok(())
    }

    /// Validate the settings the InfluxDB sink needs
    pub fn validate_influx(&self) -> Result<()> {
        if self.influx.bucket.is_empty() {
            return Err(HomeMetricsError::config("influx.bucket must be set"));
        }
        if self.influx.org.is_empty() {
            return Err(HomeMetricsError::config("influx.org must be set"));
        }
        if !self.influx.address.starts_with("http://") && !self.influx.address.starts_with("https://") {
            return Err(HomeMetricsError::config(format!(
                "influx.address must be an http(s) URL, got '{}'",
                self.influx.address
            )));
        }
        Ok(())
    }
}

impl LogLevel {
    /// Convert to tracing filter string
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Configuration builder for programmatic construction
pub struct ConfigBuilder {
    config: Config,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigBuilder {
    /// Create a new builder with defaults
    pub fn new() -> Self {
        ConfigBuilder {
            config: Config::default(),
        }
    }

    /// Load configuration from YAML string
    pub fn from_yaml(mut self, yaml: &str) -> Result<Self> {
        self.config = serde_yaml::from_str(yaml)
            .map_err(|e| HomeMetricsError::config(format!("Failed to parse YAML config: {}", e)))?;
        Ok(self)
    }

    /// Set MQTT topic filter
    pub fn mqtt_topic(mut self, topic: impl Into<String>) -> Self {
        self.config.mqtt.topic = topic.into();
        self
    }

    /// Set MQTT broker hostname
    pub fn mqtt_host(mut self, host: impl Into<String>) -> Self {
        self.config.mqtt.host = host.into();
        self
    }

    /// Set MQTT broker port
    pub fn mqtt_port(mut self, port: u16) -> Self {
        self.config.mqtt.port = port;
        self
    }

    /// Set MQTT client id
    pub fn mqtt_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.config.mqtt.client_id = client_id.into();
        self
    }

    /// Set MQTT credentials
    pub fn mqtt_credentials(mut self, username: Option<String>, password: Option<String>) -> Self {
        if username.is_some() {
            self.config.mqtt.username = username;
        }
        if password.is_some() {
            self.config.mqtt.password = password;
        }
        self
    }

    /// Set InfluxDB address
    pub fn influx_address(mut self, address: impl Into<String>) -> Self {
        self.config.influx.address = address.into();
        self
    }

    /// Set InfluxDB token
    pub fn influx_token(mut self, token: impl Into<String>) -> Self {
        self.config.influx.token = token.into();
        self
    }

    /// Set InfluxDB organization
    pub fn influx_org(mut self, org: impl Into<String>) -> Self {
        self.config.influx.org = org.into();
        self
    }

    /// Set InfluxDB bucket
    pub fn influx_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.config.influx.bucket = bucket.into();
        self
    }

    /// Set scrape endpoint port
    pub fn http_port(mut self, port: u16) -> Self {
        self.config.http.port = port;
        self
    }

    /// Set dispatcher queue capacity
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.pipeline.queue_capacity = capacity;
        self
    }

    /// Set batch flush interval
    pub fn flush_interval(mut self, interval: std::time::Duration) -> Self {
        self.config.pipeline.flush_interval = interval;
        self
    }

    /// Cap the entity cache
    pub fn max_entries(mut self, max: Option<usize>) -> Self {
        self.config.cache.max_entries = max;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.pipeline.queue_capacity, 50);
        assert_eq!(config.pipeline.send_timeout, Duration::from_secs(5));
        assert_eq!(config.pipeline.max_retained, 100);
        assert_eq!(config.mqtt.max_packet_size, DEFAULT_MAX_PACKET_SIZE);
    }

    #[test]
    fn test_empty_topic_rejected() {
        let config = ConfigBuilder::new().mqtt_topic("  ").build();
        assert!(config.is_err());
    }

    #[test]
    fn test_zero_limits_rejected() {
        let mut config = Config::default();
        config.pipeline.max_retained = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.cache.max_entries = Some(0);
        assert!(config.validate().is_err());

        let config = ConfigBuilder::new().queue_capacity(0).build();
        assert!(config.is_err());
    }


    #[test]
    fn test_influx_validation() {
        let config = ConfigBuilder::new()
            .influx_org("home")
            .influx_bucket("sensors")
            .build()
            .unwrap();
        assert!(config.validate_influx().is_ok());

        let config = ConfigBuilder::new()
            .influx_address("localhost:8086")
            .influx_org("home")
            .influx_bucket("sensors")
            .build()
            .unwrap();
        assert!(config.validate_influx().is_err());

        assert!(Config::default().validate_influx().is_err());
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r#"
mqtt:
  host: broker.lan
  port: 8883
  topic: "zigbee/#"
  keep_alive: 1m
pipeline:
  queue_capacity: 200
  flush_interval: 500ms
cache:
  max_entries: 1000
logging:
  level: debug
aliases:
  "zigbee_sensor:0x01": Kitchen
"#;

        let config = ConfigBuilder::new().from_yaml(yaml).unwrap().build().unwrap();

        assert_eq!(config.mqtt.host, "broker.lan");
        assert_eq!(config.mqtt.port, 8883);
        assert_eq!(config.mqtt.keep_alive, Duration::from_secs(60));
        assert_eq!(config.mqtt.client_id, "homemetrics");
        assert_eq!(config.pipeline.queue_capacity, 200);
        assert_eq!(config.pipeline.flush_interval, Duration::from_millis(500));
        assert_eq!(config.pipeline.max_retained, 100);
        assert_eq!(config.cache.max_entries, Some(1000));
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(
            config.aliases.get("zigbee_sensor:0x01").map(String::as_str),
            Some("Kitchen")
        );
    }
}
