//! Command-line interface for homemetrics.
//!
//! One binary, two sinks: `homemetrics influxdb` batches snapshots into
//! InfluxDB, `homemetrics prometheus` serves them as gauges. Trailing
//! `metricName:id=Display Name` arguments add aliases.

use crate::application::{Application, SinkMode};
use crate::core::config::{ConfigBuilder, LoggingConfig};
use crate::core::{Config, HomeMetricsError, Result};
use crate::ingest::AliasTable;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Bridge home-automation MQTT telemetry into InfluxDB or Prometheus.
#[derive(Parser, Debug)]
#[command(name = "homemetrics")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path (default: ~/.config/homemetrics/config.yaml)
    #[arg(short, long, global = true, env = "HOMEMETRICS_CONFIG")]
    pub config: Option<PathBuf>,

    /// MQTT topic filter, e.g. `home/#`
    #[arg(long, global = true, env = "HOMEMETRICS_MQTT_TOPIC")]
    pub mqtt_topic: Option<String>,

    /// MQTT broker hostname
    #[arg(long, global = true, env = "HOMEMETRICS_MQTT_HOSTNAME")]
    pub mqtt_hostname: Option<String>,

    /// MQTT broker port
    #[arg(long, global = true, env = "HOMEMETRICS_MQTT_PORT")]
    pub mqtt_port: Option<u16>,

    /// Client id presented to the broker
    #[arg(long, global = true, env = "HOMEMETRICS_MQTT_CLIENT_ID")]
    pub mqtt_client_id: Option<String>,

    /// MQTT username
    #[arg(long, global = true, env = "HOMEMETRICS_MQTT_USERNAME")]
    pub mqtt_username: Option<String>,

    /// MQTT password
    #[arg(long, global = true, env = "HOMEMETRICS_MQTT_PASSWORD", hide_env_values = true)]
    pub mqtt_password: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true, env = "HOMEMETRICS_DEBUG")]
    pub debug: bool,

    /// Validate configuration and exit
    #[arg(long, global = true)]
    pub check_config: bool,

    /// Sink to run
    #[command(subcommand)]
    pub command: Command,
}

/// Sink selection.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Write snapshots to InfluxDB in periodic batches
    Influxdb {
        /// InfluxDB base URL
        #[arg(long, env = "HOMEMETRICS_INFLUX_ADDRESS")]
        influx_address: Option<String>,

        /// InfluxDB API token
        #[arg(long, env = "HOMEMETRICS_INFLUX_TOKEN", hide_env_values = true)]
        influx_token: Option<String>,

        /// InfluxDB organization
        #[arg(long, env = "HOMEMETRICS_INFLUX_ORG")]
        influx_org: Option<String>,

        /// InfluxDB bucket
        #[arg(long, env = "HOMEMETRICS_INFLUX_BUCKET")]
        influx_bucket: Option<String>,

        /// Aliases as `metricName:id=Display Name`
        #[arg(value_name = "ALIAS")]
        aliases: Vec<String>,
    },

    /// Expose snapshots as gauges on an HTTP `/metrics` endpoint
    Prometheus {
        /// Port for the metrics endpoint
        #[arg(long, env = "HOMEMETRICS_HTTP_PORT")]
        http_port: Option<u16>,

        /// Aliases as `metricName:id=Display Name`
        #[arg(value_name = "ALIAS")]
        aliases: Vec<String>,
    },
}

impl Command {
    /// Sink this command runs.
    pub fn mode(&self) -> SinkMode {
        match self {
            Command::Influxdb { .. } => SinkMode::Influx,
            Command::Prometheus { .. } => SinkMode::Prometheus,
        }
    }

    fn aliases(&self) -> &[String] {
        match self {
            Command::Influxdb { aliases, .. } | Command::Prometheus { aliases, .. } => aliases,
        }
    }
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Config file to read: the explicit `--config`, else the default
    /// location if a file exists there.
    pub fn config_path(&self) -> Option<PathBuf> {
        if let Some(path) = &self.config {
            return Some(path.clone());
        }
        dirs::config_dir()
            .map(|d| d.join("homemetrics").join("config.yaml"))
            .filter(|path| path.exists())
    }

    /// Load configuration with precedence:
    /// 1. CLI arguments and their environment variables
    /// 2. Config file
    /// 3. Defaults
    pub async fn load_config(&self) -> Result<Config> {
        let mut builder = ConfigBuilder::new();

        if let Some(path) = self.config_path() {
            let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
                HomeMetricsError::config(format!("Failed to read config file {:?}: {}", path, e))
            })?;
            builder = builder.from_yaml(&content)?;
        }

        self.build_config_from_args(builder)
    }

    fn build_config_from_args(&self, mut builder: ConfigBuilder) -> Result<Config> {
        if let Some(topic) = &self.mqtt_topic {
            builder = builder.mqtt_topic(topic.as_str());
        }
        if let Some(host) = &self.mqtt_hostname {
            builder = builder.mqtt_host(host.as_str());
        }
        if let Some(port) = self.mqtt_port {
            builder = builder.mqtt_port(port);
        }
        if let Some(client_id) = &self.mqtt_client_id {
            builder = builder.mqtt_client_id(client_id.as_str());
        }
        builder = builder.mqtt_credentials(self.mqtt_username.clone(), self.mqtt_password.clone());

        match &self.command {
            Command::Influxdb {
                influx_address,
                influx_token,
                influx_org,
                influx_bucket,
                ..
            } => {
                if let Some(address) = influx_address {
                    builder = builder.influx_address(address.as_str());
                }
                if let Some(token) = influx_token {
                    builder = builder.influx_token(token.as_str());
                }
                if let Some(org) = influx_org {
                    builder = builder.influx_org(org.as_str());
                }
                if let Some(bucket) = influx_bucket {
                    builder = builder.influx_bucket(bucket.as_str());
                }
            },
            Command::Prometheus { http_port, .. } => {
                if let Some(port) = http_port {
                    builder = builder.http_port(*port);
                }
            },
        }

        builder.build()
    }

    /// Merge trailing alias arguments over the config file's `aliases`.
    /// Malformed arguments are logged and skipped, so call this after
    /// [`init_logging`](Self::init_logging).
    pub fn merge_aliases(&self, config: &mut Config) {
        config
            .aliases
            .extend(AliasTable::from_args(self.command.aliases()));
    }

    /// Initialize logging. `RUST_LOG` wins, then `HOMEMETRICS_LOG_LEVEL`,
    /// then the configured level; `--debug` overrides the latter two.
    pub fn init_logging(&self, logging: &LoggingConfig) -> Result<()> {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

        let log_level = if self.debug {
            "debug".to_string()
        } else {
            std::env::var("HOMEMETRICS_LOG_LEVEL").unwrap_or_else(|_| logging.level.as_str().to_string())
        };

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

        let fmt_layer = if logging.structured {
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_line_number(true)
                .compact()
        } else {
            tracing_subscriber::fmt::layer().with_target(false).compact()
        };

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| HomeMetricsError::config(format!("Failed to initialize logging: {}", e)))?;

        Ok(())
    }
}

/// Execute the homemetrics application.
pub async fn execute(cli: Cli) -> Result<()> {
    let mut config = cli.load_config().await?;
    cli.init_logging(&config.logging)?;
    cli.merge_aliases(&mut config);

    match cli.config_path() {
        Some(path) => tracing::info!("Loaded configuration from: {:?}", path),
        None => tracing::debug!("No config file found, using defaults"),
    }

    let mode = cli.command.mode();
    if cli.check_config {
        if mode == SinkMode::Influx {
            config.validate_influx()?;
        }
        println!("Configuration is valid!");
        println!("  MQTT broker: {}:{}", config.mqtt.host, config.mqtt.port);
        println!("  Topic: {}", config.mqtt.topic);
        println!("  Aliases: {}", config.aliases.len());
        match mode {
            SinkMode::Influx => println!(
                "  InfluxDB: {} ({}/{})",
                config.influx.address, config.influx.org, config.influx.bucket
            ),
            SinkMode::Prometheus => println!(
                "  Metrics endpoint: {}:{}",
                config.http.bind_address, config.http.port
            ),
        }
        return Ok(());
    }

    Application::new(config)?.run(mode).await
}
