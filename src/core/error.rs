use thiserror::Error;

#[derive(Error, Debug)]
pub enum HomeMetricsError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Payload decode error: {0}")]
    Decode(String),

    #[error("Sink error: {0}")]
    Sink(String),

    #[error("Sink rejected batch: HTTP {status}: {body}")]
    SinkRejected { status: u16, body: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("MQTT client error: {0}")]
    MqttClient(#[from] rumqttc::ClientError),

    #[error("MQTT connection error: {0}")]
    MqttConnection(#[from] rumqttc::ConnectionError),

    #[error("Async task join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("Timeout error: operation took longer than {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

/// Result type alias for homemetrics operations
pub type Result<T> = std::result::Result<T, HomeMetricsError>;

impl HomeMetricsError {
    /// Creates a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a new transport error
    pub fn transport<S: Into<String>>(msg: S) -> Self {
        Self::Transport(msg.into())
    }

    /// Creates a new decode error
    pub fn decode<S: Into<String>>(msg: S) -> Self {
        Self::Decode(msg.into())
    }

    /// Creates a new sink error
    pub fn sink<S: Into<String>>(msg: S) -> Self {
        Self::Sink(msg.into())
    }

    /// Returns the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Transport(_) | Self::MqttClient(_) | Self::MqttConnection(_) => "transport",
            Self::Decode(_) => "decode",
            Self::Sink(_) | Self::SinkRejected { .. } | Self::Http(_) => "sink",
            Self::Io(_) => "io",
            Self::Join(_) => "async",
            Self::Timeout { .. } => "timeout",
        }
    }
}
