//! homemetrics - MQTT home-automation telemetry bridge.
//!
//! Devices publish single values on topics shaped like
//! `<segment>/…/<id>/<field>` (at least five segments, the id second to
//! last). homemetrics folds those values
//! into one record per entity and forwards every updated record to a sink.
//!
//! # Features
//!
//! - **Topic parsing**: metric name, `id`/`name` tags and field from the topic
//! - **Payload decoding**: JSON scalars and `{"value": ...}` envelopes
//! - **Entity cache**: latest field values per entity, snapshot per update
//! - **Bounded dispatch**: ordered queue with a send timeout that drops
//! - **Sinks**: batched InfluxDB writes or a Prometheus gauge endpoint
//!
//! # Architecture
//!
//! - `transport`: broker connection (`rumqttc`) behind a small trait
//! - `ingest`: topic parser, payload decoder, entity cache, dispatcher, subscriber
//! - `sink`: batch writer, InfluxDB line protocol writer, gauge registry
//! - `api`: `/metrics` and `/health` endpoints
//! - `core`: configuration, errors and the metric type
//! - `cli`: command-line interface
//!
//! # Example
//!
//! ```no_run
//! use homemetrics_lib::core::Config;
//! use homemetrics_lib::{Application, SinkMode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let app = Application::new(config)?;
//!     app.run(SinkMode::Prometheus).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod api;
pub mod application;
pub mod cli;
pub mod core;
pub mod ingest;
pub mod monitoring;
pub mod sink;
pub mod transport;

// Re-export core types for convenience
pub use crate::application::{Application, SinkMode};
pub use crate::core::{Config, Result};
