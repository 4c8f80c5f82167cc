//! Downstream telemetry sinks.
//!
//! Two call contracts are supported:
//! - [`BatchSink`]: a time-series writer that takes a whole batch and either
//!   accepts or rejects all of it. [`BatchWriter`] feeds it on a timer.
//! - [`GaugeSink`]: a metrics registry that holds the latest value of each
//!   gauge. [`GaugeCollector`] feeds it as snapshots arrive.

pub mod batch;
pub mod gauge;
pub mod influx;
pub mod line_protocol;

use crate::core::{Metric, Result};

pub use batch::{BatchWriter, FlushOutcome};
pub use gauge::{GaugeCollector, GaugeRegistry, Label};
pub use influx::InfluxWriter;

/// Time-series writer accepting whole batches.
#[async_trait::async_trait]
pub trait BatchSink: Send + Sync {
    /// Write every record in `batch`. An error means none should be
    /// considered delivered.
    async fn write_batch(&self, batch: &[Metric]) -> Result<()>;
}

/// Metrics registry holding gauges keyed by name parts and labels.
pub trait GaugeSink: Send + Sync {
    /// Set the gauge identified by `key` and `labels` to `value`.
    fn set_gauge(&self, key: &[&str], value: f64, labels: &[Label]);
}
