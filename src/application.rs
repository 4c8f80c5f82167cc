//! Main application wiring.

use crate::api;
use crate::core::{Config, Metric, Result};
use crate::ingest::{AliasTable, Dispatcher, EntityCache, Subscriber};
use crate::monitoring::PipelineStats;
use crate::sink::{BatchSink, BatchWriter, GaugeCollector, GaugeRegistry, GaugeSink, InfluxWriter};
use crate::transport::{MqttConnection, Transport};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

/// Where dispatched snapshots end up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkMode {
    /// Batch writes to InfluxDB
    Influx,
    /// Gauge registry served on `/metrics`
    Prometheus,
}

/// Coordinates the transport, ingest pipeline and sink.
pub struct Application {
    config: Config,
    stats: Arc<PipelineStats>,
}

impl Application {
    /// Create an application from validated configuration.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            stats: Arc::new(PipelineStats::new()),
        })
    }

    /// Shared pipeline counters.
    pub fn stats(&self) -> &Arc<PipelineStats> {
        &self.stats
    }

    /// Run until Ctrl-C.
    pub async fn run(self, mode: SinkMode) -> Result<()> {
        self.run_until(mode, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
        })
        .await
    }

    /// Run until `shutdown` resolves.
    pub async fn run_until<F>(self, mode: SinkMode, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        tracing::info!("Starting homemetrics ({:?} sink)", mode);

        // Sink construction errors surface before we touch the broker.
        let influx: Option<Arc<dyn BatchSink>> = match mode {
            SinkMode::Influx => {
                self.config.validate_influx()?;
                Some(Arc::new(InfluxWriter::new(&self.config.influx)?))
            },
            SinkMode::Prometheus => None,
        };

        let (transport, inbound, connection) = MqttConnection::connect(&self.config.mqtt).await?;
        let transport: Arc<dyn Transport> = Arc::new(transport);

        let aliases = AliasTable::from(self.config.aliases.clone());
        tracing::info!("Loaded {} aliases", aliases.len());
        let cache = Arc::new(EntityCache::with_max_entries(aliases, self.config.cache.max_entries));

        let (dispatcher, updates) = Dispatcher::new(
            self.config.pipeline.queue_capacity,
            self.config.pipeline.send_timeout,
            Arc::clone(&self.stats),
        );
        let dispatcher = Arc::new(dispatcher);

        let subscriber = Arc::new(
            Subscriber::start(
                transport,
                self.config.mqtt.topic.as_str(),
                cache,
                Arc::clone(&dispatcher),
                Arc::clone(&self.stats),
            )
            .await?,
        );

        let ingest = {
            let subscriber = Arc::clone(&subscriber);
            tokio::spawn(async move { subscriber.run(inbound).await })
        };

        let (stop_tx, stop_rx) = watch::channel(false);
        let sink_task = match influx {
            Some(sink) => {
                let writer = Arc::new(BatchWriter::new(
                    sink,
                    self.config.pipeline.flush_interval,
                    self.config.pipeline.max_retained,
                    Arc::clone(&self.stats),
                ));
                tokio::spawn(run_batch_writer(writer, updates))
            },
            None => {
                let registry = Arc::new(GaugeRegistry::new());
                let collector =
                    GaugeCollector::new(Arc::clone(&registry) as Arc<dyn GaugeSink>, Arc::clone(&self.stats));
                let http = self.config.http.clone();
                let stats = Arc::clone(&self.stats);
                tokio::spawn(async move {
                    let mut stop_rx = stop_rx;
                    let server_stop = async move {
                        let _ = stop_rx.wait_for(|stop| *stop).await;
                    };
                    let (served, ()) = tokio::join!(
                        api::serve(&http, registry, stats, server_stop),
                        collector.run(updates),
                    );
                    if let Err(e) = served {
                        tracing::error!("Metrics endpoint failed: {}", e);
                    }
                })
            },
        };

        shutdown.await;
        tracing::info!("Shutting down");

        // Closing the subscriber closes the dispatcher, which ends the
        // collectors once the queue is drained.
        if let Err(e) = subscriber.close().await {
            tracing::warn!("Failed to unsubscribe cleanly: {}", e);
        }
        stop_tx.send_replace(true);
        sink_task.await?;
        connection.shutdown().await?;
        ingest.await?;

        tracing::info!("Final pipeline stats: {:?}", self.stats.snapshot());
        Ok(())
    }
}

/// Collect dispatched snapshots and flush them on the writer's timer. The
/// collector ends once the dispatcher is closed and drained; only then is the
/// flush loop told to stop, so its final flush sees every collected record.
async fn run_batch_writer(writer: Arc<BatchWriter>, updates: mpsc::Receiver<Metric>) {
    let (flush_stop, flush_stop_rx) = watch::channel(false);
    let flusher = {
        let writer = Arc::clone(&writer);
        tokio::spawn(async move { writer.run(flush_stop_rx).await })
    };

    writer.collect(updates).await;
    flush_stop.send_replace(true);

    if let Err(e) = flusher.await {
        tracing::error!("Batch flush task failed: {}", e);
    }
}
