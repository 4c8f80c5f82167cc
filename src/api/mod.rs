//! Minimal HTTP API for the gauge registry.
//!
//! - `GET /metrics`: Prometheus text exposition of every gauge
//! - `GET /health`: pipeline counters as JSON

use crate::core::config::HttpConfig;
use crate::core::Result;
use crate::monitoring::{PipelineStats, StatsSnapshot};
use crate::sink::GaugeRegistry;
use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use serde::Serialize;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Content type of the Prometheus text format.
pub const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// API server state.
#[derive(Clone)]
struct ApiState {
    registry: Arc<GaugeRegistry>,
    stats: Arc<PipelineStats>,
}

/// Health check response.
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    gauges: usize,
    pipeline: StatsSnapshot,
}

/// Build the router.
pub fn router(registry: Arc<GaugeRegistry>, stats: Arc<PipelineStats>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(ApiState { registry, stats })
}

/// Serve the API until `shutdown` resolves.
pub async fn serve<F>(
    config: &HttpConfig,
    registry: Arc<GaugeRegistry>,
    stats: Arc<PipelineStats>,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = SocketAddr::new(config.bind_address, config.port);
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Serving metrics on http://{}/metrics", addr);

    axum::serve(listener, router(registry, stats))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

async fn metrics_handler(State(state): State<ApiState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)],
        state.registry.render(),
    )
}

async fn health_handler(State(state): State<ApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        gauges: state.registry.len(),
        pipeline: state.stats.snapshot(),
    })
}
