//! InfluxDB v2 HTTP writer.

use crate::core::config::InfluxConfig;
use crate::core::{HomeMetricsError, Metric, Result};
use crate::sink::line_protocol::encode_batch;
use crate::sink::BatchSink;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};

/// Writes batches through the `/api/v2/write` endpoint.
pub struct InfluxWriter {
    client: reqwest::Client,
    write_url: String,
    org: String,
    bucket: String,
    token: String,
}

impl InfluxWriter {
    /// Build a writer from the `influx` config section.
    pub fn new(config: &InfluxConfig) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            write_url: format!("{}/api/v2/write", config.address.trim_end_matches('/')),
            org: config.org.clone(),
            bucket: config.bucket.clone(),
            token: config.token.clone(),
        })
    }
}

#[async_trait::async_trait]
impl BatchSink for InfluxWriter {
    async fn write_batch(&self, batch: &[Metric]) -> Result<()> {
        let (body, skipped) = encode_batch(batch);
        if skipped > 0 {
            tracing::debug!("Skipped {} metrics without fields", skipped);
        }
        if body.is_empty() {
            return Ok(());
        }

        let mut request = self
            .client
            .post(&self.write_url)
            .query(&[
                ("org", self.org.as_str()),
                ("bucket", self.bucket.as_str()),
                ("precision", "ns"),
            ])
            .header(CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(body);
        if !self.token.is_empty() {
            request = request.header(AUTHORIZATION, format!("Token {}", self.token));
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(HomeMetricsError::SinkRejected {
            status: status.as_u16(),
            body,
        })
    }
}
