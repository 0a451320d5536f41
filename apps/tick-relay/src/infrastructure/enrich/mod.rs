//! Enrichment HTTP Adapter
//!
//! Best-effort augmentation of ticks with fields from the internal
//! `market_data` endpoint. Every failure mode (timeout, non-2xx status,
//! malformed or non-object body) degrades to the bare tick; enrichment can
//! never fail the pipeline, only log.

use std::time::Duration;

use async_trait::async_trait;

use crate::application::ports::Enrich;
use crate::domain::tick::{EnrichedTick, Tick};

/// Enricher that fetches auxiliary fields over HTTP.
///
/// The fetch timeout bounds how long a tick can be delayed; there are no
/// synchronous retries.
pub struct HttpEnricher {
    client: reqwest::Client,
    url: String,
}

impl HttpEnricher {
    /// Create an enricher against `url` with a per-fetch timeout.
    ///
    /// # Errors
    ///
    /// Returns `reqwest::Error` if the HTTP client cannot be constructed.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// Fetch the enrichment body, or explain why there is none.
    async fn fetch(&self) -> Result<serde_json::Map<String, serde_json::Value>, String> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("non-success status: {status}"));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| format!("malformed body: {e}"))?;

        match body {
            serde_json::Value::Object(fields) => Ok(fields),
            other => Err(format!("body is not a JSON object: {other}")),
        }
    }
}

#[async_trait]
impl Enrich for HttpEnricher {
    async fn enrich(&self, tick: Tick) -> EnrichedTick {
        let mut enriched = EnrichedTick::bare(tick);

        match self.fetch().await {
            Ok(fields) => enriched.merge(fields),
            Err(reason) => {
                tracing::debug!(url = %self.url, %reason, "Enrichment skipped");
            }
        }

        enriched
    }
}

/// Enricher used when no enrichment endpoint is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEnricher;

#[async_trait]
impl Enrich for NoopEnricher {
    async fn enrich(&self, tick: Tick) -> EnrichedTick {
        EnrichedTick::bare(tick)
    }
}
