//! HEC delivery client.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use nozzle_core::{Error, EventFields, Result, RoutedRecord};
use serde::Serialize;
use telemetry::metrics;
use tracing::warn;

use crate::config::HecConfig;

const COLLECTOR_PATH: &str = "/services/collector";
const APP_NAME: &str = "firehose-nozzle";

/// Delivery client contract: ship one batch of routed records.
#[async_trait]
pub trait EventWriter: Send + Sync {
    async fn write(&self, events: &[RoutedRecord]) -> Result<()>;
}

/// One record as framed for the collector endpoint.
#[derive(Serialize)]
struct HecEnvelope<'a> {
    event: &'a EventFields,
    #[serde(skip_serializing_if = "Option::is_none")]
    index: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<&'a BTreeMap<String, String>>,
}

/// HTTP client for the collector endpoint.
pub struct HecClient {
    http: reqwest::Client,
    config: HecConfig,
}

impl HecClient {
    pub fn new(config: HecConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .danger_accept_invalid_certs(config.skip_ssl_verify)
            .build()
            .map_err(transport_error)?;
        Ok(Self { http, config })
    }

    /// Serializes a batch into the collector body: one JSON object per
    /// record, double-newline separated, no trailing separator. A record
    /// that fails to serialize is skipped with a warning; the rest of the
    /// batch proceeds.
    fn encode(&self, events: &[RoutedRecord]) -> Vec<u8> {
        let mut body = Vec::new();
        for record in events {
            let index = record
                .index_override()
                .or_else(|| non_empty(&self.config.index));
            let fields = if self.config.fields.is_empty() {
                None
            } else {
                Some(&self.config.fields)
            };

            let envelope = HecEnvelope {
                event: record.event(),
                index,
                fields,
            };
            match serde_json::to_vec(&envelope) {
                Ok(json) => {
                    if !body.is_empty() {
                        body.extend_from_slice(b"\n\n");
                    }
                    body.extend_from_slice(&json);
                }
                Err(e) => {
                    metrics().records_skipped_serialization.inc();
                    warn!(error = %e, "Failed to serialize record, skipping");
                }
            }
        }
        body
    }

    async fn send(&self, body: Vec<u8>) -> Result<()> {
        let endpoint = format!(
            "{}{}",
            self.config.host.trim_end_matches('/'),
            COLLECTOR_PATH
        );

        let response = self
            .http
            .post(&endpoint)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(reqwest::header::CONNECTION, "keep-alive")
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Splunk {}", self.config.token),
            )
            .header("__splunk_app_name", APP_NAME)
            .header("__splunk_app_version", env!("CARGO_PKG_VERSION"))
            .body(body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status().as_u16();
        if status > 299 {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::delivery(status, body));
        }

        // Drain the body so the connection can be reused.
        let _ = response.bytes().await;
        Ok(())
    }
}

#[async_trait]
impl EventWriter for HecClient {
    async fn write(&self, events: &[RoutedRecord]) -> Result<()> {
        let body = self.encode(events);
        if self.config.debug {
            println!("{}", String::from_utf8_lossy(&body));
            return Ok(());
        }
        self.send(body).await
    }
}

fn non_empty(s: &str) -> Option<&str> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

/// Flattens a reqwest error with its source chain so connection failures
/// stay identifiable in logs and returned errors.
fn transport_error(e: reqwest::Error) -> Error {
    let mut message = e.to_string();
    let mut source = std::error::Error::source(&e);
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    Error::transport(message)
}
