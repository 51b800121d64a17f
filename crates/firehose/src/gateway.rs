//! Thin reconnecting streamer for the gateway's batched read endpoint.
//!
//! The gateway serves an endless response of `data: {...}` frames, one
//! JSON envelope batch per frame. This client reconnects on failure with a
//! bounded budget of consecutive failures; exhausting the budget ends the
//! stream permanently.

use std::time::Duration;

use async_trait::async_trait;
use nozzle_core::{Error, Result};
use tracing::{debug, warn};
use url::Url;

use crate::adapter::{EnvelopeStream, StreamEvent, Streamer};
use crate::config::FirehoseConfig;
use crate::source::{CloseCode, SourceError};
use crate::wire::{EgressBatchRequest, EnvelopeBatch, WireEnvelope};

/// Streamer over the gateway's read endpoint.
pub struct GatewayStreamer {
    http: reqwest::Client,
    config: FirehoseConfig,
}

impl GatewayStreamer {
    pub fn new(config: FirehoseConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .danger_accept_invalid_certs(config.skip_ssl_verify)
            .build()
            .map_err(|e| Error::transport(e.to_string()))?;
        Ok(Self { http, config })
    }

    fn read_url(&self, request: &EgressBatchRequest) -> Result<Url> {
        let mut url = Url::parse(&self.config.endpoint)
            .map_err(|e| Error::config(format!("invalid gateway endpoint: {e}")))?;
        url.set_path("/v2/read");
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("shard_id", &request.shard_id);
            for selector in &request.selectors {
                query.append_key_only(selector.as_query_key());
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl Streamer for GatewayStreamer {
    async fn stream(&self, request: EgressBatchRequest) -> Box<dyn EnvelopeStream> {
        let url = self.read_url(&request);
        Box::new(GatewayStream {
            http: self.http.clone(),
            url,
            auth_token: self.config.auth_token.clone(),
            max_retries: self.config.gateway_retries,
            remaining_retries: self.config.gateway_retries,
            reconnecting: false,
            response: None,
            buffer: Vec::new(),
        })
    }
}

/// Pause between reconnect attempts so a hard-down gateway does not spin
/// the read loop hot.
const RECONNECT_DELAY: Duration = Duration::from_millis(500);

struct GatewayStream {
    http: reqwest::Client,
    url: Result<Url>,
    auth_token: Option<String>,
    max_retries: u32,
    remaining_retries: u32,
    reconnecting: bool,
    response: Option<reqwest::Response>,
    buffer: Vec<u8>,
}

impl GatewayStream {
    async fn connect(&mut self) -> Result<reqwest::Response> {
        let url = match &self.url {
            Ok(url) => url.clone(),
            Err(e) => return Err(Error::config(e.to_string())),
        };

        let mut request = self.http.get(url);
        if let Some(token) = &self.auth_token {
            request = request.header(reqwest::header::AUTHORIZATION, token.clone());
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::delivery(status.as_u16(), body));
        }

        debug!("Connected to gateway read endpoint");
        Ok(response)
    }

    /// Drains complete `data:` frames out of the buffer.
    fn take_frames(&mut self) -> Vec<WireEnvelope> {
        let mut envelopes = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim();
            let Some(payload) = line.strip_prefix("data:") else {
                continue;
            };
            match serde_json::from_str::<EnvelopeBatch>(payload.trim()) {
                Ok(batch) => envelopes.extend(batch.batch),
                Err(e) => warn!(error = %e, "Discarding undecodable gateway frame"),
            }
        }
        envelopes
    }

    fn disconnected(&mut self, error: SourceError) -> StreamEvent {
        self.response = None;
        self.buffer.clear();
        self.reconnecting = true;
        if self.remaining_retries == 0 {
            warn!("Gateway retry budget exhausted, stream is closing");
            return StreamEvent::Closed;
        }
        self.remaining_retries -= 1;
        StreamEvent::Error(error)
    }
}

#[async_trait]
impl EnvelopeStream for GatewayStream {
    async fn next(&mut self) -> StreamEvent {
        loop {
            if self.response.is_none() {
                if self.reconnecting {
                    tokio::time::sleep(RECONNECT_DELAY).await;
                }
                match self.connect().await {
                    Ok(response) => {
                        self.response = Some(response);
                        self.remaining_retries = self.max_retries;
                        self.reconnecting = false;
                    }
                    Err(e) => {
                        return self.disconnected(SourceError::Read(e.to_string()));
                    }
                }
            }

            let chunk = match self.response.as_mut() {
                Some(response) => response.chunk().await,
                None => continue,
            };

            match chunk {
                Ok(Some(bytes)) => {
                    self.buffer.extend_from_slice(&bytes);
                    let envelopes = self.take_frames();
                    if !envelopes.is_empty() {
                        return StreamEvent::Batch(envelopes);
                    }
                }
                Ok(None) => {
                    return self.disconnected(SourceError::ConnectionClosed {
                        code: CloseCode::Normal,
                        message: "server ended the event stream".to_string(),
                    });
                }
                Err(e) => {
                    return self.disconnected(SourceError::Read(e.to_string()));
                }
            }
        }
    }
}
