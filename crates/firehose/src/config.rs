//! Firehose source configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the firehose subscription and gateway transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirehoseConfig {
    /// Gateway base URL for the batched-streaming read endpoint.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Shard id for the subscription. Consumers sharing an id split the
    /// stream between them.
    #[serde(default = "default_subscription_id")]
    pub subscription_id: String,
    /// Bearer token sent to the gateway, when it requires one.
    #[serde(default)]
    pub auth_token: Option<String>,
    /// Consecutive reconnect failures tolerated before the source gives up.
    #[serde(default = "default_gateway_retries")]
    pub gateway_retries: u32,
    /// Skip TLS certificate verification towards the gateway.
    #[serde(default)]
    pub skip_ssl_verify: bool,
    /// Connect timeout in milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

fn default_endpoint() -> String {
    "http://localhost:8088".to_string()
}

fn default_subscription_id() -> String {
    "firehose-nozzle".to_string()
}

fn default_gateway_retries() -> u32 {
    10
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

impl Default for FirehoseConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            subscription_id: default_subscription_id(),
            auth_token: None,
            gateway_retries: default_gateway_retries(),
            skip_ssl_verify: false,
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}
