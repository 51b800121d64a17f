//! Firehose-to-HEC nozzle.
//!
//! Reads telemetry envelopes from the platform firehose, enriches them
//! with workload ownership metadata, filters them down to the configured
//! event kinds, and delivers them in batches to an HEC ingestion endpoint.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info};

use firehose::{FirehoseConfig, GatewayStreamer, StreamerSource};
use hec_sink::{BatchingSink, HecClient, HecConfig, SinkConfig};
use metadata::{CacheConfig, HttpResolver, MetadataCache};
use nozzle::{
    parse_extra_fields, parse_ownership_fields, Nozzle, NozzleConfig, Router, RouterConfig,
};
use nozzle_core::{parse_wanted_kinds, Sink};
use telemetry::init_tracing_from_env;

/// Application configuration.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct Config {
    /// Comma-separated allow-list of event kinds to forward.
    #[serde(default = "default_wanted_events")]
    wanted_events: String,

    /// Comma-separated ownership fields to attach; empty disables
    /// enrichment.
    #[serde(default)]
    add_workload_info: String,

    /// Discard envelopes whose workload cannot be resolved.
    #[serde(default)]
    ignore_missing_workloads: bool,

    /// Static extra fields, shaped `name:value,name2:value2`.
    #[serde(default)]
    extra_fields: String,

    /// Queue capacity between the read loop and routing workers.
    #[serde(default = "default_routing_queue_capacity")]
    routing_queue_capacity: usize,

    /// Received-count report interval in seconds; 0 disables it.
    #[serde(default)]
    status_interval_secs: u64,

    /// Control-plane API endpoint for workload metadata.
    #[serde(default = "default_api_endpoint")]
    api_endpoint: String,

    /// Skip TLS verification towards the control plane.
    #[serde(default)]
    api_skip_ssl_verify: bool,

    #[serde(default)]
    cache: CacheConfig,

    #[serde(default)]
    firehose: FirehoseConfig,

    #[serde(default)]
    hec: HecConfig,

    #[serde(default)]
    sink: SinkConfig,
}

fn default_wanted_events() -> String {
    "LogMessage".to_string()
}

fn default_routing_queue_capacity() -> usize {
    5000
}

fn default_api_endpoint() -> String {
    "http://localhost:9911".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            wanted_events: default_wanted_events(),
            add_workload_info: String::new(),
            ignore_missing_workloads: false,
            extra_fields: String::new(),
            routing_queue_capacity: default_routing_queue_capacity(),
            status_interval_secs: 0,
            api_endpoint: default_api_endpoint(),
            api_skip_ssl_verify: false,
            cache: CacheConfig::default(),
            firehose: FirehoseConfig::default(),
            hec: HecConfig::default(),
            sink: SinkConfig::default(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    init_tracing_from_env();

    info!("Starting firehose-nozzle v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config()?;

    if config.cache.positive_ttl_secs == 0
        && config.cache.refresh_interval_secs == 0
        && config.cache.negative_ttl_secs > 0
    {
        info!(
            "Workload metadata is not cached; the negative-cache TTL has no effect without \
             positive caching"
        );
    }

    let wanted_kinds =
        parse_wanted_kinds(&config.wanted_events).context("Invalid wanted_events")?;
    let ownership_fields =
        parse_ownership_fields(&config.add_workload_info).context("Invalid add_workload_info")?;
    let extra_fields = parse_extra_fields(&config.extra_fields).context("Invalid extra_fields")?;

    // Metadata cache; disabled entirely when enrichment is off.
    let cache = if ownership_fields.is_empty() {
        Arc::new(MetadataCache::disabled())
    } else {
        let resolver = HttpResolver::new(config.api_endpoint.as_str(), config.api_skip_ssl_verify)
            .context("Failed to create metadata resolver")?;
        Arc::new(MetadataCache::new(Arc::new(resolver), config.cache.clone()))
    };
    let _refresh_handle = MetadataCache::start_refresh_task(cache.clone());

    // Delivery side
    let writer = HecClient::new(config.hec.clone()).context("Failed to create HEC client")?;
    let sink = Arc::new(BatchingSink::new(Arc::new(writer), config.sink.clone()));
    sink.open().await.context("Failed to open batching sink")?;

    // Routing and dispatch
    let router = Arc::new(Router::new(
        RouterConfig {
            wanted_kinds,
            ownership_fields,
            ignore_missing_workloads: config.ignore_missing_workloads,
            extra_fields,
        },
        cache,
        sink.clone(),
    ));

    let streamer = GatewayStreamer::new(config.firehose.clone())
        .context("Failed to create gateway streamer")?;
    let source = Arc::new(StreamerSource::new(streamer, config.firehose.clone()));

    let status_interval = match config.status_interval_secs {
        0 => None,
        secs => Some(Duration::from_secs(secs)),
    };
    let dispatcher = Arc::new(Nozzle::new(
        source,
        router,
        NozzleConfig {
            routing_queue_capacity: config.routing_queue_capacity,
            status_interval,
        },
    ));

    let running = dispatcher.clone();
    let mut pipeline = tokio::spawn(async move { running.start().await });

    let mut fatal: Option<anyhow::Error> = None;
    tokio::select! {
        _ = shutdown_signal() => {
            info!("Shutting down...");
            if let Err(e) = dispatcher.close().await {
                error!("Failed to close dispatcher: {}", e);
            }
            let _ = pipeline.await;
        }
        result = &mut pipeline => {
            // The source exhausted its retries; this is the only
            // process-fatal condition.
            match result {
                Ok(Ok(())) => info!("Firehose stream ended"),
                Ok(Err(e)) => {
                    error!("Firehose stream ended with error: {}", e);
                    fatal = Some(anyhow::Error::new(e));
                }
                Err(e) => fatal = Some(anyhow::Error::new(e).context("Dispatcher task failed")),
            }
        }
    }

    sink.close().await.context("Failed to close batching sink")?;

    info!(
        snapshot = ?telemetry::metrics().snapshot(),
        "Final pipeline metrics"
    );
    info!("Shutdown complete");

    match fatal {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Load configuration from defaults, optional file, and environment.
fn load_config() -> Result<Config> {
    let config = config::Config::builder()
        // Start with defaults
        .add_source(config::Config::try_from(&Config::default())?)
        // Load from config file if exists
        .add_source(
            config::File::with_name("config/default")
                .required(false)
                .format(config::FileFormat::Toml),
        )
        // Override with environment variables
        .add_source(
            config::Environment::default()
                .separator("__")
                .prefix("NOZZLE")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    let mut config: Config = config
        .try_deserialize()
        .context("Failed to deserialize configuration")?;

    // Manual overrides for nested sections; the config crate's nested
    // parsing is unreliable with underscored field names.
    if let Ok(host) = std::env::var("NOZZLE_HEC_HOST") {
        config.hec.host = host;
    }
    if let Ok(token) = std::env::var("NOZZLE_HEC_TOKEN") {
        config.hec.token = token;
    }
    if let Ok(index) = std::env::var("NOZZLE_HEC_INDEX") {
        config.hec.index = index;
    }
    if let Ok(endpoint) = std::env::var("NOZZLE_FIREHOSE_ENDPOINT") {
        config.firehose.endpoint = endpoint;
    }
    if let Ok(subscription_id) = std::env::var("NOZZLE_FIREHOSE_SUBSCRIPTION_ID") {
        config.firehose.subscription_id = subscription_id;
    }
    if let Ok(endpoint) = std::env::var("NOZZLE_API_ENDPOINT") {
        config.api_endpoint = endpoint;
    }

    Ok(config)
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received terminate signal");
        }
    }
}
