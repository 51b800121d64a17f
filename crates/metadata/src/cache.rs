//! TTL and negative caching in front of the metadata resolver.
//!
//! Two disjoint namespaces: the positive cache holds resolved ownership,
//! the negative cache holds identifiers confirmed missing so ephemeral or
//! deleted workloads do not hammer the control plane. An identifier is
//! never live in both; inserting into one invalidates the other.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use nozzle_core::Result;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use telemetry::metrics;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::resolver::{MetadataResolver, Ownership};

/// Metadata cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Positive entry TTL in seconds. Zero disables the cache entirely
    /// unless refresh mode is selected.
    #[serde(default = "default_positive_ttl_secs")]
    pub positive_ttl_secs: u64,
    /// Negative entry TTL in seconds, typically shorter-lived than the
    /// positive TTL. Zero disables negative caching.
    #[serde(default = "default_negative_ttl_secs")]
    pub negative_ttl_secs: u64,
    /// Bulk-refresh interval in seconds. Non-zero selects refresh mode,
    /// which replaces per-entry TTL expiry.
    #[serde(default)]
    pub refresh_interval_secs: u64,
    /// Maximum positive entries held. Zero means unbounded.
    #[serde(default)]
    pub max_entries: u64,
}

fn default_positive_ttl_secs() -> u64 {
    60
}

fn default_negative_ttl_secs() -> u64 {
    30
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            positive_ttl_secs: default_positive_ttl_secs(),
            negative_ttl_secs: default_negative_ttl_secs(),
            refresh_interval_secs: 0,
            max_entries: 0,
        }
    }
}

impl CacheConfig {
    fn refresh_mode(&self) -> bool {
        self.refresh_interval_secs > 0
    }

    fn negative_enabled(&self) -> bool {
        self.negative_ttl_secs > 0
    }
}

/// Cache of workload ownership metadata.
pub struct MetadataCache {
    resolver: Option<Arc<dyn MetadataResolver>>,
    /// Swapped wholesale on bulk refresh; reads clone the handle.
    positive: RwLock<Cache<String, Ownership>>,
    negative: Cache<String, ()>,
    config: CacheConfig,
}

impl MetadataCache {
    /// Creates a cache in lazy-TTL or bulk-refresh mode, per the config.
    ///
    /// A zero positive TTL without a refresh interval disables the cache
    /// entirely.
    pub fn new(resolver: Arc<dyn MetadataResolver>, config: CacheConfig) -> Self {
        if config.positive_ttl_secs == 0 && !config.refresh_mode() {
            return Self::disabled();
        }
        Self {
            resolver: Some(resolver),
            positive: RwLock::new(build_positive(&config)),
            negative: build_negative(&config),
            config,
        }
    }

    /// Creates a disabled cache: `resolve` reports not-found immediately
    /// and never calls out.
    pub fn disabled() -> Self {
        let config = CacheConfig {
            positive_ttl_secs: 0,
            negative_ttl_secs: 0,
            refresh_interval_secs: 0,
            max_entries: 0,
        };
        Self {
            resolver: None,
            positive: RwLock::new(Cache::new(0)),
            negative: Cache::new(0),
            config,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.resolver.is_some()
    }

    /// Resolves one workload, consulting the caches first.
    ///
    /// An unexpired negative entry short-circuits to not-found. A resolver
    /// error is surfaced as not-found without caching, so the next lookup
    /// retries instead of poisoning either namespace.
    pub async fn resolve(&self, workload_id: &str) -> Option<Ownership> {
        let resolver = self.resolver.as_ref()?;
        let positive = self.positive.read().clone();

        if let Some(hit) = positive.get(workload_id).await {
            return Some(hit);
        }
        if self.config.negative_enabled() && self.negative.get(workload_id).await.is_some() {
            return None;
        }

        metrics().resolver_calls.inc();
        match resolver.resolve(workload_id).await {
            Ok(Some(ownership)) => {
                self.negative.invalidate(workload_id).await;
                positive
                    .insert(workload_id.to_string(), ownership.clone())
                    .await;
                Some(ownership)
            }
            Ok(None) => {
                positive.invalidate(workload_id).await;
                if self.config.negative_enabled() {
                    self.negative.insert(workload_id.to_string(), ()).await;
                }
                None
            }
            Err(e) => {
                metrics().resolver_errors.inc();
                warn!(
                    workload_id = workload_id,
                    error = %e,
                    "Metadata resolution failed, result not cached"
                );
                None
            }
        }
    }

    /// Bulk-lists every workload and atomically replaces the positive
    /// cache contents. Negative entries for listed workloads are cleared.
    pub async fn refresh(&self) -> Result<usize> {
        let Some(resolver) = self.resolver.as_ref() else {
            return Ok(0);
        };

        let listing = resolver.list_all().await?;
        let count = listing.len();

        let fresh = build_positive(&self.config);
        for (workload_id, ownership) in listing {
            self.negative.invalidate(&workload_id).await;
            fresh.insert(workload_id, ownership).await;
        }
        *self.positive.write() = fresh;

        Ok(count)
    }

    /// Spawns the periodic bulk-refresh task. Returns `None` outside
    /// refresh mode.
    pub fn start_refresh_task(cache: Arc<Self>) -> Option<JoinHandle<()>> {
        if !cache.config.refresh_mode() || !cache.is_enabled() {
            return None;
        }
        let period = Duration::from_secs(cache.config.refresh_interval_secs);
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                match cache.refresh().await {
                    Ok(count) => info!(workloads = count, "Refreshed metadata cache"),
                    Err(e) => error!("Metadata cache refresh failed: {}", e),
                }
            }
        }))
    }
}

fn build_positive(config: &CacheConfig) -> Cache<String, Ownership> {
    let mut builder = Cache::builder();
    if !config.refresh_mode() {
        builder = builder.time_to_live(Duration::from_secs(config.positive_ttl_secs));
    }
    if config.max_entries > 0 {
        builder = builder.max_capacity(config.max_entries);
    }
    builder.build()
}

fn build_negative(config: &CacheConfig) -> Cache<String, ()> {
    let mut builder = Cache::builder();
    if config.negative_enabled() {
        builder = builder.time_to_live(Duration::from_secs(config.negative_ttl_secs));
    }
    builder.build()
}
