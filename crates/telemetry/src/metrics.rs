//! In-memory metrics for the nozzle pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// A counter metric.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_by(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn reset(&self) -> u64 {
        self.0.swap(0, Ordering::Relaxed)
    }
}

/// A gauge metric (can go up or down).
#[derive(Debug, Default)]
pub struct Gauge(AtomicU64);

impl Gauge {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn set(&self, val: u64) {
        self.0.store(val, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Histogram for delivery latency tracking.
#[derive(Debug)]
pub struct Histogram {
    /// Buckets: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 5s, 10s
    buckets: [AtomicU64; 11],
    sum: AtomicU64,
    count: AtomicU64,
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

impl Histogram {
    const BUCKET_BOUNDS: [u64; 11] = [1, 5, 10, 25, 50, 100, 250, 500, 1000, 5000, 10000];

    pub fn new() -> Self {
        Self {
            buckets: Default::default(),
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    /// Records a value in milliseconds.
    pub fn observe(&self, ms: u64) {
        self.sum.fetch_add(ms, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        for (i, &bound) in Self::BUCKET_BOUNDS.iter().enumerate() {
            if ms <= bound {
                self.buckets[i].fetch_add(1, Ordering::Relaxed);
                return;
            }
        }
        // Value exceeds all buckets, add to last
        self.buckets[10].fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn sum(&self) -> u64 {
        self.sum.load(Ordering::Relaxed)
    }

    pub fn mean(&self) -> f64 {
        let count = self.count();
        if count == 0 {
            0.0
        } else {
            self.sum() as f64 / count as f64
        }
    }
}

/// Collected metrics for the nozzle pipeline.
#[derive(Debug, Default)]
pub struct Metrics {
    // Dispatcher
    pub envelopes_received: Counter,
    pub envelopes_dropped: Counter,
    pub routing_errors: Counter,

    // Router
    pub events_routed: Counter,
    pub events_filtered: Counter,
    pub events_unresolved_dropped: Counter,

    // Metadata cache
    pub resolver_calls: Counter,
    pub resolver_errors: Counter,

    // Batching sink
    pub batches_assembled: Counter,
    pub batches_dropped: Counter,
    pub batches_delivered: Counter,
    pub batches_abandoned: Counter,
    pub records_delivered: Counter,
    pub delivery_errors: Counter,
    pub records_skipped_serialization: Counter,

    pub delivery_latency_ms: Histogram,

    pub delivery_queue_depth: Gauge,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes a snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: Utc::now(),
            envelopes_received: self.envelopes_received.get(),
            envelopes_dropped: self.envelopes_dropped.get(),
            routing_errors: self.routing_errors.get(),
            events_routed: self.events_routed.get(),
            events_filtered: self.events_filtered.get(),
            events_unresolved_dropped: self.events_unresolved_dropped.get(),
            resolver_calls: self.resolver_calls.get(),
            resolver_errors: self.resolver_errors.get(),
            batches_assembled: self.batches_assembled.get(),
            batches_dropped: self.batches_dropped.get(),
            batches_delivered: self.batches_delivered.get(),
            batches_abandoned: self.batches_abandoned.get(),
            records_delivered: self.records_delivered.get(),
            delivery_errors: self.delivery_errors.get(),
            delivery_latency_mean_ms: self.delivery_latency_ms.mean(),
        }
    }
}

/// A snapshot of metrics at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub envelopes_received: u64,
    pub envelopes_dropped: u64,
    pub routing_errors: u64,
    pub events_routed: u64,
    pub events_filtered: u64,
    pub events_unresolved_dropped: u64,
    pub resolver_calls: u64,
    pub resolver_errors: u64,
    pub batches_assembled: u64,
    pub batches_dropped: u64,
    pub batches_delivered: u64,
    pub batches_abandoned: u64,
    pub records_delivered: u64,
    pub delivery_errors: u64,
    pub delivery_latency_mean_ms: f64,
}

/// Global metrics registry.
pub static METRICS: std::sync::LazyLock<Metrics> = std::sync::LazyLock::new(Metrics::new);

/// Get the global metrics instance.
pub fn metrics() -> &'static Metrics {
    &METRICS
}
