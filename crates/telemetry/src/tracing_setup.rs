//! Structured logging bootstrap.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise `default_filter` applies. With
/// `json` the formatter writes one JSON object per line to stdout, the
/// shape log shippers scrape.
pub fn init_tracing(default_filter: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_target(true))
            .init();
    } else {
        registry.with(fmt::layer().with_target(true)).init();
    }
}

/// Reads `RUST_LOG` and `LOG_JSON` and installs the subscriber.
pub fn init_tracing_from_env() {
    let json = std::env::var("LOG_JSON")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    init_tracing("info", json);
}
