//! Tracing subscriber setup
//!
//! `RUST_LOG` wins when set; otherwise the crate logs at `log_level` and
//! everything else at `info`.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("idlemon_server={},info", log_level).into())
}

/// Install the global subscriber. `format` is `pretty` or `json`.
pub fn init(log_level: &str, format: &str) {
    let registry = tracing_subscriber::registry().with(filter(log_level));
    if format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(false))
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
