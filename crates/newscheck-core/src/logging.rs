//! Tracing subscriber for the newscheck binary.
//!
//! Progress lines and request traces go to stderr, leaving stdout to the
//! per-check verdicts.

use tracing_subscriber::EnvFilter;

const DEFAULT_DIRECTIVE: &str = "newscheck=info";

/// `--log-level` wins over `RUST_LOG`, which wins over `newscheck=info`.
fn filter(level: Option<&str>) -> EnvFilter {
    match level {
        Some(level) => EnvFilter::new(format!("newscheck={level}")),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE)),
    }
}

/// Install the global subscriber. A second call keeps the first subscriber.
pub fn init(level: Option<&str>) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter(level))
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
