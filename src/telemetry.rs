//! Logging setup for the binary.

use std::sync::Once;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

/// Install the global tracing subscriber. Later calls are ignored.
///
/// `RUST_LOG` wins when set; otherwise every rotakey crate logs at
/// `default_level`. Output goes to stderr so command output stays clean.
pub fn init(default_level: &str) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_filter(default_level)));

        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    });
}

fn default_filter(level: &str) -> String {
    ["rotakey", "rotakey_types", "rotakey_config", "rotakey_store", "rotakey_failover"]
        .iter()
        .map(|target| format!("{target}={level}"))
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_covers_workspace_crates() {
        let filter = default_filter("debug");
        assert!(filter.starts_with("rotakey=debug,"));
        assert!(filter.contains("rotakey_failover=debug"));
        assert!(filter.parse::<EnvFilter>().is_ok());
    }
}
