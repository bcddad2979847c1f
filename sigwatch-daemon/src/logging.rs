//! Logging initialization for sigwatch-daemon.
//!
//! One `tracing-subscriber` registry with either a JSON or a pretty fmt layer.
//! Thread names are always recorded so events from the capture thread
//! (`sigwatch-sniffer`) can be told apart from the funnel's tokio workers.

use anyhow::Result;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use sigwatch_core::config::GeneralConfig;

/// Build the event filter. `RUST_LOG` wins over `log_level` when set.
fn build_filter(config: &GeneralConfig) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(&config.log_level)
        .map_err(|e| anyhow::anyhow!("invalid log level '{}': {}", config.log_level, e))
}

/// Initialize the global tracing subscriber. Call once, before anything logs.
pub fn init_tracing(config: &GeneralConfig) -> Result<()> {
    let (json, pretty) = match config.log_format.as_str() {
        "json" => (
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_thread_names(true)
                    .with_current_span(false),
            ),
            None,
        ),
        "pretty" => (
            None,
            Some(
                tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_thread_names(true),
            ),
        ),
        other => {
            return Err(anyhow::anyhow!(
                "unknown log format '{}', expected 'json' or 'pretty'",
                other
            ));
        }
    };

    tracing_subscriber::registry()
        .with(build_filter(config)?)
        .with(json)
        .with(pretty)
        .try_init()
        .map_err(|e| {
            anyhow::anyhow!(
                "failed to initialize {} tracing subscriber: {}",
                config.log_format,
                e
            )
        })
}
