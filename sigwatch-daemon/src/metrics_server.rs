//! Prometheus metrics HTTP endpoint.
//!
//! Uses the built-in HTTP listener from `metrics-exporter-prometheus`.

use std::net::SocketAddr;

use anyhow::Result;
use metrics_exporter_prometheus::PrometheusBuilder;
use sigwatch_core::config::MetricsConfig;

/// Install the global metrics recorder and start the HTTP listener.
///
/// Call once per process. Afterwards every `metrics::counter!()` and
/// `metrics::gauge!()` call in the workspace is exported.
///
/// # Errors
///
/// - The listen address does not parse
/// - Socket binding fails or a global recorder is already installed
pub fn install_metrics_recorder(config: &MetricsConfig) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.listen_addr, config.port)
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid metrics listen address: {}", e))?;

    if addr.ip().is_unspecified() {
        tracing::warn!(
            listen_addr = %addr,
            "metrics endpoint is exposed on all interfaces; restrict listen_addr in untrusted networks"
        );
    }

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("failed to install metrics recorder: {}", e))?;

    sigwatch_core::metrics::describe_all();

    tracing::info!(listen_addr = %addr, "Prometheus metrics endpoint active");
    Ok(())
}
