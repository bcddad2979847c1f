//! Aggregated health reporting.
//!
//! The overall daemon status is the worst status among enabled components:
//!
//! - All Healthy -> Healthy
//! - Any Degraded, none Unhealthy -> Degraded(reason)
//! - Any Unhealthy -> Unhealthy(reason)

use serde::Serialize;

use sigwatch_core::pipeline::HealthStatus;

/// Aggregated health report for the daemon.
#[derive(Debug, Clone, Serialize)]
pub struct DaemonHealth {
    /// Overall status (worst of all components).
    pub status: HealthStatus,
    /// Seconds since the daemon started.
    pub uptime_secs: u64,
    /// Number of rules in the active set.
    pub active_rules: usize,
    /// Per-component reports.
    pub components: Vec<ComponentHealth>,
}

/// Health of a single component.
#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    /// Component name ("sniffer", "funnel").
    pub name: String,
    /// Whether the component is enabled in configuration.
    pub enabled: bool,
    /// Current status.
    pub status: HealthStatus,
}

/// Reduce component statuses to the worst one, joining the reasons.
pub fn aggregate_status(components: &[ComponentHealth]) -> HealthStatus {
    let mut unhealthy = Vec::new();
    let mut degraded = Vec::new();

    for component in components.iter().filter(|c| c.enabled) {
        match &component.status {
            HealthStatus::Healthy => {}
            HealthStatus::Degraded(reason) => {
                degraded.push(format!("{}: {}", component.name, reason));
            }
            HealthStatus::Unhealthy(reason) => {
                unhealthy.push(format!("{}: {}", component.name, reason));
            }
        }
    }

    if !unhealthy.is_empty() {
        HealthStatus::Unhealthy(unhealthy.join("; "))
    } else if !degraded.is_empty() {
        HealthStatus::Degraded(degraded.join("; "))
    } else {
        HealthStatus::Healthy
    }
}
