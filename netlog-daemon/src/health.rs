//! Aggregated health reporting.
//!
//! The overall daemon status is the worst status among its components:
//!
//! - All Healthy -> Healthy
//! - Any Degraded, none Unhealthy -> Degraded(reason)
//! - Any Unhealthy -> Unhealthy(reason)

use serde::Serialize;

use netlog_core::pipeline::HealthStatus;

/// Aggregated health report for the daemon.
#[derive(Debug, Clone, Serialize)]
pub struct DaemonHealth {
    /// Worst status of all components.
    pub status: HealthStatus,
    /// Seconds since the engine started.
    pub uptime_secs: u64,
    /// Device OS names with compiled tables.
    pub devices: Vec<String>,
    /// Per-component reports.
    pub components: Vec<ComponentHealth>,
}

/// Health of one daemon component.
#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    /// Component name (e.g. "engine", "key-exchange").
    pub name: String,
    /// Whether the component is enabled in configuration.
    pub enabled: bool,
    /// Current status.
    pub status: HealthStatus,
}

/// Aggregate component statuses into one, ignoring disabled components.
pub fn aggregate_status(components: &[ComponentHealth]) -> HealthStatus {
    let mut worst = HealthStatus::Healthy;
    let mut reasons = Vec::new();

    for component in components.iter().filter(|c| c.enabled) {
        match &component.status {
            HealthStatus::Healthy => {}
            HealthStatus::Degraded(reason) => {
                reasons.push(format!("{}: {}", component.name, reason));
                if !worst.is_unhealthy() {
                    worst = HealthStatus::Degraded(String::new());
                }
            }
            HealthStatus::Unhealthy(reason) => {
                reasons.push(format!("{}: {}", component.name, reason));
                worst = HealthStatus::Unhealthy(String::new());
            }
        }
    }

    match worst {
        HealthStatus::Healthy => HealthStatus::Healthy,
        HealthStatus::Degraded(_) => HealthStatus::Degraded(reasons.join("; ")),
        HealthStatus::Unhealthy(_) => HealthStatus::Unhealthy(reasons.join("; ")),
    }
}
