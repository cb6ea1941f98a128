//! Health aggregation tests.

use netlog_core::pipeline::HealthStatus;
use netlog_daemon::health::{ComponentHealth, aggregate_status};

fn component(name: &str, enabled: bool, status: HealthStatus) -> ComponentHealth {
    ComponentHealth {
        name: name.to_owned(),
        enabled,
        status,
    }
}

#[test]
fn test_aggregate_status_all_healthy() {
    let components = vec![
        component("engine", true, HealthStatus::Healthy),
        component("key-exchange", true, HealthStatus::Healthy),
    ];
    assert!(aggregate_status(&components).is_healthy());
}

#[test]
fn test_aggregate_status_empty_is_healthy() {
    assert!(aggregate_status(&[]).is_healthy());
}

#[test]
fn test_aggregate_status_degraded_carries_reason() {
    let components = vec![
        component("engine", true, HealthStatus::Degraded("1/2 publishers subscribed".to_owned())),
        component("key-exchange", true, HealthStatus::Healthy),
    ];
    match aggregate_status(&components) {
        HealthStatus::Degraded(reason) => {
            assert_eq!(reason, "engine: 1/2 publishers subscribed");
        }
        other => panic!("expected degraded, got {other:?}"),
    }
}

#[test]
fn test_aggregate_status_unhealthy_wins_and_keeps_all_reasons() {
    let components = vec![
        component("engine", true, HealthStatus::Degraded("slow".to_owned())),
        component("key-exchange", true, HealthStatus::Unhealthy("not listening".to_owned())),
    ];
    match aggregate_status(&components) {
        HealthStatus::Unhealthy(reason) => {
            assert!(reason.contains("engine: slow"));
            assert!(reason.contains("key-exchange: not listening"));
        }
        other => panic!("expected unhealthy, got {other:?}"),
    }
}

#[test]
fn test_aggregate_status_ignores_disabled_components() {
    let components = vec![
        component("engine", true, HealthStatus::Healthy),
        component("key-exchange", false, HealthStatus::Unhealthy("stopped".to_owned())),
    ];
    assert!(aggregate_status(&components).is_healthy());
}

#[test]
fn test_component_health_serializes_for_reporting() {
    let value = serde_json::to_value(component(
        "engine",
        true,
        HealthStatus::Degraded("lagging".to_owned()),
    ))
    .expect("serialize");
    assert_eq!(value["name"], "engine");
    assert_eq!(value["enabled"], true);
    assert_eq!(value["status"]["Degraded"], "lagging");
}
