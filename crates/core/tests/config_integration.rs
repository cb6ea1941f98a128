//! netlog.toml 통합 설정 테스트
//!
//! - netlog.toml.example 파싱 테스트
//! - 부분 설정 로딩 테스트
//! - 환경변수 우선순위 테스트
//! - 빈 파일 / 잘못된 형식 에러 테스트

use netlog_core::config::NetlogConfig;
use netlog_core::error::{ConfigError, NetlogError};

const EXAMPLE: &str = include_str!("../../../netlog.toml.example");

// =============================================================================
// netlog.toml.example 파싱 테스트
// =============================================================================

#[test]
fn example_config_parses_and_validates() {
    let config = NetlogConfig::parse(EXAMPLE).expect("example config should parse");
    config
        .validate()
        .expect("example config should pass validation");
}

#[test]
fn example_config_matches_code_defaults() {
    let config = NetlogConfig::parse(EXAMPLE).expect("should parse");
    let defaults = NetlogConfig::default();

    assert_eq!(config.general.log_level, defaults.general.log_level);
    assert_eq!(config.metrics.port, defaults.metrics.port);
    assert_eq!(config.engine.profiles_dir, defaults.engine.profiles_dir);
    assert_eq!(config.engine.hwm, defaults.engine.hwm);
    assert_eq!(config.engine.delimiter, defaults.engine.delimiter);
    assert_eq!(config.engine.serializer, defaults.engine.serializer);
    assert_eq!(config.engine.dedup.ttl_secs, defaults.engine.dedup.ttl_secs);
    assert_eq!(
        config.engine.dedup.sweep_interval_secs,
        defaults.engine.dedup.sweep_interval_secs
    );
    assert_eq!(config.auth.port, defaults.auth.port);
    assert_eq!(config.auth.max_connections, defaults.auth.max_connections);
}

#[test]
fn example_config_declares_both_listeners() {
    let config = NetlogConfig::parse(EXAMPLE).expect("should parse");
    let kinds: Vec<_> = config.listeners.iter().map(|l| l.kind.as_str()).collect();
    assert_eq!(kinds, vec!["udp", "tcp"]);
    assert_eq!(config.listeners[1].max_clients, 5);
}

#[test]
fn example_config_audit_publisher_forwards_raw_and_unknown() {
    let config = NetlogConfig::parse(EXAMPLE).expect("should parse");
    assert_eq!(config.publishers.len(), 2);
    assert!(!config.publishers[0].send_raw);
    assert!(config.publishers[1].send_raw);
    assert!(config.publishers[1].send_unknown);
}

// =============================================================================
// 부분 설정 테스트
// =============================================================================

#[test]
fn partial_config_engine_only() {
    let toml = r#"
[engine]
device_worker_processes = 4
"#;
    let config = NetlogConfig::parse(toml).expect("should parse");
    assert_eq!(config.engine.device_worker_processes, 4);
    assert_eq!(config.engine.hwm, 1000);
    assert_eq!(config.general.log_format, "json");
    assert_eq!(config.listeners.len(), 1);
}

#[test]
fn publishers_array_replaces_default_publisher() {
    let toml = r#"
[[publishers]]
name = "stdout"
transport = "cli"
"#;
    let config = NetlogConfig::parse(toml).expect("should parse");
    assert_eq!(config.publishers.len(), 1);
    assert_eq!(config.publishers[0].transport, "cli");
    // 지정하지 않은 필드는 기본값
    assert!(config.publishers[0].error_whitelist.is_empty());
    assert_eq!(config.publishers[0].port, 49017);
}

// =============================================================================
// 환경변수 우선순위 테스트
// =============================================================================

#[test]
#[serial_test::serial]
fn env_override_takes_precedence_over_toml() {
    let toml = r#"
[general]
log_level = "info"
"#;

    let original = std::env::var("NETLOG_GENERAL_LOG_LEVEL").ok();
    // SAFETY: #[serial] 로 직렬화되어 환경변수 조작이 안전합니다.
    unsafe {
        std::env::set_var("NETLOG_GENERAL_LOG_LEVEL", "error");
    }

    let mut config = NetlogConfig::parse(toml).expect("should parse");
    config.apply_env_overrides();
    let result = config.general.log_level.clone();

    // SAFETY: 테스트 정리
    unsafe {
        match original {
            Some(val) => std::env::set_var("NETLOG_GENERAL_LOG_LEVEL", val),
            None => std::env::remove_var("NETLOG_GENERAL_LOG_LEVEL"),
        }
    }

    assert_eq!(result, "error");
}

#[test]
#[serial_test::serial]
fn env_override_disables_security() {
    // SAFETY: #[serial] 로 직렬화되어 환경변수 조작이 안전합니다.
    unsafe {
        std::env::set_var("NETLOG_AUTH_DISABLE_SECURITY", "true");
    }
    let mut config = NetlogConfig::default();
    config.apply_env_overrides();
    // SAFETY: 테스트 정리
    unsafe {
        std::env::remove_var("NETLOG_AUTH_DISABLE_SECURITY");
    }

    assert!(config.auth.disable_security);
    config.validate().expect("insecure defaults should validate");
}

// =============================================================================
// 에러 케이스
// =============================================================================

#[test]
fn empty_string_parses_with_defaults() {
    let config = NetlogConfig::parse("").expect("should parse");
    assert_eq!(config.engine.profiles_dir, "/etc/netlog/profiles");
}

#[test]
fn wrong_type_for_numeric_field() {
    let toml = r#"
[engine]
hwm = "lots"
"#;
    let err = NetlogConfig::parse(toml).unwrap_err();
    assert!(matches!(
        err,
        NetlogError::Config(ConfigError::ParseFailed { .. })
    ));
}

#[test]
fn unknown_section_is_ignored() {
    let toml = r#"
[engine]
hwm = 10

[future_section]
some_field = "value"
"#;
    let config = NetlogConfig::parse(toml).expect("unknown sections should be ignored");
    assert_eq!(config.engine.hwm, 10);
}

#[tokio::test]
async fn from_file_nonexistent_returns_file_not_found() {
    let result = NetlogConfig::from_file("/tmp/netlog_test_nonexistent_12345.toml").await;
    assert!(matches!(
        result.unwrap_err(),
        NetlogError::Config(ConfigError::FileNotFound { .. })
    ));
}

#[tokio::test]
async fn from_file_reads_temp_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("netlog.toml");
    tokio::fs::write(&path, "[engine]\nhwm = 64\n")
        .await
        .expect("write config");

    let config = NetlogConfig::from_file(&path).await.expect("should load");
    assert_eq!(config.engine.hwm, 64);
}
