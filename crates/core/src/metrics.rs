//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 단계는 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`,
//! `metrics::histogram!()` 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `netlog_`
//! - 단계명: `listener_`, `dispatcher_`, `device_`, `publisher_`, `auth_`, `daemon_`
//! - 접미어: `_total` (counter), `_seconds` (histogram/latency), 없음 (gauge)
//!
//! # 사용 예시
//!
//! ```ignore
//! use metrics::counter;
//! use netlog_core::metrics as m;
//!
//! counter!(m::DISPATCHER_IDENTIFIED_TOTAL, m::LABEL_DEVICE_OS => "junos").increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 장비 OS 레이블 키 (junos, iosxr, ...)
pub const LABEL_DEVICE_OS: &str = "device_os";

/// 발행자 이름 레이블 키
pub const LABEL_PUBLISHER: &str = "publisher";

/// 전송 방식 레이블 키 (log, cli, tcp)
pub const LABEL_TRANSPORT: &str = "transport";

/// 리스너 종류 레이블 키 (udp, tcp)
pub const LABEL_LISTENER: &str = "listener";

// ─── Listener 메트릭 ────────────────────────────────────────────────

/// Listener: 수신한 원시 메시지 수 (counter, label: listener)
pub const LISTENER_MESSAGES_RECEIVED_TOTAL: &str = "netlog_listener_messages_received_total";

// ─── Dispatcher 메트릭 ──────────────────────────────────────────────

/// Dispatcher: 수신한 원시 메시지 수 (counter)
pub const DISPATCHER_MESSAGES_RECEIVED_TOTAL: &str = "netlog_dispatcher_messages_received_total";

/// Dispatcher: 장비 OS로 식별된 메시지 수 (counter, label: device_os)
pub const DISPATCHER_IDENTIFIED_TOTAL: &str = "netlog_dispatcher_identified_total";

/// Dispatcher: 둘 이상의 OS와 일치한 메시지 수 (counter)
pub const DISPATCHER_MULTI_MATCH_TOTAL: &str = "netlog_dispatcher_multi_match_total";

/// Dispatcher: 식별되지 않은 메시지 수 (counter)
pub const DISPATCHER_UNKNOWN_TOTAL: &str = "netlog_dispatcher_unknown_total";

/// Dispatcher: 중복으로 건너뛴 메시지 수 (counter, label: device_os)
pub const DISPATCHER_SKIPPED_TOTAL: &str = "netlog_dispatcher_skipped_total";

/// Dispatcher: 워커가 없어 큐잉하지 못한 메시지 수 (counter, label: device_os)
pub const DISPATCHER_FAILED_QUEUING_TOTAL: &str = "netlog_dispatcher_failed_queuing_total";

/// Dispatcher: 워커 큐에 넣은 메시지 수 (counter, label: device_os)
pub const DISPATCHER_QUEUED_TOTAL: &str = "netlog_dispatcher_queued_total";

// ─── Device Worker 메트릭 ───────────────────────────────────────────

/// Device: 워커가 받은 메시지 수 (counter, label: device_os)
pub const DEVICE_MESSAGES_RECEIVED_TOTAL: &str = "netlog_device_messages_received_total";

/// Device: 구조화 객체로 발행한 메시지 수 (counter, label: device_os)
pub const DEVICE_MESSAGES_PUBLISHED_TOTAL: &str = "netlog_device_messages_published_total";

/// Device: RAW 로 발행한 메시지 수 (counter, label: device_os)
pub const DEVICE_RAW_PUBLISHED_TOTAL: &str = "netlog_device_raw_published_total";

/// Device: 추출/매핑에 실패해 버린 메시지 수 (counter, label: device_os)
pub const DEVICE_FAILED_TOTAL: &str = "netlog_device_failed_total";

/// Device: 메시지 하나의 분류 처리 시간 (histogram, 초, label: device_os)
pub const DEVICE_PROCESSING_DURATION_SECONDS: &str = "netlog_device_processing_duration_seconds";

// ─── Publisher 메트릭 ───────────────────────────────────────────────

/// Publisher: 팬아웃 버스에서 받은 엔벨로프 수 (counter, label: publisher)
pub const PUBLISHER_RECEIVED_TOTAL: &str = "netlog_publisher_received_total";

/// Publisher: 필터로 걸러진 엔벨로프 수 (counter, label: publisher)
pub const PUBLISHER_FILTERED_TOTAL: &str = "netlog_publisher_filtered_total";

/// Publisher: 전송한 엔벨로프 수 (counter, labels: publisher, transport)
pub const PUBLISHER_PUBLISHED_TOTAL: &str = "netlog_publisher_published_total";

/// Publisher: 직렬화/암호화/전송 실패 수 (counter, label: publisher)
pub const PUBLISHER_ERRORS_TOTAL: &str = "netlog_publisher_errors_total";

/// Publisher: 큐가 가득 차 생산자가 기다린 횟수 (counter, label: publisher)
pub const PUBLISHER_BACKPRESSURE_TOTAL: &str = "netlog_publisher_backpressure_total";

// ─── Auth 메트릭 ────────────────────────────────────────────────────

/// Auth: 수락한 키 교환 연결 수 (counter)
pub const AUTH_CONNECTIONS_TOTAL: &str = "netlog_auth_connections_total";

/// Auth: 인증을 마친 구독자 수 (counter)
pub const AUTH_AUTHENTICATED_TOTAL: &str = "netlog_auth_authenticated_total";

/// Auth: 핸드셰이크 실패 수 (counter)
pub const AUTH_FAILURES_TOTAL: &str = "netlog_auth_failures_total";

// ─── Daemon 메트릭 ──────────────────────────────────────────────────

/// Daemon: 가동 시간 (gauge, 초)
pub const DAEMON_UPTIME_SECONDS: &str = "netlog_daemon_uptime_seconds";

/// Daemon: 로드된 장비 프로파일 수 (gauge)
pub const DAEMON_PROFILES_LOADED: &str = "netlog_daemon_profiles_loaded";

/// Daemon: 빌드 정보 (gauge, 항상 1, label: version)
pub const DAEMON_BUILD_INFO: &str = "netlog_daemon_build_info";

// ─── 히스토그램 버킷 정의 ────────────────────────────────────────────

/// 메시지 분류 시간 히스토그램 버킷 (초)
///
/// 10us ~ 1s 범위
pub const PROCESSING_DURATION_BUCKETS: [f64; 9] = [
    0.00001, 0.00005, 0.0001, 0.0005, 0.001, 0.005, 0.01, 0.1, 1.0,
];

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 전역 레코더 설치 후 한 번만 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    // Listener
    describe_counter!(
        LISTENER_MESSAGES_RECEIVED_TOTAL,
        "Raw syslog messages received per listener"
    );

    // Dispatcher
    describe_counter!(
        DISPATCHER_MESSAGES_RECEIVED_TOTAL,
        "Raw messages received by the dispatcher"
    );
    describe_counter!(
        DISPATCHER_IDENTIFIED_TOTAL,
        "Messages whose prefix matched a device OS"
    );
    describe_counter!(
        DISPATCHER_MULTI_MATCH_TOTAL,
        "Messages whose prefix matched more than one device OS"
    );
    describe_counter!(
        DISPATCHER_UNKNOWN_TOTAL,
        "Messages that matched no device OS prefix"
    );
    describe_counter!(
        DISPATCHER_SKIPPED_TOTAL,
        "Messages dropped by the dedup window"
    );
    describe_counter!(
        DISPATCHER_FAILED_QUEUING_TOTAL,
        "Identified messages without a running device worker"
    );
    describe_counter!(
        DISPATCHER_QUEUED_TOTAL,
        "Messages queued to a device worker"
    );

    // Device
    describe_counter!(
        DEVICE_MESSAGES_RECEIVED_TOTAL,
        "Messages received by device workers"
    );
    describe_counter!(
        DEVICE_MESSAGES_PUBLISHED_TOTAL,
        "Structured envelopes emitted by device workers"
    );
    describe_counter!(
        DEVICE_RAW_PUBLISHED_TOTAL,
        "RAW envelopes emitted by device workers"
    );
    describe_counter!(
        DEVICE_FAILED_TOTAL,
        "Messages dropped after an extraction or mapping failure"
    );
    describe_histogram!(
        DEVICE_PROCESSING_DURATION_SECONDS,
        "Time to classify and map a single message in seconds"
    );

    // Publisher
    describe_counter!(
        PUBLISHER_RECEIVED_TOTAL,
        "Envelopes received by each publisher"
    );
    describe_counter!(
        PUBLISHER_FILTERED_TOTAL,
        "Envelopes rejected by the publisher error filter"
    );
    describe_counter!(
        PUBLISHER_PUBLISHED_TOTAL,
        "Envelopes handed to the publisher transport"
    );
    describe_counter!(
        PUBLISHER_ERRORS_TOTAL,
        "Serialization, encryption or transport failures"
    );
    describe_counter!(
        PUBLISHER_BACKPRESSURE_TOTAL,
        "Times a producer waited on a full publisher queue"
    );

    // Auth
    describe_counter!(AUTH_CONNECTIONS_TOTAL, "Key exchange connections accepted");
    describe_counter!(
        AUTH_AUTHENTICATED_TOTAL,
        "Subscribers that completed the key exchange"
    );
    describe_counter!(AUTH_FAILURES_TOTAL, "Failed key exchange handshakes");

    // Daemon
    describe_gauge!(DAEMON_UPTIME_SECONDS, "netlog daemon uptime in seconds");
    describe_gauge!(
        DAEMON_PROFILES_LOADED,
        "Number of device profiles loaded at startup"
    );
    describe_gauge!(DAEMON_BUILD_INFO, "Build information (always 1)");
}
