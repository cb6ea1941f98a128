//! 설정 관리 -- netlog.toml 파싱 및 런타임 설정
//!
//! [`NetlogConfig`]는 데몬과 모든 단계의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`NETLOG_ENGINE_PROFILES_DIR=/etc/netlog/profiles` 형식)
//! 3. 설정 파일 (`netlog.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), netlog_core::error::NetlogError> {
//! use netlog_core::config::NetlogConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = NetlogConfig::load("netlog.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = NetlogConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, NetlogError};

/// 공개 채널 기본 포트
pub const DEFAULT_PUBLISH_PORT: u16 = 49017;
/// 키 교환 기본 포트
pub const DEFAULT_AUTH_PORT: u16 = 49018;
/// 단계 간 큐 기본 HWM
pub const DEFAULT_HWM: usize = 1000;
/// 구조화 객체 경로 기본 구분자
pub const DEFAULT_DELIMITER: &str = "//";

/// netlog 통합 설정
///
/// `netlog.toml` 파일의 최상위 구조를 나타냅니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetlogConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// Prometheus 메트릭 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
    /// 분류 엔진 설정
    #[serde(default)]
    pub engine: EngineConfig,
    /// 키 교환 / 보안 설정
    #[serde(default)]
    pub auth: AuthConfig,
    /// 수신 리스너 목록
    #[serde(default = "default_listeners")]
    pub listeners: Vec<ListenerConfig>,
    /// 발행자 목록
    #[serde(default = "default_publishers")]
    pub publishers: Vec<PublisherConfig>,
}

impl Default for NetlogConfig {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            metrics: MetricsConfig::default(),
            engine: EngineConfig::default(),
            auth: AuthConfig::default(),
            listeners: default_listeners(),
            publishers: default_publishers(),
        }
    }
}

impl NetlogConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, NetlogError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    ///
    /// 검증은 호출자가 오버라이드를 모두 적용한 뒤 수행합니다.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, NetlogError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                NetlogError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                NetlogError::Io(e)
            }
        })?;
        Self::parse(&content)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, NetlogError> {
        toml::from_str(toml_str).map_err(|e| {
            NetlogError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `NETLOG_{SECTION}_{FIELD}`.
    /// 배열 섹션(`listeners`, `publishers`)은 오버라이드 대상이 아닙니다.
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "NETLOG_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "NETLOG_GENERAL_LOG_FORMAT");
        override_string(&mut self.general.pid_file, "NETLOG_GENERAL_PID_FILE");

        // Metrics
        override_bool(&mut self.metrics.enabled, "NETLOG_METRICS_ENABLED");
        override_string(&mut self.metrics.address, "NETLOG_METRICS_ADDRESS");
        override_u16(&mut self.metrics.port, "NETLOG_METRICS_PORT");

        // Engine
        override_string(
            &mut self.engine.profiles_dir,
            "NETLOG_ENGINE_PROFILES_DIR",
        );
        override_string(
            &mut self.engine.extension_dir,
            "NETLOG_ENGINE_EXTENSION_DIR",
        );
        override_csv(
            &mut self.engine.device_whitelist,
            "NETLOG_ENGINE_DEVICE_WHITELIST",
        );
        override_csv(
            &mut self.engine.device_blacklist,
            "NETLOG_ENGINE_DEVICE_BLACKLIST",
        );
        override_usize(
            &mut self.engine.device_worker_processes,
            "NETLOG_ENGINE_DEVICE_WORKER_PROCESSES",
        );
        override_usize(&mut self.engine.hwm, "NETLOG_ENGINE_HWM");
        override_string(&mut self.engine.serializer, "NETLOG_ENGINE_SERIALIZER");

        // Dedup
        override_bool(
            &mut self.engine.dedup.enabled,
            "NETLOG_DEDUP_ENABLED",
        );
        override_string(&mut self.engine.dedup.backend, "NETLOG_DEDUP_BACKEND");
        override_u64(&mut self.engine.dedup.ttl_secs, "NETLOG_DEDUP_TTL_SECS");
        override_string(
            &mut self.engine.dedup.redis_url,
            "NETLOG_DEDUP_REDIS_URL",
        );

        // Auth
        override_bool(
            &mut self.auth.disable_security,
            "NETLOG_AUTH_DISABLE_SECURITY",
        );
        override_string(&mut self.auth.address, "NETLOG_AUTH_ADDRESS");
        override_u16(&mut self.auth.port, "NETLOG_AUTH_PORT");
        override_string(&mut self.auth.certificate, "NETLOG_AUTH_CERTIFICATE");
        override_string(&mut self.auth.keyfile, "NETLOG_AUTH_KEYFILE");
        override_u64(&mut self.auth.timeout_secs, "NETLOG_AUTH_TIMEOUT_SECS");
        override_usize(
            &mut self.auth.max_connections,
            "NETLOG_AUTH_MAX_CONNECTIONS",
        );
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), NetlogError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        if self.metrics.enabled && self.metrics.port == 0 {
            return Err(invalid("metrics.port", "must be non-zero".to_owned()));
        }

        self.engine.validate()?;
        self.auth.validate()?;

        if self.listeners.is_empty() {
            return Err(invalid(
                "listeners",
                "at least one listener is required".to_owned(),
            ));
        }
        for (idx, listener) in self.listeners.iter().enumerate() {
            if listener.address.is_empty() {
                return Err(invalid(
                    &format!("listeners[{idx}].address"),
                    "must not be empty".to_owned(),
                ));
            }
        }

        if self.publishers.is_empty() {
            return Err(invalid(
                "publishers",
                "at least one publisher is required".to_owned(),
            ));
        }
        for (idx, publisher) in self.publishers.iter().enumerate() {
            publisher.validate(idx)?;
        }

        Ok(())
    }
}

/// 주소와 포트를 소켓 주소 문자열로 합칩니다. IPv6 주소는 대괄호로 감쌉니다.
pub fn socket_addr(address: &str, port: u16) -> String {
    if address.contains(':') && !address.starts_with('[') {
        format!("[{address}]:{port}")
    } else {
        format!("{address}:{port}")
    }
}

fn invalid(field: &str, reason: String) -> NetlogError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason,
    }
    .into()
}

fn default_listeners() -> Vec<ListenerConfig> {
    vec![ListenerConfig::default()]
}

fn default_publishers() -> Vec<PublisherConfig> {
    vec![PublisherConfig::default()]
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
    /// PID 파일 경로 (빈 문자열이면 생성하지 않음)
    pub pid_file: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_owned(),
            log_format: "json".to_owned(),
            pid_file: String::new(),
        }
    }
}

/// Prometheus 메트릭 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// exporter 바인드 주소
    pub address: String,
    /// exporter 포트
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: "0.0.0.0".to_owned(),
            port: 9443,
        }
    }
}

/// 분류 엔진 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// 장비 프로파일 기본 디렉토리
    pub profiles_dir: String,
    /// 기본 디렉토리 위에 병합할 확장 디렉토리 (빈 문자열이면 없음)
    pub extension_dir: String,
    /// 로드할 장비 OS (비어 있으면 전부)
    pub device_whitelist: Vec<String>,
    /// 제외할 장비 OS
    pub device_blacklist: Vec<String>,
    /// OS별 워커 복제 수
    pub device_worker_processes: usize,
    /// 단계 간 큐 용량
    pub hwm: usize,
    /// 구조화 객체 경로 구분자
    pub delimiter: String,
    /// 발행자가 직렬화 방식을 지정하지 않았을 때의 코덱 (json, msgpack)
    pub serializer: String,
    /// 중복 제거 설정
    #[serde(default)]
    pub dedup: DedupConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            profiles_dir: "/etc/netlog/profiles".to_owned(),
            extension_dir: String::new(),
            device_whitelist: Vec::new(),
            device_blacklist: Vec::new(),
            device_worker_processes: 1,
            hwm: DEFAULT_HWM,
            delimiter: DEFAULT_DELIMITER.to_owned(),
            serializer: "msgpack".to_owned(),
            dedup: DedupConfig::default(),
        }
    }
}

impl EngineConfig {
    fn validate(&self) -> Result<(), NetlogError> {
        if self.profiles_dir.is_empty() {
            return Err(invalid(
                "engine.profiles_dir",
                "must not be empty".to_owned(),
            ));
        }
        if self.device_worker_processes == 0 {
            return Err(invalid(
                "engine.device_worker_processes",
                "must be at least 1".to_owned(),
            ));
        }
        if self.hwm == 0 {
            return Err(invalid("engine.hwm", "must be at least 1".to_owned()));
        }
        if self.delimiter.is_empty() {
            return Err(invalid("engine.delimiter", "must not be empty".to_owned()));
        }
        let valid_serializers = ["json", "msgpack"];
        if !valid_serializers.contains(&self.serializer.as_str()) {
            return Err(invalid(
                "engine.serializer",
                format!("must be one of: {}", valid_serializers.join(", ")),
            ));
        }
        self.dedup.validate()
    }
}

/// 중복 제거 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 저장소 (memory, redis)
    pub backend: String,
    /// 지문 유지 시간 (초)
    pub ttl_secs: u64,
    /// 메모리 저장소 정리 주기 (초)
    pub sweep_interval_secs: u64,
    /// Redis 연결 문자열 (backend = redis)
    pub redis_url: String,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            backend: "memory".to_owned(),
            ttl_secs: 5,
            sweep_interval_secs: 60,
            redis_url: "redis://localhost:6379".to_owned(),
        }
    }
}

impl DedupConfig {
    fn validate(&self) -> Result<(), NetlogError> {
        if !self.enabled {
            return Ok(());
        }
        let valid_backends = ["memory", "redis"];
        if !valid_backends.contains(&self.backend.as_str()) {
            return Err(invalid(
                "engine.dedup.backend",
                format!("must be one of: {}", valid_backends.join(", ")),
            ));
        }
        if self.ttl_secs == 0 {
            return Err(invalid(
                "engine.dedup.ttl_secs",
                "must be at least 1".to_owned(),
            ));
        }
        if self.backend == "memory" && self.sweep_interval_secs == 0 {
            return Err(invalid(
                "engine.dedup.sweep_interval_secs",
                "must be at least 1".to_owned(),
            ));
        }
        if self.backend == "redis" && self.redis_url.is_empty() {
            return Err(invalid(
                "engine.dedup.redis_url",
                "must not be empty when backend is redis".to_owned(),
            ));
        }
        Ok(())
    }
}

/// 키 교환 / 보안 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// 암호화/서명 및 키 교환 비활성화
    pub disable_security: bool,
    /// 키 교환 바인드 주소
    pub address: String,
    /// 키 교환 포트
    pub port: u16,
    /// TLS 인증서 (PEM) 경로
    pub certificate: String,
    /// TLS 개인키 (PEM) 경로
    pub keyfile: String,
    /// 핸드셰이크 토큰 송수신 타임아웃 (초)
    pub timeout_secs: u64,
    /// 동시 인증 연결 최대 수
    pub max_connections: usize,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            disable_security: false,
            address: "0.0.0.0".to_owned(),
            port: DEFAULT_AUTH_PORT,
            certificate: String::new(),
            keyfile: String::new(),
            timeout_secs: 5,
            max_connections: 5,
        }
    }
}

impl AuthConfig {
    fn validate(&self) -> Result<(), NetlogError> {
        if self.disable_security {
            return Ok(());
        }
        if self.certificate.is_empty() {
            return Err(invalid(
                "auth.certificate",
                "a certificate is required unless security is disabled".to_owned(),
            ));
        }
        if self.keyfile.is_empty() {
            return Err(invalid(
                "auth.keyfile",
                "a keyfile is required unless security is disabled".to_owned(),
            ));
        }
        if self.port == 0 {
            return Err(invalid("auth.port", "must be non-zero".to_owned()));
        }
        if self.timeout_secs == 0 {
            return Err(invalid("auth.timeout_secs", "must be at least 1".to_owned()));
        }
        if self.max_connections == 0 {
            return Err(invalid(
                "auth.max_connections",
                "must be at least 1".to_owned(),
            ));
        }
        Ok(())
    }
}

/// 수신 리스너 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// 리스너 종류 (udp, tcp)
    #[serde(rename = "type")]
    pub kind: String,
    /// 바인드 주소
    pub address: String,
    /// 바인드 포트
    pub port: u16,
    /// 수신 버퍼 크기 (바이트)
    pub buffer_size: usize,
    /// TCP 동시 연결 최대 수
    pub max_clients: usize,
    /// TCP 유휴 연결 타임아웃 (초)
    pub read_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            kind: "udp".to_owned(),
            address: "0.0.0.0".to_owned(),
            port: 514,
            buffer_size: 1024,
            max_clients: 5,
            read_timeout_secs: 60,
        }
    }
}

/// 발행자 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublisherConfig {
    /// 발행자 이름 (메트릭 라벨, 로그에 사용)
    pub name: String,
    /// 출력 전송 방식 (log, cli, print, console, tcp)
    pub transport: String,
    /// 바인드 주소 (tcp)
    pub address: String,
    /// 바인드 포트 (tcp)
    pub port: u16,
    /// RAW 엔벨로프 발행
    pub send_raw: bool,
    /// UNKNOWN 엔벨로프 발행
    pub send_unknown: bool,
    /// RAW 엔벨로프만 발행
    pub only_raw: bool,
    /// UNKNOWN 엔벨로프만 발행
    pub only_unknown: bool,
    /// 허용할 에러 분류 (glob / 정규식 허용)
    pub error_whitelist: Vec<String>,
    /// 차단할 에러 분류 (glob / 정규식 허용)
    pub error_blacklist: Vec<String>,
    /// 발행 전에 `message_details` 제거
    pub strip_message_details: bool,
    /// 직렬화 방식 (비어 있으면 engine.serializer)
    pub serializer: String,
    /// 이 발행자에 한해 암호화 생략
    pub disable_security: bool,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            name: "default".to_owned(),
            transport: "tcp".to_owned(),
            address: "0.0.0.0".to_owned(),
            port: DEFAULT_PUBLISH_PORT,
            send_raw: false,
            send_unknown: false,
            only_raw: false,
            only_unknown: false,
            error_whitelist: Vec::new(),
            error_blacklist: Vec::new(),
            strip_message_details: false,
            serializer: String::new(),
            disable_security: false,
        }
    }
}

impl PublisherConfig {
    fn validate(&self, idx: usize) -> Result<(), NetlogError> {
        if self.name.is_empty() {
            return Err(invalid(
                &format!("publishers[{idx}].name"),
                "must not be empty".to_owned(),
            ));
        }
        if self.only_raw && self.only_unknown {
            return Err(invalid(
                &format!("publishers[{idx}]"),
                "only_raw and only_unknown are mutually exclusive".to_owned(),
            ));
        }
        let valid_serializers = ["", "json", "msgpack"];
        if !valid_serializers.contains(&self.serializer.as_str()) {
            return Err(invalid(
                &format!("publishers[{idx}].serializer"),
                "must be one of: json, msgpack".to_owned(),
            ));
        }
        Ok(())
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_u16(target: &mut u16, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u16>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse port from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}

fn override_csv(target: &mut Vec<String>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val
            .split(',')
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect();
    }
}
