//! 파이프라인 에러 타입
//!
//! [`EngineError`]는 프로파일 로딩부터 발행까지 파이프라인 내부의 모든 에러를 표현합니다.
//! `From<EngineError> for NetlogError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 전파할 수 있습니다.

use netlog_core::error::{ConfigError, NetlogError, PipelineError, TreeError};

/// 파이프라인 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// 설정 값 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// 장비 프로파일 에러 (OS 와 키 경로 포함)
    #[error("profile error for '{os}' at '{path}': {reason}")]
    Profile {
        /// 장비 OS 이름
        os: String,
        /// 문제가 된 키 경로 (예: `messages[2]/values`)
        path: String,
        /// 에러 사유
        reason: String,
    },

    /// 프로파일 디렉토리 읽기 실패
    #[error("profile load error: {path}: {reason}")]
    ProfileLoad {
        /// 파일 또는 디렉토리 경로
        path: String,
        /// 에러 사유
        reason: String,
    },

    /// 로드된 프로파일 없음
    #[error("no device profiles loaded from {dir}")]
    NoProfiles {
        /// 프로파일 디렉토리
        dir: String,
    },

    /// 알 수 없는 리스너 또는 리스너 실행 실패
    #[error("listener error: {kind}: {reason}")]
    Listener {
        /// 리스너 종류 (udp, tcp)
        kind: String,
        /// 에러 사유
        reason: String,
    },

    /// 알 수 없는 전송 또는 전송 실패
    #[error("transport error: {name}: {reason}")]
    Transport {
        /// 전송 이름 (log, cli, tcp)
        name: String,
        /// 에러 사유
        reason: String,
    },

    /// 소켓 바인드 실패
    #[error("failed to bind {addr}: {reason}")]
    Bind {
        /// 바인드 주소
        addr: String,
        /// 실패 사유
        reason: String,
    },

    /// 구조화 객체 생성 실패 (메시지 단위, 워커는 계속 동작)
    #[error("mapping error for '{os}' tag '{tag}': {reason}")]
    Mapping {
        /// 장비 OS 이름
        os: String,
        /// 메시지 태그
        tag: String,
        /// 실패 사유
        reason: String,
    },

    /// 중복 제거 저장소 에러
    #[error("dedup store error: {0}")]
    Dedup(String),

    /// 채널 통신 에러
    #[error("channel error: {0}")]
    Channel(String),

    /// 보안 채널 에러
    #[error("auth error: {0}")]
    Auth(#[from] netlog_auth::AuthError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// 정규식 컴파일 에러
    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),

    /// 경로 트리 에러
    #[error("tree error: {0}")]
    Tree(#[from] TreeError),
}

impl From<EngineError> for NetlogError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Profile { os, path, reason } => {
                ConfigError::Profile { os, path, reason }.into()
            }
            EngineError::NoProfiles { dir } => ConfigError::NoProfiles { dir }.into(),
            EngineError::Config { field, reason } => {
                ConfigError::InvalidValue { field, reason }.into()
            }
            EngineError::Auth(e) => e.into(),
            other => NetlogError::Pipeline(PipelineError::InitFailed(other.to_string())),
        }
    }
}
