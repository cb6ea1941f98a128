//! 에러 타입 -- 도메인별 에러 정의
//!
//! 각 크레이트는 자기 도메인 에러(`AuthError`, `EngineError` 등)를 정의하고
//! `From` 구현으로 [`NetlogError`]에 합류합니다.

/// netlog 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum NetlogError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 파이프라인 처리 에러
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// 보안 채널 / 키 교환 에러
    #[error("auth error: {0}")]
    Auth(String),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    /// 장비 프로파일(패턴 테이블) 에러
    ///
    /// `path`는 `os/messages[3]/values` 와 같이 문제가 된 키 경로입니다.
    #[error("invalid profile for '{os}' at '{path}': {reason}")]
    Profile {
        os: String,
        path: String,
        reason: String,
    },

    /// 로드된 프로파일이 하나도 없음
    #[error("no device profiles loaded from {dir}")]
    NoProfiles { dir: String },
}

/// 파이프라인 처리 에러
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// 채널 전송 실패
    #[error("channel send failed: {0}")]
    ChannelSend(String),

    /// 채널 수신 실패
    #[error("channel receive failed: {0}")]
    ChannelRecv(String),

    /// 파이프라인 초기화 실패
    #[error("pipeline init failed: {0}")]
    InitFailed(String),

    /// 이미 실행 중
    #[error("pipeline already running")]
    AlreadyRunning,

    /// 실행 중이 아님
    #[error("pipeline not running")]
    NotRunning,

    /// 실행 단위가 예기치 않게 종료됨
    #[error("unit '{unit}' exited unexpectedly: {reason}")]
    UnitExited { unit: String, reason: String },
}

/// 구조화 객체 조립 에러
#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    /// 빈 경로
    #[error("empty path")]
    EmptyPath,

    /// 경로가 기존 노드 모양과 맞지 않음 (맵 자리에 인덱스, 값 아래로 내려감 등)
    #[error("path conflicts with existing node at '{path}'")]
    Conflict { path: String },

    /// 리스트 인덱스가 허용 범위를 넘음
    #[error("list index at '{path}' exceeds the maximum of {max}")]
    IndexOutOfRange { path: String, max: usize },
}
