//! 키 교환 / 암호화 에러 타입

use netlog_core::error::NetlogError;

use crate::protocol::HandshakeState;

/// 키 교환 및 암호화 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// 키 교환 소켓 바인드 실패
    #[error("failed to bind auth socket {addr}: {reason}")]
    Bind { addr: String, reason: String },

    /// 인증서와 개인키가 서로 맞지 않음
    #[error("certificate {certificate} does not match keyfile {keyfile}")]
    CertificateMismatch {
        certificate: String,
        keyfile: String,
    },

    /// 인증서 / 개인키 로드 실패
    #[error("certificate error for {path}: {reason}")]
    Certificate { path: String, reason: String },

    /// TLS 설정 또는 TLS 핸드셰이크 실패
    #[error("tls error: {0}")]
    Tls(String),

    /// 예상하지 못한 토큰을 받음
    #[error("unexpected token in state {state:?}: {received:?}")]
    UnexpectedToken {
        state: HandshakeState,
        received: String,
    },

    /// 잘못된 키 교환 페이로드
    #[error("invalid key exchange payload: {0}")]
    InvalidKey(String),

    /// 송수신 타임아웃
    #[error("timed out in state {state:?}")]
    Timeout { state: HandshakeState },

    /// 서버 연결 실패 (재시도 소진)
    #[error("unable to authenticate to {addr} after {attempts} attempts: {reason}")]
    Connect {
        addr: String,
        attempts: u32,
        reason: String,
    },

    /// 암호화 / 복호화 실패
    #[error("crypto error: {0}")]
    Crypto(String),

    /// 서명 검증 실패
    #[error("signature was forged or corrupt")]
    BadSignature,

    /// 알 수 없는 직렬화 방식
    #[error("unknown serializer: {0}")]
    UnknownSerializer(String),

    /// 직렬화 실패
    #[error("failed to encode envelope: {0}")]
    Encode(String),

    /// 역직렬화 실패
    #[error("failed to decode envelope: {0}")]
    Decode(String),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<AuthError> for NetlogError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Io(e) => NetlogError::Io(e),
            other => NetlogError::Auth(other.to_string()),
        }
    }
}
