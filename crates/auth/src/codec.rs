//! 엔벨로프 직렬화 방식 (json, msgpack)

use std::fmt;
use std::str::FromStr;

use netlog_core::envelope::Envelope;

use crate::error::AuthError;

/// 발행 바이트의 직렬화 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Codec {
    /// JSON
    Json,
    /// MessagePack (필드 이름 포함)
    #[default]
    Msgpack,
}

impl Codec {
    /// 엔벨로프를 직렬화합니다.
    pub fn encode(&self, envelope: &Envelope) -> Result<Vec<u8>, AuthError> {
        match self {
            Self::Json => {
                serde_json::to_vec(envelope).map_err(|e| AuthError::Encode(e.to_string()))
            }
            Self::Msgpack => {
                rmp_serde::to_vec_named(envelope).map_err(|e| AuthError::Encode(e.to_string()))
            }
        }
    }

    /// 바이트를 엔벨로프로 역직렬화합니다.
    pub fn decode(&self, bytes: &[u8]) -> Result<Envelope, AuthError> {
        match self {
            Self::Json => {
                serde_json::from_slice(bytes).map_err(|e| AuthError::Decode(e.to_string()))
            }
            Self::Msgpack => {
                rmp_serde::from_slice(bytes).map_err(|e| AuthError::Decode(e.to_string()))
            }
        }
    }
}

impl FromStr for Codec {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(Self::Json),
            "msgpack" => Ok(Self::Msgpack),
            other => Err(AuthError::UnknownSerializer(other.to_owned())),
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json => write!(f, "json"),
            Self::Msgpack => write!(f, "msgpack"),
        }
    }
}

/// 보안이 꺼진 배포에서 발행 바이트를 엔벨로프로 되돌립니다.
pub fn unserialize(bytes: &[u8], codec: Codec) -> Result<Envelope, AuthError> {
    codec.decode(bytes)
}
