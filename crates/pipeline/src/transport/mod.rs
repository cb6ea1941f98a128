//! 발행 전송 -- 발행자가 만든 바이트를 밖으로 내보냅니다.
//!
//! | 이름 | 구현 | 암호화 |
//! |---|---|---|
//! | `log` | [`LogTransport`] (tracing 이벤트) | 안 함 |
//! | `cli`, `print`, `console` | [`CliTransport`] (표준 출력) | 안 함 |
//! | `tcp` | [`TcpTransport`] (길이 접두 프레임, 모든 구독자에게) | 함 |

pub mod cli;
pub mod log;
pub mod tcp;

pub use cli::CliTransport;
pub use log::LogTransport;
pub use tcp::TcpTransport;

use std::sync::Arc;

use netlog_core::config::PublisherConfig;
use netlog_core::pipeline::BoxFuture;

use crate::error::EngineError;

/// 지원하는 전송 이름
pub const TRANSPORT_NAMES: [&str; 5] = ["log", "cli", "print", "console", "tcp"];

/// 발행 전송
pub trait Transport: Send {
    /// 전송 이름 (메트릭 라벨)
    fn name(&self) -> &'static str;

    /// 소켓 바인드 등 준비 작업
    fn start(&mut self) -> BoxFuture<'_, Result<(), EngineError>>;

    /// 바이트 하나를 내보냅니다.
    fn publish<'a>(&'a mut self, payload: &'a [u8]) -> BoxFuture<'a, Result<(), EngineError>>;

    /// 정리 작업
    fn stop(&mut self) -> BoxFuture<'_, Result<(), EngineError>>;

    /// 보안이 켜져 있을 때 암호화가 필요한지
    fn requires_encryption(&self) -> bool {
        true
    }
}

/// 발행자 설정으로 전송을 만드는 함수 ([`crate::EngineBuilder::publisher_transport`])
pub type TransportFactory = Arc<dyn Fn(&PublisherConfig) -> Box<dyn Transport> + Send + Sync>;

/// 발행자 설정에 맞는 전송을 만듭니다.
pub fn build_transport(config: &PublisherConfig) -> Result<Box<dyn Transport>, EngineError> {
    match config.transport.as_str() {
        "log" => Ok(Box::new(LogTransport::new(&config.name))),
        "cli" | "print" | "console" => Ok(Box::new(CliTransport::stdout())),
        "tcp" => Ok(Box::new(TcpTransport::new(&config.address, config.port))),
        other => Err(EngineError::Transport {
            name: other.to_owned(),
            reason: format!("unknown transport, expected one of: {}", TRANSPORT_NAMES.join(", ")),
        }),
    }
}

/// 사람이 읽을 수 있게 바꿉니다. UTF-8 이 아니면 base64.
pub(crate) fn printable(payload: &[u8]) -> String {
    use base64::Engine as _;

    match std::str::from_utf8(payload) {
        Ok(text) => text.to_owned(),
        Err(_) => base64::engine::general_purpose::STANDARD.encode(payload),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(transport: &str) -> PublisherConfig {
        PublisherConfig {
            transport: transport.to_owned(),
            ..PublisherConfig::default()
        }
    }

    #[test]
    fn known_transports_build() {
        for name in TRANSPORT_NAMES {
            assert!(build_transport(&config(name)).is_ok(), "{name}");
        }
    }

    #[test]
    fn unknown_transport_is_rejected() {
        let err = build_transport(&config("kafka")).err().unwrap();
        assert!(matches!(err, EngineError::Transport { ref name, .. } if name == "kafka"));
    }

    #[test]
    fn only_tcp_requires_encryption() {
        assert!(!build_transport(&config("log")).unwrap().requires_encryption());
        assert!(!build_transport(&config("console")).unwrap().requires_encryption());
        assert!(build_transport(&config("tcp")).unwrap().requires_encryption());
    }

    #[test]
    fn printable_falls_back_to_base64() {
        assert_eq!(printable(b"{\"a\":1}"), "{\"a\":1}");
        assert_eq!(printable(&[0xff, 0x00]), "/wA=");
    }
}
