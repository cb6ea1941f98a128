//! 로그 전송 -- 발행 바이트를 tracing 이벤트로 남깁니다.

use netlog_core::pipeline::BoxFuture;

use super::{Transport, printable};
use crate::error::EngineError;

/// tracing 이벤트 전송
#[derive(Debug)]
pub struct LogTransport {
    publisher: String,
}

impl LogTransport {
    /// 발행자 이름으로 만듭니다.
    pub fn new(publisher: &str) -> Self {
        Self {
            publisher: publisher.to_owned(),
        }
    }
}

impl Transport for LogTransport {
    fn name(&self) -> &'static str {
        "log"
    }

    fn start(&mut self) -> BoxFuture<'_, Result<(), EngineError>> {
        Box::pin(async { Ok(()) })
    }

    fn publish<'a>(&'a mut self, payload: &'a [u8]) -> BoxFuture<'a, Result<(), EngineError>> {
        Box::pin(async move {
            tracing::info!(
                target: "netlog::publish",
                publisher = %self.publisher,
                payload = %printable(payload),
                "envelope"
            );
            Ok(())
        })
    }

    fn stop(&mut self) -> BoxFuture<'_, Result<(), EngineError>> {
        Box::pin(async { Ok(()) })
    }

    fn requires_encryption(&self) -> bool {
        false
    }
}
