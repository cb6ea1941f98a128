//! 표준 출력 전송 (`cli`, `print`, `console`)

use netlog_core::pipeline::BoxFuture;
use tokio::io::{AsyncWrite, AsyncWriteExt, Stdout};

use super::{Transport, printable};
use crate::error::EngineError;

/// 한 줄에 엔벨로프 하나씩 쓰는 전송
#[derive(Debug)]
pub struct CliTransport<W = Stdout> {
    writer: W,
}

impl CliTransport<Stdout> {
    /// 표준 출력으로 씁니다.
    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }
}

impl<W> CliTransport<W>
where
    W: AsyncWrite + Unpin + Send,
{
    /// 임의의 writer 로 씁니다.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// writer 를 돌려받습니다.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W> Transport for CliTransport<W>
where
    W: AsyncWrite + Unpin + Send,
{
    fn name(&self) -> &'static str {
        "cli"
    }

    fn start(&mut self) -> BoxFuture<'_, Result<(), EngineError>> {
        Box::pin(async { Ok(()) })
    }

    fn publish<'a>(&'a mut self, payload: &'a [u8]) -> BoxFuture<'a, Result<(), EngineError>> {
        Box::pin(async move {
            let mut line = printable(payload);
            line.push('\n');
            self.writer.write_all(line.as_bytes()).await?;
            self.writer.flush().await?;
            Ok(())
        })
    }

    fn stop(&mut self) -> BoxFuture<'_, Result<(), EngineError>> {
        Box::pin(async move {
            self.writer.flush().await?;
            Ok(())
        })
    }

    fn requires_encryption(&self) -> bool {
        false
    }
}
