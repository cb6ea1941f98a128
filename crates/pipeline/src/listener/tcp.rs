//! TCP syslog 리스너
//!
//! 한 줄이 메시지 하나입니다. 연결마다 별도 태스크에서 읽으며,
//! 동시 연결 수는 세마포어로 제한하고 유휴 연결은 타임아웃으로 끊습니다.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use netlog_core::config::ListenerConfig;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{Semaphore, mpsc};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::forward;
use crate::error::EngineError;
use crate::message::RawMessage;

const KIND: &str = "tcp";

/// 한 줄의 최대 길이 (바이트)
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// TCP 리스너
#[derive(Debug)]
pub struct TcpListener {
    listener: tokio::net::TcpListener,
    local_addr: SocketAddr,
    max_clients: usize,
    read_timeout: Duration,
}

impl TcpListener {
    /// 주소에 바인드합니다.
    pub async fn bind(addr: &str, config: &ListenerConfig) -> Result<Self, EngineError> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| EngineError::Bind {
                addr: addr.to_owned(),
                reason: e.to_string(),
            })?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
            max_clients: config.max_clients.max(1),
            read_timeout: Duration::from_secs(config.read_timeout_secs.max(1)),
        })
    }

    /// 바인드된 주소
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// 취소될 때까지 연결을 받습니다.
    pub async fn run(
        self,
        tx: mpsc::Sender<RawMessage>,
        cancel: CancellationToken,
    ) -> Result<(), EngineError> {
        info!(addr = %self.local_addr, max_clients = self.max_clients, "TCP syslog listener started");
        let connections = Arc::new(Semaphore::new(self.max_clients));

        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    let (stream, peer) = match result {
                        Ok(accepted) => accepted,
                        Err(_) if cancel.is_cancelled() => break,
                        Err(e) => {
                            return Err(EngineError::Listener {
                                kind: KIND.to_owned(),
                                reason: format!("accept error: {e}"),
                            });
                        }
                    };

                    let Ok(permit) = connections.clone().try_acquire_owned() else {
                        warn!(peer = %peer, max_clients = self.max_clients, "max connections reached, rejecting");
                        continue;
                    };

                    debug!(peer = %peer, "accepted syslog connection");
                    let tx = tx.clone();
                    let cancel = cancel.clone();
                    let read_timeout = self.read_timeout;
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, peer, tx, read_timeout, cancel).await {
                            warn!(peer = %peer, error = %e, "syslog connection closed with error");
                        }
                        drop(permit);
                    });
                }
                _ = cancel.cancelled() => {
                    debug!(addr = %self.local_addr, "TCP listener received shutdown signal");
                    break;
                }
            }
        }

        Ok(())
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    tx: mpsc::Sender<RawMessage>,
    read_timeout: Duration,
    cancel: CancellationToken,
) -> Result<(), EngineError> {
    let mut reader = BufReader::new(stream);
    let mut line = Vec::new();
    let source = peer.ip().to_string();

    loop {
        line.clear();
        let mut limited = (&mut reader).take(MAX_LINE_BYTES as u64 + 1);
        tokio::select! {
            // 한 줄은 MAX_LINE_BYTES + 개행까지만 버퍼에 담습니다.
            result = timeout(
                read_timeout,
                limited.read_until(b'\n', &mut line),
            ) => {
                match result {
                    Ok(Ok(0)) => {
                        debug!(peer = %peer, "connection closed by peer");
                        break;
                    }
                    Ok(Ok(_)) => {
                        if line.len() > MAX_LINE_BYTES && line.last() != Some(&b'\n') {
                            warn!(peer = %peer, bytes = line.len(), "line exceeds maximum size, closing connection");
                            break;
                        }
                        let trimmed = trim_line_end(&line);
                        if trimmed.iter().all(u8::is_ascii_whitespace) {
                            continue;
                        }
                        let message = RawMessage::new(Bytes::copy_from_slice(trimmed), source.clone());
                        if !forward(&tx, message, KIND, &cancel).await? {
                            break;
                        }
                    }
                    Ok(Err(e)) => {
                        return Err(EngineError::Listener {
                            kind: KIND.to_owned(),
                            reason: format!("read error from {peer}: {e}"),
                        });
                    }
                    Err(_) => {
                        debug!(peer = %peer, "idle connection timed out");
                        break;
                    }
                }
            }
            _ = cancel.cancelled() => break,
        }
    }

    Ok(())
}

fn trim_line_end(line: &[u8]) -> &[u8] {
    let end = line
        .iter()
        .rposition(|b| !matches!(b, b'\n' | b'\r'))
        .map_or(0, |i| i + 1);
    &line[..end]
}
