//! TCP 발행 전송
//!
//! 구독자는 발행 포트에 접속해 프레임을 받기만 합니다. 프레임은
//! 빅엔디언 `u32` 길이 + 페이로드이며, 모든 연결된 구독자에게 같은 프레임을 보냅니다.
//! 구독자마다 쓰기 태스크와 작은 큐가 있고, 큐가 가득 찬 구독자는 그 프레임을 놓칩니다.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use netlog_core::config::socket_addr;
use netlog_core::pipeline::BoxFuture;
use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::Transport;
use crate::error::EngineError;

/// 구독자별 대기 프레임 수
pub const SUBSCRIBER_QUEUE: usize = 1024;

type Subscribers = Arc<Mutex<Vec<mpsc::Sender<Bytes>>>>;

/// TCP 브로드캐스트 전송
#[derive(Debug)]
pub struct TcpTransport {
    addr: String,
    local_addr: Option<SocketAddr>,
    subscribers: Subscribers,
    cancel: CancellationToken,
}

impl TcpTransport {
    /// 바인드 주소로 만듭니다. 바인드는 `start` 에서 합니다.
    pub fn new(address: &str, port: u16) -> Self {
        Self {
            addr: socket_addr(address, port),
            local_addr: None,
            subscribers: Arc::new(Mutex::new(Vec::new())),
            cancel: CancellationToken::new(),
        }
    }

    /// 시작 후 실제 바인드된 주소
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// 연결된 구독자 수
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

impl Transport for TcpTransport {
    fn name(&self) -> &'static str {
        "tcp"
    }

    fn start(&mut self) -> BoxFuture<'_, Result<(), EngineError>> {
        Box::pin(async move {
            let listener = TcpListener::bind(&self.addr)
                .await
                .map_err(|e| EngineError::Bind {
                    addr: self.addr.clone(),
                    reason: e.to_string(),
                })?;
            let local_addr = listener.local_addr()?;
            self.local_addr = Some(local_addr);
            info!(addr = %local_addr, "TCP publish transport listening");

            tokio::spawn(accept_loop(
                listener,
                self.subscribers.clone(),
                self.cancel.clone(),
            ));
            Ok(())
        })
    }

    fn publish<'a>(&'a mut self, payload: &'a [u8]) -> BoxFuture<'a, Result<(), EngineError>> {
        Box::pin(async move {
            let frame = Bytes::copy_from_slice(payload);
            self.subscribers.lock().retain(|subscriber| {
                match subscriber.try_send(frame.clone()) {
                    Ok(()) => true,
                    Err(TrySendError::Full(_)) => {
                        warn!("subscriber queue full, frame dropped");
                        true
                    }
                    Err(TrySendError::Closed(_)) => false,
                }
            });
            Ok(())
        })
    }

    fn stop(&mut self) -> BoxFuture<'_, Result<(), EngineError>> {
        Box::pin(async move {
            self.cancel.cancel();
            self.subscribers.lock().clear();
            Ok(())
        })
    }
}

async fn accept_loop(listener: TcpListener, subscribers: Subscribers, cancel: CancellationToken) {
    loop {
        tokio::select! {
            result = listener.accept() => match result {
                Ok((stream, peer)) => {
                    debug!(peer = %peer, "subscriber connected");
                    let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE);
                    subscribers.lock().push(tx);
                    tokio::spawn(write_frames(stream, peer, rx, cancel.clone()));
                }
                Err(e) => warn!(error = %e, "failed to accept subscriber"),
            },
            _ = cancel.cancelled() => break,
        }
    }
}

async fn write_frames(
    mut stream: TcpStream,
    peer: SocketAddr,
    mut rx: mpsc::Receiver<Bytes>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            frame = rx.recv() => {
                let Some(frame) = frame else { break };
                let Ok(len) = u32::try_from(frame.len()) else {
                    warn!(peer = %peer, bytes = frame.len(), "frame too large, skipped");
                    continue;
                };
                let written = async {
                    stream.write_u32(len).await?;
                    stream.write_all(&frame).await
                };
                if let Err(e) = written.await {
                    debug!(peer = %peer, error = %e, "subscriber disconnected");
                    break;
                }
            }
            _ = cancel.cancelled() => break,
        }
    }
}
