//! UDP syslog 리스너
//!
//! 데이터그램 하나를 메시지 하나로 취급합니다. 버퍼보다 긴 데이터그램은 잘립니다.

use std::net::SocketAddr;

use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::forward;
use crate::error::EngineError;
use crate::message::RawMessage;

const KIND: &str = "udp";

/// UDP 리스너
#[derive(Debug)]
pub struct UdpListener {
    socket: UdpSocket,
    local_addr: SocketAddr,
    buffer_size: usize,
}

impl UdpListener {
    /// 주소에 바인드합니다.
    pub async fn bind(addr: &str, buffer_size: usize) -> Result<Self, EngineError> {
        let socket = UdpSocket::bind(addr).await.map_err(|e| EngineError::Bind {
            addr: addr.to_owned(),
            reason: e.to_string(),
        })?;
        let local_addr = socket.local_addr()?;
        Ok(Self {
            socket,
            local_addr,
            buffer_size: buffer_size.max(1),
        })
    }

    /// 바인드된 주소
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// 취소될 때까지 수신합니다.
    pub async fn run(
        self,
        tx: mpsc::Sender<RawMessage>,
        cancel: CancellationToken,
    ) -> Result<(), EngineError> {
        info!(addr = %self.local_addr, "UDP syslog listener started");
        let mut buf = vec![0u8; self.buffer_size];

        loop {
            tokio::select! {
                result = self.socket.recv_from(&mut buf) => {
                    let (len, peer) = match result {
                        Ok(received) => received,
                        Err(_) if cancel.is_cancelled() => break,
                        Err(e) => {
                            return Err(EngineError::Listener {
                                kind: KIND.to_owned(),
                                reason: format!("receive error: {e}"),
                            });
                        }
                    };
                    if len == 0 {
                        continue;
                    }
                    let message = RawMessage::new(Bytes::copy_from_slice(&buf[..len]), peer.ip().to_string());
                    if !forward(&tx, message, KIND, &cancel).await? {
                        break;
                    }
                }
                _ = cancel.cancelled() => {
                    debug!(addr = %self.local_addr, "UDP listener received shutdown signal");
                    break;
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn datagrams_become_raw_messages() {
        let listener = UdpListener::bind("127.0.0.1:0", 1024).await.unwrap();
        let addr = listener.local_addr();
        let (tx, mut rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(listener.run(tx, cancel.clone()));

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.send_to(b"<14>hello", addr).await.unwrap();

        let message = rx.recv().await.unwrap();
        assert_eq!(&message.data[..], b"<14>hello");
        assert_eq!(message.source, "127.0.0.1");

        cancel.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn bind_failure_reports_address() {
        let taken = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = taken.local_addr().unwrap().to_string();
        let err = UdpListener::bind(&addr, 1024).await.unwrap_err();
        assert!(matches!(err, EngineError::Bind { addr: ref a, .. } if *a == addr));
    }
}
