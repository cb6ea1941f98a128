//! 수신 리스너 -- 원시 syslog 바이트를 받아 디스패처로 넘깁니다.
//!
//! - [`UdpListener`]: 데이터그램 하나가 메시지 하나
//! - [`TcpListener`]: 줄 단위 프레이밍, 연결 수 제한, 유휴 타임아웃
//!
//! 리스너는 엔진 시작 시 바인드되므로 주소 문제는 시작 단계에서 드러납니다.
//! 실행 중에는 각자 tokio 태스크에서 돌며 `mpsc::Sender<RawMessage>` 로 디스패처에
//! 메시지를 보냅니다.

pub mod tcp;
pub mod udp;

pub use tcp::TcpListener;
pub use udp::UdpListener;

use std::net::SocketAddr;

use netlog_core::config::{ListenerConfig, socket_addr};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::EngineError;
use crate::message::RawMessage;

/// 지원하는 리스너 이름
pub const LISTENER_KINDS: [&str; 2] = ["udp", "tcp"];

/// 바인드된 리스너
#[derive(Debug)]
pub enum Listener {
    /// UDP
    Udp(UdpListener),
    /// TCP
    Tcp(TcpListener),
}

impl Listener {
    /// 설정에 따라 리스너를 바인드합니다.
    ///
    /// 알 수 없는 종류는 [`EngineError::Listener`], 바인드 실패는 [`EngineError::Bind`].
    pub async fn bind(config: &ListenerConfig) -> Result<Self, EngineError> {
        let addr = socket_addr(&config.address, config.port);
        match config.kind.as_str() {
            "udp" => Ok(Self::Udp(UdpListener::bind(&addr, config.buffer_size).await?)),
            "tcp" => Ok(Self::Tcp(TcpListener::bind(&addr, config).await?)),
            other => Err(EngineError::Listener {
                kind: other.to_owned(),
                reason: format!("unknown listener, expected one of: {}", LISTENER_KINDS.join(", ")),
            }),
        }
    }

    /// 리스너 종류
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Udp(_) => "udp",
            Self::Tcp(_) => "tcp",
        }
    }

    /// 실제 바인드된 주소
    pub fn local_addr(&self) -> SocketAddr {
        match self {
            Self::Udp(l) => l.local_addr(),
            Self::Tcp(l) => l.local_addr(),
        }
    }

    /// 취소될 때까지 수신합니다.
    pub async fn run(
        self,
        tx: mpsc::Sender<RawMessage>,
        cancel: CancellationToken,
    ) -> Result<(), EngineError> {
        match self {
            Self::Udp(l) => l.run(tx, cancel).await,
            Self::Tcp(l) => l.run(tx, cancel).await,
        }
    }
}

/// 디스패처 채널로 보냅니다. 채널이 닫혔을 때 이미 취소 중이면 조용히 끝냅니다.
pub(crate) async fn forward(
    tx: &mpsc::Sender<RawMessage>,
    message: RawMessage,
    kind: &'static str,
    cancel: &CancellationToken,
) -> Result<bool, EngineError> {
    metrics::counter!(
        netlog_core::metrics::LISTENER_MESSAGES_RECEIVED_TOTAL,
        netlog_core::metrics::LABEL_LISTENER => kind
    )
    .increment(1);

    match tx.send(message).await {
        Ok(()) => Ok(true),
        Err(_) if cancel.is_cancelled() => Ok(false),
        Err(e) => Err(EngineError::Channel(format!("{kind} listener: {e}"))),
    }
}
