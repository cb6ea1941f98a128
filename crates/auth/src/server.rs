//! 키 교환 서버 -- TLS 위에서 구독자에게 키를 나눠줍니다.
//!
//! 연결마다 별도 태스크에서 [`ServerHandshake`]를 실행하며,
//! 동시 연결 수는 세마포어로 제한합니다.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use netlog_core::config::{AuthConfig, socket_addr};
use netlog_core::metrics as m;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::AuthError;
use crate::keys::KeyMaterial;
use crate::protocol::{AUTH_KEEP_ALIVE_IDLE, ServerHandshake};

/// 키 교환 서버 설정
#[derive(Debug, Clone)]
pub struct AuthServerConfig {
    /// 바인드 주소 (예: "0.0.0.0:49018")
    pub bind_addr: String,
    /// 토큰 송수신 및 TLS 핸드셰이크 타임아웃
    pub io_timeout: Duration,
    /// keepalive 대기 최대 시간
    pub keepalive_idle: Duration,
    /// 동시 연결 최대 수
    pub max_connections: usize,
}

impl From<&AuthConfig> for AuthServerConfig {
    fn from(config: &AuthConfig) -> Self {
        Self {
            bind_addr: socket_addr(&config.address, config.port),
            io_timeout: Duration::from_secs(config.timeout_secs),
            keepalive_idle: AUTH_KEEP_ALIVE_IDLE,
            max_connections: config.max_connections,
        }
    }
}

/// 바인드된 키 교환 서버
pub struct AuthServer {
    listener: TcpListener,
    acceptor: TlsAcceptor,
    keys: Arc<KeyMaterial>,
    config: AuthServerConfig,
}

impl AuthServer {
    /// 소켓을 바인드합니다. 실패하면 [`AuthError::Bind`] 를 반환합니다.
    pub async fn bind(
        config: AuthServerConfig,
        tls: Arc<rustls::ServerConfig>,
        keys: Arc<KeyMaterial>,
    ) -> Result<Self, AuthError> {
        let listener = TcpListener::bind(&config.bind_addr)
            .await
            .map_err(|e| AuthError::Bind {
                addr: config.bind_addr.clone(),
                reason: e.to_string(),
            })?;
        info!(addr = %config.bind_addr, "auth server listening");
        Ok(Self {
            listener,
            acceptor: TlsAcceptor::from(tls),
            keys,
            config,
        })
    }

    /// 실제로 바인드된 주소
    pub fn local_addr(&self) -> Result<SocketAddr, AuthError> {
        Ok(self.listener.local_addr()?)
    }

    /// 연결 수락 루프를 실행합니다. 취소되면 `Ok(())` 로 끝납니다.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), AuthError> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_connections));

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("auth server received shutdown signal");
                    break;
                }
                result = self.listener.accept() => {
                    let (stream, addr) = match result {
                        Ok(accepted) => accepted,
                        Err(e) if cancel.is_cancelled() => {
                            debug!(error = %e, "accept failed during shutdown");
                            break;
                        }
                        Err(e) => return Err(AuthError::Io(e)),
                    };

                    let permit = match semaphore.clone().try_acquire_owned() {
                        Ok(p) => p,
                        Err(_) => {
                            warn!(%addr, "max auth connections reached, rejecting");
                            continue;
                        }
                    };
                    counter!(m::AUTH_CONNECTIONS_TOTAL).increment(1);

                    let acceptor = self.acceptor.clone();
                    let keys = Arc::clone(&self.keys);
                    let config = self.config.clone();
                    let cancel = cancel.clone();
                    tokio::spawn(async move {
                        if let Err(e) = serve_connection(stream, addr, acceptor, &keys, &config, &cancel).await {
                            counter!(m::AUTH_FAILURES_TOTAL).increment(1);
                            warn!(%addr, error = %e, "auth session ended");
                        }
                        drop(permit);
                    });
                }
            }
        }

        Ok(())
    }
}

async fn serve_connection(
    stream: TcpStream,
    addr: SocketAddr,
    acceptor: TlsAcceptor,
    keys: &KeyMaterial,
    config: &AuthServerConfig,
    cancel: &CancellationToken,
) -> Result<(), AuthError> {
    let mut tls = timeout(config.io_timeout, acceptor.accept(stream))
        .await
        .map_err(|_| AuthError::Tls(format!("tls handshake with {addr} timed out")))?
        .map_err(|e| AuthError::Tls(e.to_string()))?;

    let mut handshake = ServerHandshake::new(keys, config.io_timeout);
    handshake.run(&mut tls).await?;
    counter!(m::AUTH_AUTHENTICATED_TOTAL).increment(1);
    info!(%addr, "subscriber authenticated");

    handshake
        .serve_keepalive(&mut tls, config.keepalive_idle, cancel)
        .await
}
