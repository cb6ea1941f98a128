//! 구독자 클라이언트 -- 키 교환, keepalive, 재연결, 복호화
//!
//! # 사용 예시
//! ```no_run
//! # async fn example(bytes: &[u8]) -> Result<(), netlog_auth::AuthError> {
//! use netlog_auth::client::{AuthClient, AuthClientConfig};
//!
//! let config = AuthClientConfig::new("127.0.0.1", "/etc/netlog/tls/server.crt");
//! let client = AuthClient::connect(config).await?;
//! let envelope = client.decrypt(bytes)?;
//! println!("{} from {}", envelope.error, envelope.host);
//! client.stop().await;
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use netlog_core::config::socket_addr;
use netlog_core::envelope::Envelope;
use parking_lot::RwLock;
use rustls::pki_types::ServerName;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::codec::Codec;
use crate::error::AuthError;
use crate::keys::Decryptor;
use crate::protocol::{
    AUTH_KEEP_ALIVE_INTERVAL, AUTH_MAX_TRY, AUTH_PORT, AUTH_TIMEOUT, initiate, keepalive_ping,
};
use crate::tls;

/// 구독자 클라이언트 설정
#[derive(Debug, Clone)]
pub struct AuthClientConfig {
    /// 키 교환 서버 주소
    pub address: String,
    /// 키 교환 서버 포트
    pub port: u16,
    /// 서버 인증서(또는 발급 CA) PEM 경로
    pub certificate: PathBuf,
    /// TLS 서버 이름 검증에 쓸 이름
    pub server_name: String,
    /// 토큰 송수신 타임아웃이자 재시도 간격
    pub timeout: Duration,
    /// 연결 최대 시도 횟수 (0 이면 무제한)
    pub max_try: u32,
    /// keepalive 주기
    pub keepalive_interval: Duration,
    /// 발행 바이트의 직렬화 방식
    pub codec: Codec,
}

impl AuthClientConfig {
    /// 기본값으로 설정을 만듭니다. 서버 이름은 `localhost` 입니다.
    pub fn new(address: impl Into<String>, certificate: impl Into<PathBuf>) -> Self {
        Self {
            address: address.into(),
            port: AUTH_PORT,
            certificate: certificate.into(),
            server_name: "localhost".to_owned(),
            timeout: AUTH_TIMEOUT,
            max_try: AUTH_MAX_TRY,
            keepalive_interval: AUTH_KEEP_ALIVE_INTERVAL,
            codec: Codec::default(),
        }
    }
}

type Session = TlsStream<TcpStream>;

/// 인증된 구독자 클라이언트
pub struct AuthClient {
    decryptor: Arc<RwLock<Decryptor>>,
    codec: Codec,
    cancel: CancellationToken,
    keepalive: JoinHandle<()>,
}

impl AuthClient {
    /// 서버에 연결해 키를 받고 keepalive 태스크를 시작합니다.
    pub async fn connect(config: AuthClientConfig) -> Result<Self, AuthError> {
        let connector = TlsConnector::from(tls::client_config_from_file(&config.certificate)?);
        let (session, decryptor) = authenticate(&connector, &config).await?;

        let decryptor = Arc::new(RwLock::new(decryptor));
        let cancel = CancellationToken::new();
        let keepalive = tokio::spawn(keep_alive(
            session,
            connector,
            config.clone(),
            Arc::clone(&decryptor),
            cancel.clone(),
        ));

        Ok(Self {
            decryptor,
            codec: config.codec,
            cancel,
            keepalive,
        })
    }

    /// 서명을 검증하고 복호화한 뒤 엔벨로프로 역직렬화합니다.
    pub fn decrypt(&self, sealed: &[u8]) -> Result<Envelope, AuthError> {
        let plain = self.decrypt_bytes(sealed)?;
        self.codec.decode(&plain)
    }

    /// 서명을 검증하고 복호화한 평문 바이트를 반환합니다.
    pub fn decrypt_bytes(&self, sealed: &[u8]) -> Result<Vec<u8>, AuthError> {
        self.decryptor.read().open(sealed)
    }

    /// keepalive 태스크를 멈추고 연결을 닫습니다.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.keepalive.await {
            warn!(error = %e, "keepalive task ended abnormally");
        }
    }
}

async fn authenticate(
    connector: &TlsConnector,
    config: &AuthClientConfig,
) -> Result<(Session, Decryptor), AuthError> {
    let addr = socket_addr(&config.address, config.port);
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match establish(connector, config, &addr).await {
            Ok(established) => return Ok(established),
            Err(e) => {
                if config.max_try != 0 && attempt >= config.max_try {
                    error!(%addr, attempts = attempt, "giving up on authentication");
                    return Err(AuthError::Connect {
                        addr,
                        attempts: attempt,
                        reason: e.to_string(),
                    });
                }
                warn!(%addr, attempt, error = %e, "unable to authenticate, retrying");
                tokio::time::sleep(config.timeout).await;
            }
        }
    }
}

async fn establish(
    connector: &TlsConnector,
    config: &AuthClientConfig,
    addr: &str,
) -> Result<(Session, Decryptor), AuthError> {
    let tcp = timeout(config.timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| AuthError::Tls(format!("connect to {addr} timed out")))??;
    let server_name = ServerName::try_from(config.server_name.clone())
        .map_err(|e| AuthError::Tls(format!("invalid server name: {e}")))?;
    let mut session = timeout(config.timeout, connector.connect(server_name, tcp))
        .await
        .map_err(|_| AuthError::Tls(format!("tls handshake with {addr} timed out")))?
        .map_err(|e| AuthError::Tls(e.to_string()))?;

    let decryptor = initiate(&mut session, config.timeout).await?;
    info!(%addr, "authenticated to netlog");
    Ok((session, decryptor))
}

async fn keep_alive(
    mut session: Session,
    connector: TlsConnector,
    config: AuthClientConfig,
    decryptor: Arc<RwLock<Decryptor>>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(config.keepalive_interval) => {}
        }

        debug!("sending keep-alive message to the server");
        let result = tokio::select! {
            () = cancel.cancelled() => break,
            result = keepalive_ping(&mut session, config.timeout) => result,
        };
        if let Err(e) = result {
            warn!(error = %e, "keep-alive failed, re-authenticating");
            let reconnected = tokio::select! {
                () = cancel.cancelled() => break,
                result = authenticate(&connector, &config) => result,
            };
            match reconnected {
                Ok((new_session, new_decryptor)) => {
                    session = new_session;
                    *decryptor.write() = new_decryptor;
                }
                Err(e) => {
                    error!(error = %e, "unable to re-authenticate, keep-alive stopped");
                    break;
                }
            }
        }
    }
}
