//! 키 교환 프로토콜 -- 고정 길이 토큰 기반 핸드셰이크
//!
//! ```text
//! 서버                              구독자
//! ------------------------------------------
//!   | <----------- INIT ------------ |
//!   | ------- 대칭키 (raw) --------> |
//!   | <------------ ACK ------------ |
//!   | ------- 검증키 (hex) --------> |
//!   | <------------ ACK ------------ |
//!   | <-------- KEEPALIVE ---------- |  (반복)
//!   | ------- KEEPALIVEACK --------> |
//! ```
//!
//! 모든 송수신에는 타임아웃이 있으며, 예상과 다른 토큰을 받으면 연결을 닫습니다.
//! 스트림은 `AsyncRead + AsyncWrite` 이면 무엇이든 되므로 TLS 위에서도,
//! 테스트에서는 `tokio::io::duplex` 위에서도 동작합니다.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::AuthError;
use crate::keys::{Decryptor, KeyMaterial, SECRET_KEY_LEN, VERIFY_KEY_HEX_LEN};

/// 프로토콜 버전
pub const PROTOCOL_VERSION: u8 = 1;
/// 구독자의 키 요청 토큰
pub const MAGIC_REQ: &[u8] = b"INIT";
/// 구독자의 수신 확인 토큰
pub const MAGIC_ACK: &[u8] = b"ACK";
/// 구독자의 keepalive 토큰
pub const AUTH_KEEP_ALIVE: &[u8] = b"KEEPALIVE";
/// 서버의 keepalive 응답 토큰
pub const AUTH_KEEP_ALIVE_ACK: &[u8] = b"KEEPALIVEACK";
/// keepalive 전송 주기
pub const AUTH_KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(10);
/// 서버가 keepalive 를 기다리는 최대 시간
pub const AUTH_KEEP_ALIVE_IDLE: Duration = Duration::from_secs(30);
/// 키 교환 기본 포트
pub const AUTH_PORT: u16 = netlog_core::config::DEFAULT_AUTH_PORT;
/// 구독자 연결 최대 재시도 횟수
pub const AUTH_MAX_TRY: u32 = 5;
/// 토큰 송수신 기본 타임아웃
pub const AUTH_TIMEOUT: Duration = Duration::from_secs(5);

/// 서버 측 연결 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// 연결 수락 대기
    Listening,
    /// INIT 대기
    AwaitInit,
    /// 대칭키 전송 완료
    SentKey,
    /// 첫 번째 ACK 대기
    AwaitAck1,
    /// 검증키 전송 완료
    SentSignature,
    /// 두 번째 ACK 대기
    AwaitAck2,
    /// 인증 완료, keepalive 루프
    Authenticated,
    /// 연결 종료
    Closed,
}

/// 서버 측 핸드셰이크 응답자
pub struct ServerHandshake<'k> {
    keys: &'k KeyMaterial,
    io_timeout: Duration,
    state: HandshakeState,
}

impl<'k> ServerHandshake<'k> {
    /// 새 응답자를 만듭니다. 상태는 `AwaitInit` 에서 시작합니다.
    pub fn new(keys: &'k KeyMaterial, io_timeout: Duration) -> Self {
        Self {
            keys,
            io_timeout,
            state: HandshakeState::AwaitInit,
        }
    }

    /// 현재 상태
    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// 핸드셰이크를 끝까지 진행합니다.
    ///
    /// 실패하면 상태는 `Closed` 가 되고 호출자는 연결을 닫아야 합니다.
    pub async fn run<S>(&mut self, stream: &mut S) -> Result<(), AuthError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let result = self.drive(stream).await;
        if result.is_err() {
            self.state = HandshakeState::Closed;
        }
        result
    }

    async fn drive<S>(&mut self, stream: &mut S) -> Result<(), AuthError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        recv_token(stream, MAGIC_REQ, self.io_timeout, self.state).await?;
        send(stream, self.keys.secret_key(), self.io_timeout, self.state).await?;
        self.state = HandshakeState::SentKey;

        self.state = HandshakeState::AwaitAck1;
        recv_token(stream, MAGIC_ACK, self.io_timeout, self.state).await?;

        let verify_key = self.keys.verify_key_hex();
        send(stream, verify_key.as_bytes(), self.io_timeout, self.state).await?;
        self.state = HandshakeState::SentSignature;

        self.state = HandshakeState::AwaitAck2;
        recv_token(stream, MAGIC_ACK, self.io_timeout, self.state).await?;

        self.state = HandshakeState::Authenticated;
        Ok(())
    }

    /// 인증된 연결에서 keepalive 를 처리합니다.
    ///
    /// 취소되면 `Ok(())` 로 끝나고, 구독자가 연결을 닫거나 다른 토큰을 보내면
    /// 에러를 반환합니다.
    pub async fn serve_keepalive<S>(
        &mut self,
        stream: &mut S,
        idle: Duration,
        cancel: &CancellationToken,
    ) -> Result<(), AuthError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    self.state = HandshakeState::Closed;
                    return Ok(());
                }
                result = recv_token(stream, AUTH_KEEP_ALIVE, idle, self.state) => {
                    if let Err(e) = result {
                        self.state = HandshakeState::Closed;
                        return Err(e);
                    }
                }
            }
            if let Err(e) = send(stream, AUTH_KEEP_ALIVE_ACK, self.io_timeout, self.state).await {
                self.state = HandshakeState::Closed;
                return Err(e);
            }
            debug!("keepalive acknowledged");
        }
    }
}

/// 구독자 측 핸드셰이크를 수행하고 복호화기를 반환합니다.
pub async fn initiate<S>(stream: &mut S, io_timeout: Duration) -> Result<Decryptor, AuthError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    send(stream, MAGIC_REQ, io_timeout, HandshakeState::AwaitInit).await?;
    let secret = recv_exact(stream, SECRET_KEY_LEN, io_timeout, HandshakeState::SentKey).await?;
    send(stream, MAGIC_ACK, io_timeout, HandshakeState::AwaitAck1).await?;
    let verify_key = recv_exact(
        stream,
        VERIFY_KEY_HEX_LEN,
        io_timeout,
        HandshakeState::SentSignature,
    )
    .await?;
    send(stream, MAGIC_ACK, io_timeout, HandshakeState::AwaitAck2).await?;
    Decryptor::from_exchange(&secret, &verify_key)
}

/// 구독자 측 keepalive 한 번을 보냅니다.
pub async fn keepalive_ping<S>(stream: &mut S, io_timeout: Duration) -> Result<(), AuthError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    send(stream, AUTH_KEEP_ALIVE, io_timeout, HandshakeState::Authenticated).await?;
    recv_token(
        stream,
        AUTH_KEEP_ALIVE_ACK,
        io_timeout,
        HandshakeState::Authenticated,
    )
    .await
}

async fn send<S>(
    stream: &mut S,
    bytes: &[u8],
    io_timeout: Duration,
    state: HandshakeState,
) -> Result<(), AuthError>
where
    S: AsyncWrite + Unpin,
{
    timeout(io_timeout, async {
        stream.write_all(bytes).await?;
        stream.flush().await
    })
    .await
    .map_err(|_| AuthError::Timeout { state })??;
    Ok(())
}

async fn recv_exact<S>(
    stream: &mut S,
    len: usize,
    io_timeout: Duration,
    state: HandshakeState,
) -> Result<Vec<u8>, AuthError>
where
    S: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; len];
    timeout(io_timeout, stream.read_exact(&mut buf))
        .await
        .map_err(|_| AuthError::Timeout { state })??;
    Ok(buf)
}

async fn recv_token<S>(
    stream: &mut S,
    expected: &[u8],
    io_timeout: Duration,
    state: HandshakeState,
) -> Result<(), AuthError>
where
    S: AsyncRead + Unpin,
{
    let received = recv_exact(stream, expected.len(), io_timeout, state).await?;
    if received != expected {
        return Err(AuthError::UnexpectedToken {
            state,
            received: String::from_utf8_lossy(&received).into_owned(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    const T: Duration = Duration::from_secs(2);

    #[tokio::test]
    async fn full_handshake_exchanges_both_keys() {
        let keys = KeyMaterial::generate();
        let (mut server_io, mut client_io) = duplex(1024);

        let client = tokio::spawn(async move { initiate(&mut client_io, T).await });

        let mut hs = ServerHandshake::new(&keys, T);
        hs.run(&mut server_io).await.unwrap();
        assert_eq!(hs.state(), HandshakeState::Authenticated);

        let decryptor = client.await.unwrap().unwrap();
        let sealed = keys.seal(b"hello").unwrap();
        assert_eq!(decryptor.open(&sealed).unwrap(), b"hello");
    }

    #[tokio::test]
    async fn wrong_init_token_closes() {
        let keys = KeyMaterial::generate();
        let (mut server_io, mut client_io) = duplex(1024);

        client_io.write_all(b"HELO").await.unwrap();

        let mut hs = ServerHandshake::new(&keys, T);
        let err = hs.run(&mut server_io).await.unwrap_err();
        assert!(matches!(
            err,
            AuthError::UnexpectedToken {
                state: HandshakeState::AwaitInit,
                ..
            }
        ));
        assert_eq!(hs.state(), HandshakeState::Closed);

        // 서버가 연결을 닫으면 구독자는 키를 받지 못합니다.
        drop(server_io);
        let mut buf = Vec::new();
        client_io.read_to_end(&mut buf).await.unwrap();
        assert!(buf.is_empty());
    }

    #[tokio::test]
    async fn wrong_second_ack_never_authenticates() {
        let keys = KeyMaterial::generate();
        let (mut server_io, mut client_io) = duplex(1024);

        let client = tokio::spawn(async move {
            client_io.write_all(MAGIC_REQ).await.unwrap();
            let mut secret = [0u8; SECRET_KEY_LEN];
            client_io.read_exact(&mut secret).await.unwrap();
            client_io.write_all(MAGIC_ACK).await.unwrap();
            let mut hex_key = [0u8; VERIFY_KEY_HEX_LEN];
            client_io.read_exact(&mut hex_key).await.unwrap();
            client_io.write_all(b"NAK").await.unwrap();
            client_io
        });

        let mut hs = ServerHandshake::new(&keys, T);
        let err = hs.run(&mut server_io).await.unwrap_err();
        assert!(matches!(
            err,
            AuthError::UnexpectedToken {
                state: HandshakeState::AwaitAck2,
                ..
            }
        ));
        assert_ne!(hs.state(), HandshakeState::Authenticated);
        drop(client.await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn silent_client_times_out() {
        let keys = KeyMaterial::generate();
        let (mut server_io, _client_io) = duplex(1024);

        let mut hs = ServerHandshake::new(&keys, T);
        let err = hs.run(&mut server_io).await.unwrap_err();
        assert!(matches!(
            err,
            AuthError::Timeout {
                state: HandshakeState::AwaitInit
            }
        ));
    }

    #[tokio::test]
    async fn keepalive_round_trips_until_cancelled() {
        let keys = KeyMaterial::generate();
        let (mut server_io, mut client_io) = duplex(1024);
        let cancel = CancellationToken::new();

        let server_cancel = cancel.clone();
        let server = tokio::spawn(async move {
            let mut hs = ServerHandshake::new(&keys, T);
            hs.run(&mut server_io).await?;
            hs.serve_keepalive(&mut server_io, T, &server_cancel).await?;
            Ok::<_, AuthError>(hs.state())
        });

        initiate(&mut client_io, T).await.unwrap();
        keepalive_ping(&mut client_io, T).await.unwrap();
        keepalive_ping(&mut client_io, T).await.unwrap();

        cancel.cancel();
        assert_eq!(server.await.unwrap().unwrap(), HandshakeState::Closed);
    }

    #[tokio::test]
    async fn keepalive_garbage_closes_connection() {
        let keys = KeyMaterial::generate();
        let (mut server_io, mut client_io) = duplex(1024);
        let cancel = CancellationToken::new();

        let server = tokio::spawn(async move {
            let mut hs = ServerHandshake::new(&keys, T);
            hs.run(&mut server_io).await?;
            hs.serve_keepalive(&mut server_io, T, &cancel).await
        });

        initiate(&mut client_io, T).await.unwrap();
        client_io.write_all(b"NOTALIVE!").await.unwrap();

        let err = server.await.unwrap().unwrap_err();
        assert!(matches!(err, AuthError::UnexpectedToken { .. }));
    }
}
