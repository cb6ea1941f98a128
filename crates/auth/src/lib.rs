//! netlog 보안 채널
//!
//! 발행 바이트를 암호화/서명하는 키 자료와, 구독자가 사전 공유 비밀 없이
//! 복호화 키를 받아가는 TLS 기반 키 교환을 제공합니다.
//!
//! - [`keys`]: [`KeyMaterial`] (서버) / [`Decryptor`] (구독자)
//! - [`protocol`]: 고정 길이 토큰 핸드셰이크와 상수
//! - [`tls`]: 인증서 로드 및 개인키 일치 검사
//! - [`server`]: 키 교환 응답 서버
//! - [`client`]: 구독자 클라이언트 ([`AuthClient`])
//! - [`codec`]: 엔벨로프 직렬화 방식

pub mod client;
pub mod codec;
pub mod error;
pub mod keys;
pub mod protocol;
pub mod server;
pub mod tls;

pub use client::{AuthClient, AuthClientConfig};
pub use codec::{Codec, unserialize};
pub use error::AuthError;
pub use keys::{Decryptor, KeyMaterial};
pub use protocol::HandshakeState;
pub use server::{AuthServer, AuthServerConfig};
