//! 키 자료 -- 대칭키 + ed25519 서명키
//!
//! 서버는 기동 시 [`KeyMaterial`]을 한 번 생성하고 디스크에 저장하지 않습니다.
//! 발행 바이트 형식:
//!
//! ```text
//! signature(64) || nonce(24) || ciphertext
//! ```
//!
//! 서명은 `nonce || ciphertext` 전체에 대해 계산합니다.

use std::fmt;

use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, OsRng};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use zeroize::Zeroizing;

use crate::error::AuthError;

/// 대칭키 길이 (바이트)
pub const SECRET_KEY_LEN: usize = 32;
/// XChaCha20 nonce 길이 (바이트)
pub const NONCE_LEN: usize = 24;
/// ed25519 서명 길이 (바이트)
pub const SIGNATURE_LEN: usize = 64;
/// 16진수로 인코딩한 검증키 길이
pub const VERIFY_KEY_HEX_LEN: usize = 64;

/// 서버가 보유하는 키 자료
pub struct KeyMaterial {
    secret: Zeroizing<[u8; SECRET_KEY_LEN]>,
    signing: SigningKey,
}

impl KeyMaterial {
    /// 새 대칭키와 서명 키쌍을 생성합니다.
    pub fn generate() -> Self {
        let key = XChaCha20Poly1305::generate_key(&mut OsRng);
        let mut secret = Zeroizing::new([0u8; SECRET_KEY_LEN]);
        secret.copy_from_slice(key.as_slice());
        Self {
            secret,
            signing: SigningKey::generate(&mut OsRng),
        }
    }

    /// 키 교환으로 전달할 원시 대칭키
    pub fn secret_key(&self) -> &[u8; SECRET_KEY_LEN] {
        &self.secret
    }

    /// 키 교환으로 전달할 16진수 검증키
    pub fn verify_key_hex(&self) -> String {
        hex::encode(self.signing.verifying_key().as_bytes())
    }

    /// 평문을 암호화한 뒤 서명합니다.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, AuthError> {
        let cipher = XChaCha20Poly1305::new(Key::from_slice(self.secret.as_slice()));
        let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(&nonce, plaintext)
            .map_err(|e| AuthError::Crypto(e.to_string()))?;

        let mut boxed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        boxed.extend_from_slice(nonce.as_slice());
        boxed.extend_from_slice(&ciphertext);

        let signature = self.signing.sign(&boxed);
        let mut sealed = Vec::with_capacity(SIGNATURE_LEN + boxed.len());
        sealed.extend_from_slice(&signature.to_bytes());
        sealed.extend_from_slice(&boxed);
        Ok(sealed)
    }

    /// 같은 키로 동작하는 복호화기를 만듭니다.
    pub fn decryptor(&self) -> Decryptor {
        Decryptor {
            cipher: XChaCha20Poly1305::new(Key::from_slice(self.secret.as_slice())),
            verifying: self.signing.verifying_key(),
        }
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("secret", &"<redacted>")
            .field("verify_key", &self.verify_key_hex())
            .finish()
    }
}

/// 구독자 측 검증 + 복호화기
#[derive(Clone)]
pub struct Decryptor {
    cipher: XChaCha20Poly1305,
    verifying: VerifyingKey,
}

impl Decryptor {
    /// 키 교환으로 받은 원시 대칭키와 16진수 검증키로 복호화기를 만듭니다.
    pub fn from_exchange(secret: &[u8], verify_key_hex: &[u8]) -> Result<Self, AuthError> {
        if secret.len() != SECRET_KEY_LEN {
            return Err(AuthError::InvalidKey(format!(
                "secret key must be {SECRET_KEY_LEN} bytes, got {}",
                secret.len()
            )));
        }
        let raw = hex::decode(verify_key_hex)
            .map_err(|e| AuthError::InvalidKey(format!("verify key is not hex: {e}")))?;
        let bytes: [u8; 32] = raw.as_slice().try_into().map_err(|_| {
            AuthError::InvalidKey(format!("verify key must be 32 bytes, got {}", raw.len()))
        })?;
        let verifying = VerifyingKey::from_bytes(&bytes)
            .map_err(|e| AuthError::InvalidKey(format!("invalid verify key: {e}")))?;

        Ok(Self {
            cipher: XChaCha20Poly1305::new(Key::from_slice(secret)),
            verifying,
        })
    }

    /// 서명을 검증한 뒤 복호화합니다.
    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>, AuthError> {
        if sealed.len() < SIGNATURE_LEN {
            return Err(AuthError::BadSignature);
        }
        let (sig_bytes, boxed) = sealed.split_at(SIGNATURE_LEN);
        let signature = Signature::from_slice(sig_bytes).map_err(|_| AuthError::BadSignature)?;
        self.verifying
            .verify(boxed, &signature)
            .map_err(|_| AuthError::BadSignature)?;

        if boxed.len() < NONCE_LEN {
            return Err(AuthError::Crypto("ciphertext shorter than nonce".to_owned()));
        }
        let (nonce, ciphertext) = boxed.split_at(NONCE_LEN);
        self.cipher
            .decrypt(XNonce::from_slice(nonce), ciphertext)
            .map_err(|_| AuthError::Crypto("unable to decrypt".to_owned()))
    }
}

impl fmt::Debug for Decryptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Decryptor")
            .field("verify_key", &hex::encode(self.verifying.as_bytes()))
            .finish_non_exhaustive()
    }
}
