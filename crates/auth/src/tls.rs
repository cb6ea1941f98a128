//! TLS 설정 -- 인증서 로드 및 개인키 일치 검사
//!
//! 서버 기동 시 인증서와 개인키를 한 번 검사하며, 짝이 맞지 않으면
//! [`AuthError::CertificateMismatch`] 로 즉시 실패합니다.

use std::path::Path;
use std::sync::Arc;

use rustls::crypto::CryptoProvider;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::{ClientConfig, InconsistentKeys, RootCertStore, ServerConfig};
use tracing::{debug, warn};

use crate::error::AuthError;

fn provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

/// 파일에서 서버 TLS 설정을 만듭니다.
pub fn server_config(
    certificate: impl AsRef<Path>,
    keyfile: impl AsRef<Path>,
) -> Result<Arc<ServerConfig>, AuthError> {
    let certificate = certificate.as_ref();
    let keyfile = keyfile.as_ref();
    debug!(
        certificate = %certificate.display(),
        keyfile = %keyfile.display(),
        "verifying certificate"
    );

    let cert_pem = read_pem(certificate)?;
    let key_pem = read_pem(keyfile)?;
    server_config_from_pem(&cert_pem, &key_pem).map_err(|e| match e {
        AuthError::CertificateMismatch { .. } => AuthError::CertificateMismatch {
            certificate: certificate.display().to_string(),
            keyfile: keyfile.display().to_string(),
        },
        AuthError::Certificate { reason, .. } => AuthError::Certificate {
            path: certificate.display().to_string(),
            reason,
        },
        other => other,
    })
}

/// PEM 바이트에서 서버 TLS 설정을 만듭니다.
pub fn server_config_from_pem(
    cert_pem: &[u8],
    key_pem: &[u8],
) -> Result<Arc<ServerConfig>, AuthError> {
    let certs = parse_certificates(cert_pem)?;
    let key = PrivateKeyDer::from_pem_slice(key_pem).map_err(|e| AuthError::Certificate {
        path: "<keyfile>".to_owned(),
        reason: format!("failed to parse private key: {e}"),
    })?;

    let provider = provider();
    check_key_pair(&provider, &certs, &key)?;

    let config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| AuthError::Tls(e.to_string()))?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(map_inconsistent)?;
    Ok(Arc::new(config))
}

/// 서버 인증서(또는 CA)를 신뢰하는 구독자 TLS 설정을 만듭니다.
pub fn client_config(ca_pem: &[u8]) -> Result<Arc<ClientConfig>, AuthError> {
    let mut roots = RootCertStore::empty();
    for cert in parse_certificates(ca_pem)? {
        roots.add(cert).map_err(|e| AuthError::Certificate {
            path: "<ca>".to_owned(),
            reason: format!("failed to add trust anchor: {e}"),
        })?;
    }

    let config = ClientConfig::builder_with_provider(provider())
        .with_safe_default_protocol_versions()
        .map_err(|e| AuthError::Tls(e.to_string()))?
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(Arc::new(config))
}

/// 파일에서 구독자 TLS 설정을 만듭니다.
pub fn client_config_from_file(ca: impl AsRef<Path>) -> Result<Arc<ClientConfig>, AuthError> {
    client_config(&read_pem(ca.as_ref())?)
}

fn check_key_pair(
    provider: &CryptoProvider,
    certs: &[CertificateDer<'static>],
    key: &PrivateKeyDer<'static>,
) -> Result<(), AuthError> {
    let signing_key = provider
        .key_provider
        .load_private_key(key.clone_key())
        .map_err(|e| AuthError::Certificate {
            path: "<keyfile>".to_owned(),
            reason: format!("unusable private key: {e}"),
        })?;
    let certified = rustls::sign::CertifiedKey::new(certs.to_vec(), signing_key);
    match certified.keys_match() {
        Ok(()) => Ok(()),
        Err(rustls::Error::InconsistentKeys(InconsistentKeys::Unknown)) => {
            warn!("unable to compare certificate and key, continuing");
            Ok(())
        }
        Err(e) => Err(map_inconsistent(e)),
    }
}

fn map_inconsistent(err: rustls::Error) -> AuthError {
    match err {
        rustls::Error::InconsistentKeys(InconsistentKeys::KeyMismatch) => {
            AuthError::CertificateMismatch {
                certificate: "<certificate>".to_owned(),
                keyfile: "<keyfile>".to_owned(),
            }
        }
        other => AuthError::Tls(other.to_string()),
    }
}

fn parse_certificates(pem: &[u8]) -> Result<Vec<CertificateDer<'static>>, AuthError> {
    let certs = CertificateDer::pem_slice_iter(pem)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| AuthError::Certificate {
            path: "<certificate>".to_owned(),
            reason: format!("failed to parse certificates: {e}"),
        })?;
    if certs.is_empty() {
        return Err(AuthError::Certificate {
            path: "<certificate>".to_owned(),
            reason: "no certificates found".to_owned(),
        });
    }
    Ok(certs)
}

fn read_pem(path: &Path) -> Result<Vec<u8>, AuthError> {
    std::fs::read(path).map_err(|e| AuthError::Certificate {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_pair_builds_server_config() {
        let pki = test_utils::generate();
        server_config_from_pem(&pki.cert_pem, &pki.key_pem).unwrap();
    }

    #[test]
    fn mismatched_key_is_rejected() {
        let pki = test_utils::generate();
        let other = test_utils::generate();
        let err = server_config_from_pem(&pki.cert_pem, &other.key_pem).unwrap_err();
        assert!(matches!(err, AuthError::CertificateMismatch { .. }));
    }

    #[test]
    fn mismatch_from_files_names_both_paths() {
        let dir = tempfile::tempdir().unwrap();
        let pki = test_utils::generate();
        let other = test_utils::generate();
        let cert_path = dir.path().join("server.crt");
        let key_path = dir.path().join("server.key");
        std::fs::write(&cert_path, &pki.cert_pem).unwrap();
        std::fs::write(&key_path, &other.key_pem).unwrap();

        let err = server_config(&cert_path, &key_path).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("server.crt"));
        assert!(msg.contains("server.key"));
    }

    #[test]
    fn missing_file_is_certificate_error() {
        let err = server_config("/nonexistent/a.crt", "/nonexistent/a.key").unwrap_err();
        assert!(matches!(err, AuthError::Certificate { .. }));
    }

    #[test]
    fn garbage_pem_is_rejected() {
        assert!(client_config(b"not a certificate").is_err());
    }

    #[test]
    fn client_config_trusts_ca() {
        let pki = test_utils::generate();
        client_config(&pki.ca_pem).unwrap();
    }
}
