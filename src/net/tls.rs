//! TLS termination: certificate loading, protocol/cipher policy, handshakes.

use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use rustls::crypto::{ring, CryptoProvider};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::{ProtocolVersion, ServerConfig, SupportedCipherSuite, SupportedProtocolVersion};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::server::TlsStream;
use tokio_rustls::TlsAcceptor;

use crate::config::schema::{TlsConfig, TlsVersion};
use crate::net::session_cache::SessionCache;

/// Name fragments of suites that are never acceptable.
const WEAK_SUITE_MARKERS: &[&str] = &["ANON", "MD5", "NULL", "EXPORT", "RC4", "DES"];

#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("no certificates found in {0}")]
    NoCertificates(String),
    #[error("no private key found in {0}")]
    NoPrivateKey(String),
    #[error("cipher suite {0:?} is not permitted")]
    WeakCipherSuite(String),
    #[error("unknown cipher suite {0:?}")]
    UnknownCipherSuite(String),
    #[error("no configured cipher suite is usable with the allowed protocol versions")]
    NoUsableCipherSuite,
    #[error(transparent)]
    Rustls(#[from] rustls::Error),
    #[error("handshake failed: {0}")]
    Handshake(#[source] io::Error),
    #[error("handshake timed out")]
    HandshakeTimeout,
}

/// Negotiated parameters of one TLS connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsInfo {
    pub protocol: String,
    pub cipher_suite: String,
}

/// Protocol versions at or above the configured minimum.
pub fn protocol_versions(min: TlsVersion) -> &'static [&'static SupportedProtocolVersion] {
    static TLS12_AND_UP: &[&SupportedProtocolVersion] =
        &[&rustls::version::TLS13, &rustls::version::TLS12];
    static TLS13_ONLY: &[&SupportedProtocolVersion] = &[&rustls::version::TLS13];
    match min {
        TlsVersion::Tls12 => TLS12_AND_UP,
        TlsVersion::Tls13 => TLS13_ONLY,
    }
}

fn suite_name(suite: &SupportedCipherSuite) -> String {
    format!("{:?}", suite.suite())
}

/// Resolve configured suite names against the ring provider.
///
/// Names containing a weak marker are refused outright, even though rustls
/// implements none of those suites.
pub fn resolve_cipher_suites(
    names: &[String],
    min: TlsVersion,
) -> Result<Vec<SupportedCipherSuite>, TlsError> {
    let available = ring::default_provider().cipher_suites;
    let mut selected = Vec::with_capacity(names.len());

    for name in names {
        let upper = name.trim().to_ascii_uppercase();
        if WEAK_SUITE_MARKERS.iter().any(|m| upper.contains(m)) {
            return Err(TlsError::WeakCipherSuite(name.clone()));
        }
        let suite = available
            .iter()
            .find(|s| suite_name(s) == upper)
            .ok_or_else(|| TlsError::UnknownCipherSuite(name.clone()))?;
        selected.push(*suite);
    }

    let tls13_only = min == TlsVersion::Tls13;
    selected.retain(|s| !tls13_only || s.version().version == ProtocolVersion::TLSv1_3);
    if selected.is_empty() {
        return Err(TlsError::NoUsableCipherSuite);
    }
    Ok(selected)
}

/// Load a PEM certificate chain.
pub fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let file = File::open(path).map_err(|source| TlsError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TlsError::Io {
            path: path.display().to_string(),
            source,
        })?;
    if certs.is_empty() {
        return Err(TlsError::NoCertificates(path.display().to_string()));
    }
    Ok(certs)
}

/// Load the first PEM private key (PKCS#8, PKCS#1 or SEC1).
pub fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    let file = File::open(path).map_err(|source| TlsError::Io {
        path: path.display().to_string(),
        source,
    })?;
    rustls_pemfile::private_key(&mut BufReader::new(file))
        .map_err(|source| TlsError::Io {
            path: path.display().to_string(),
            source,
        })?
        .ok_or_else(|| TlsError::NoPrivateKey(path.display().to_string()))
}

/// Build the rustls server configuration for the secure listener.
pub fn build_server_config(
    config: &TlsConfig,
    sessions: Arc<SessionCache>,
) -> Result<Arc<ServerConfig>, TlsError> {
    let certs = load_certs(Path::new(&config.cert_path))?;
    let key = load_private_key(Path::new(&config.key_path))?;

    let mut provider: CryptoProvider = ring::default_provider();
    provider.cipher_suites = resolve_cipher_suites(&config.cipher_suites, config.min_protocol)?;

    let mut server_config = ServerConfig::builder_with_provider(Arc::new(provider))
        .with_protocol_versions(protocol_versions(config.min_protocol))?
        .with_no_client_auth()
        .with_single_cert(certs, key)?;

    // HTTP/1.1 only; upgrades are HTTP/1.1-specific.
    server_config.alpn_protocols = vec![b"http/1.1".to_vec()];
    server_config.session_storage = sessions;

    tracing::debug!(
        min_protocol = ?config.min_protocol,
        cipher_suites = server_config.crypto_provider().cipher_suites.len(),
        "TLS configured"
    );

    Ok(Arc::new(server_config))
}

/// Accepts TLS connections under a handshake deadline.
#[derive(Clone)]
pub struct TlsTerminator {
    acceptor: TlsAcceptor,
    handshake_timeout: Duration,
}

impl TlsTerminator {
    pub fn new(server_config: Arc<ServerConfig>, handshake_timeout: Duration) -> Self {
        Self {
            acceptor: TlsAcceptor::from(server_config),
            handshake_timeout,
        }
    }

    /// Complete the handshake. Any failure is terminal for the connection.
    pub async fn accept<IO>(&self, stream: IO) -> Result<(TlsStream<IO>, TlsInfo), TlsError>
    where
        IO: AsyncRead + AsyncWrite + Unpin,
    {
        let tls = tokio::time::timeout(self.handshake_timeout, self.acceptor.accept(stream))
            .await
            .map_err(|_| TlsError::HandshakeTimeout)?
            .map_err(TlsError::Handshake)?;

        let (_, conn) = tls.get_ref();
        let info = TlsInfo {
            protocol: conn
                .protocol_version()
                .map(|v| format!("{:?}", v))
                .unwrap_or_default(),
            cipher_suite: conn
                .negotiated_cipher_suite()
                .map(|s| suite_name(&s))
                .unwrap_or_default(),
        };
        Ok((tls, info))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::default_cipher_suites;

    #[test]
    fn default_suites_resolve() {
        let suites = resolve_cipher_suites(&default_cipher_suites(), TlsVersion::Tls12).unwrap();
        assert_eq!(suites.len(), default_cipher_suites().len());
    }

    #[test]
    fn tls13_minimum_drops_tls12_suites() {
        let suites = resolve_cipher_suites(&default_cipher_suites(), TlsVersion::Tls13).unwrap();
        assert_eq!(suites.len(), 3);
        assert!(suites
            .iter()
            .all(|s| s.version().version == ProtocolVersion::TLSv1_3));
    }

    #[test]
    fn only_tls12_suites_with_tls13_minimum_is_unusable() {
        let names = vec!["TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384".to_string()];
        assert!(matches!(
            resolve_cipher_suites(&names, TlsVersion::Tls13),
            Err(TlsError::NoUsableCipherSuite)
        ));
    }

    #[test]
    fn weak_suites_rejected() {
        for name in [
            "TLS_DH_anon_WITH_AES_128_CBC_SHA",
            "TLS_RSA_WITH_RC4_128_MD5",
            "TLS_RSA_WITH_3DES_EDE_CBC_SHA",
            "TLS_RSA_WITH_NULL_SHA256",
        ] {
            assert!(
                matches!(
                    resolve_cipher_suites(&[name.to_string()], TlsVersion::Tls12),
                    Err(TlsError::WeakCipherSuite(_))
                ),
                "{name}"
            );
        }
    }

    #[test]
    fn unknown_suite_rejected() {
        assert!(matches!(
            resolve_cipher_suites(&["TLS_MADE_UP".to_string()], TlsVersion::Tls12),
            Err(TlsError::UnknownCipherSuite(_))
        ));
    }

    #[test]
    fn missing_cert_file_is_io_error() {
        let err = load_certs(Path::new("/nonexistent/cert.pem")).unwrap_err();
        assert!(matches!(err, TlsError::Io { .. }));
    }
}
