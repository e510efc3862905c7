//! TCP and TLS transport for conduit sessions.
//!
//! This module provides the transport capability set the session engine is
//! built on: one-time setup ([`Connector::init`]), channel establishment over
//! an already-connected socket ([`Connector::connection_init`]), and blocking
//! chunk reads / writes via the unified [`IoStream`]. Graceful channel
//! deinit is `IoStream`'s shutdown path (TLS close_notify, plain TCP FIN).

use std::io::{self, BufReader};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpSocket, TcpStream};
use tracing::debug;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::WebPkiServerVerifier;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tokio_rustls::TlsConnector;

use crate::error::StartError;

/// Maximum size of one transport-level read chunk (16 KiB).
pub const MAX_CHUNK_SIZE: usize = 16 * 1024;

/// Paths to the credential files for a TLS session.
///
/// All three files are existence-checked and parsed during
/// [`Session::start`](crate::Session::start); the derived TLS context lives
/// exactly as long as the session.
#[derive(Clone, Debug)]
pub struct TlsCredentials {
    /// CA certificate the client trusts (PEM)
    pub ca_cert: PathBuf,
    /// Client certificate presented to the server (PEM)
    pub cert: PathBuf,
    /// Client private key (PEM, PKCS#8/PKCS#1/SEC1)
    pub key: PathBuf,
}

impl TlsCredentials {
    /// Create credentials from the three file paths.
    pub fn new(
        ca_cert: impl Into<PathBuf>,
        cert: impl Into<PathBuf>,
        key: impl Into<PathBuf>,
    ) -> Self {
        Self {
            ca_cert: ca_cert.into(),
            cert: cert.into(),
            key: key.into(),
        }
    }
}

/// Unified stream type that can be either plain TCP or TLS
pub enum IoStream {
    /// Plain TCP stream
    Plain(TcpStream),
    /// TLS client stream
    Tls(Box<tokio_rustls::client::TlsStream<TcpStream>>),
}

impl AsyncRead for IoStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            IoStream::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            IoStream::Tls(stream) => Pin::new(stream.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for IoStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<Result<usize, io::Error>> {
        match self.get_mut() {
            IoStream::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            IoStream::Tls(stream) => Pin::new(stream.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), io::Error>> {
        match self.get_mut() {
            IoStream::Plain(stream) => Pin::new(stream).poll_flush(cx),
            IoStream::Tls(stream) => Pin::new(stream.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), io::Error>> {
        match self.get_mut() {
            IoStream::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            IoStream::Tls(stream) => Pin::new(stream.as_mut()).poll_shutdown(cx),
        }
    }
}

impl IoStream {
    /// Get the peer address of the underlying stream
    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        match self {
            IoStream::Plain(stream) => stream.peer_addr(),
            IoStream::Tls(stream) => stream.get_ref().0.peer_addr(),
        }
    }
}

/// Resolve and connect the raw TCP socket for a session.
///
/// Address reuse is explicitly disabled. Each failure step maps to its own
/// status: socket creation, socket options, resolution/connect.
pub(crate) async fn connect_tcp(host: &str, port: u16) -> Result<TcpStream, StartError> {
    let addr = tokio::net::lookup_host((host, port))
        .await
        .map_err(StartError::Connect)?
        .next()
        .ok_or_else(|| {
            StartError::Connect(io::Error::new(
                io::ErrorKind::NotFound,
                "address resolved to no socket address",
            ))
        })?;

    let socket = match addr {
        SocketAddr::V4(_) => TcpSocket::new_v4(),
        SocketAddr::V6(_) => TcpSocket::new_v6(),
    }
    .map_err(StartError::CreateSocket)?;

    socket.set_reuseaddr(false).map_err(StartError::SetSocketOpt)?;

    let stream = socket.connect(addr).await.map_err(StartError::Connect)?;
    debug!("TCP connection established to {}", addr);
    Ok(stream)
}

/// One-time transport setup, selected at `start` from the presence of
/// credentials: plain TCP, or TLS with a loaded client configuration.
pub(crate) enum Connector {
    /// Plain TCP, nothing to set up
    Tcp,
    /// TLS with a fully loaded rustls client configuration
    Tls { config: Arc<ClientConfig> },
}

impl Connector {
    /// Load credentials and build the transport context.
    ///
    /// TCP always succeeds. TLS existence-checks each credential file and
    /// parses it, reporting a distinct error per file and per failure kind,
    /// and never leaves a partially loaded context behind.
    pub(crate) fn init(credentials: Option<&TlsCredentials>) -> Result<Self, StartError> {
        match credentials {
            None => Ok(Connector::Tcp),
            Some(creds) => {
                let config = build_client_config(creds)?;
                Ok(Connector::Tls {
                    config: Arc::new(config),
                })
            }
        }
    }

    /// Establish the logical channel over the already-connected socket.
    ///
    /// TCP wraps the socket trivially; TLS performs the handshake and
    /// enforces the verification policy, reporting handshake and
    /// verification failures separately.
    pub(crate) async fn connection_init(
        &self,
        tcp: TcpStream,
        host: &str,
    ) -> Result<IoStream, StartError> {
        match self {
            Connector::Tcp => Ok(IoStream::Plain(tcp)),
            Connector::Tls { config } => {
                let server_name =
                    ServerName::try_from(host.to_owned()).map_err(|_| StartError::ConnectInit)?;

                let connector = TlsConnector::from(config.clone());
                let stream = connector
                    .connect(server_name, tcp)
                    .await
                    .map_err(classify_handshake_error)?;

                debug!("TLS connection established to {} (SNI: {})", host, host);
                Ok(IoStream::Tls(Box::new(stream)))
            }
        }
    }
}

/// Tell a certificate-verification failure apart from any other handshake
/// failure.
fn classify_handshake_error(err: io::Error) -> StartError {
    let verify_failure = err
        .get_ref()
        .and_then(|inner| inner.downcast_ref::<rustls::Error>())
        .is_some_and(|e| matches!(e, rustls::Error::InvalidCertificate(_)));

    if verify_failure {
        StartError::HandshakeVerifyFailed
    } else {
        StartError::HandshakeFailed(err)
    }
}

/// Build the rustls client configuration for the fixed session policy:
/// TLS 1.3 only, AES-256-GCM only, peer certificate required and verified
/// with depth 1 (signed directly by the trusted CA).
fn build_client_config(creds: &TlsCredentials) -> Result<ClientConfig, StartError> {
    // Existence checks first, one status per file.
    if !creds.ca_cert.exists() {
        return Err(StartError::WrongCaPath(creds.ca_cert.clone()));
    }
    if !creds.cert.exists() {
        return Err(StartError::WrongCertPath(creds.cert.clone()));
    }
    if !creds.key.exists() {
        return Err(StartError::WrongKeyPath(creds.key.clone()));
    }

    // Load the CA certificate the client should trust.
    let mut roots = RootCertStore::empty();
    let ca_file = std::fs::File::open(&creds.ca_cert).map_err(|_| StartError::WrongCaCert)?;
    let ca_certs: Result<Vec<_>, _> = rustls_pemfile::certs(&mut BufReader::new(ca_file)).collect();
    let ca_certs = ca_certs.map_err(|_| StartError::WrongCaCert)?;
    if ca_certs.is_empty() {
        return Err(StartError::WrongCaCert);
    }
    for ca_cert in ca_certs {
        roots.add(ca_cert).map_err(|_| StartError::WrongCaCert)?;
    }

    // Load the client certificate chain.
    let cert_file = std::fs::File::open(&creds.cert).map_err(|_| StartError::WrongCert)?;
    let certs: Result<Vec<_>, _> = rustls_pemfile::certs(&mut BufReader::new(cert_file)).collect();
    let certs = certs.map_err(|_| StartError::WrongCert)?;
    if certs.is_empty() {
        return Err(StartError::WrongCert);
    }

    // Load the client private key.
    let key_file = std::fs::File::open(&creds.key).map_err(|_| StartError::WrongKey)?;
    let key = rustls_pemfile::private_key(&mut BufReader::new(key_file))
        .map_err(|_| StartError::WrongKey)?
        .ok_or(StartError::WrongKey)?;

    // Pin the cipher suite to AES-256-GCM on top of the ring provider.
    let mut provider = rustls::crypto::ring::default_provider();
    provider
        .cipher_suites
        .retain(|suite| *suite == rustls::crypto::ring::cipher_suite::TLS13_AES_256_GCM_SHA384);
    let provider = Arc::new(provider);

    let webpki_verifier =
        WebPkiServerVerifier::builder_with_provider(Arc::new(roots), provider.clone())
            .build()
            .map_err(|_| StartError::SetContext)?;
    let verifier = Arc::new(DirectCaVerifier {
        inner: webpki_verifier,
    });

    let config = ClientConfig::builder_with_provider(provider)
        .with_protocol_versions(&[&rustls::version::TLS13])
        .map_err(|_| StartError::SetContext)?
        .dangerous()
        .with_custom_certificate_verifier(verifier)
        .with_client_auth_cert(certs, key)
        .map_err(|_| StartError::WrongKey)?;

    debug!("TLS client configuration created");
    Ok(config)
}

/// Server certificate verifier with verification depth 1.
///
/// Delegates to the webpki verifier but withholds any intermediates the
/// server presented, so the peer certificate passes only when it is signed
/// directly by the trusted CA.
#[derive(Debug)]
struct DirectCaVerifier {
    inner: Arc<WebPkiServerVerifier>,
}

impl ServerCertVerifier for DirectCaVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        self.inner
            .verify_server_cert(end_entity, &[], server_name, ocsp_response, now)
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn touch(dir: &tempfile::TempDir, name: &str, contents: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents).unwrap();
        path
    }

    #[test]
    fn test_tcp_init_always_succeeds() {
        assert!(matches!(Connector::init(None), Ok(Connector::Tcp)));
    }

    #[test]
    fn test_missing_ca_path() {
        let dir = tempfile::tempdir().unwrap();
        let cert = touch(&dir, "client.pem", b"");
        let key = touch(&dir, "client.key", b"");
        let creds = TlsCredentials::new(dir.path().join("missing_ca.pem"), cert, key);

        assert!(matches!(
            Connector::init(Some(&creds)),
            Err(StartError::WrongCaPath(_))
        ));
    }

    #[test]
    fn test_missing_cert_path() {
        let dir = tempfile::tempdir().unwrap();
        let ca = touch(&dir, "ca.pem", b"");
        let key = touch(&dir, "client.key", b"");
        let creds = TlsCredentials::new(ca, dir.path().join("missing_cert.pem"), key);

        assert!(matches!(
            Connector::init(Some(&creds)),
            Err(StartError::WrongCertPath(_))
        ));
    }

    #[test]
    fn test_missing_key_path() {
        let dir = tempfile::tempdir().unwrap();
        let ca = touch(&dir, "ca.pem", b"");
        let cert = touch(&dir, "client.pem", b"");
        let creds = TlsCredentials::new(ca, cert, dir.path().join("missing.key"));

        assert!(matches!(
            Connector::init(Some(&creds)),
            Err(StartError::WrongKeyPath(_))
        ));
    }

    #[test]
    fn test_garbage_ca_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let ca = touch(&dir, "ca.pem", b"not a certificate");
        let cert = touch(&dir, "client.pem", b"not a certificate");
        let key = touch(&dir, "client.key", b"not a key");
        let creds = TlsCredentials::new(ca, cert, key);

        assert!(matches!(
            Connector::init(Some(&creds)),
            Err(StartError::WrongCaCert)
        ));
    }
}
