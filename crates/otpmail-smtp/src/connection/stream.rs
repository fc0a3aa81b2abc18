//! Transports: TCP connect, in-place TLS upgrade, and the active-stream enum.

use std::fmt;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, verify_tls12_signature, verify_tls13_signature};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;

use crate::error::{Error, Result};

/// Opens the plaintext connection.
pub trait Connector: Send + Sync {
    /// Stream type produced.
    type Stream: AsyncRead + AsyncWrite + Unpin + Send;

    /// Connects to `host:port`.
    fn connect(&self, host: &str, port: u16) -> impl Future<Output = io::Result<Self::Stream>> + Send;
}

/// Wraps an already-open plaintext stream in TLS without reconnecting.
pub trait TlsUpgrade<S>: Send + Sync {
    /// Secure stream type produced.
    type Stream: AsyncRead + AsyncWrite + Unpin + Send;

    /// Performs the TLS handshake over `stream`.
    fn upgrade(&self, stream: S, host: &str) -> impl Future<Output = Result<Self::Stream>> + Send;
}

/// Plain TCP connector.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    type Stream = TcpStream;

    async fn connect(&self, host: &str, port: u16) -> io::Result<TcpStream> {
        let stream = TcpStream::connect((host, port)).await?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}

/// STARTTLS upgrade backed by rustls.
#[derive(Clone)]
pub struct RustlsUpgrade {
    connector: TlsConnector,
    verifying: bool,
}

impl RustlsUpgrade {
    /// Accepts any server certificate (self-signed, expired, wrong name).
    /// Handshake signatures are still checked.
    ///
    /// # Errors
    ///
    /// Returns an error if the crypto provider cannot build a client config.
    pub fn insecure() -> Result<Self> {
        let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
        let config = ClientConfig::builder_with_provider(Arc::clone(&provider))
            .with_safe_default_protocol_versions()
            .map_err(Error::tls)?
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate { provider }))
            .with_no_client_auth();

        Ok(Self {
            connector: TlsConnector::from(Arc::new(config)),
            verifying: false,
        })
    }

    /// Verifies the server certificate against the web PKI roots.
    ///
    /// # Errors
    ///
    /// Returns an error if the crypto provider cannot build a client config.
    pub fn verified() -> Result<Self> {
        let root_store = RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
        };

        let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
        let config = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(Error::tls)?
            .with_root_certificates(root_store)
            .with_no_client_auth();

        Ok(Self {
            connector: TlsConnector::from(Arc::new(config)),
            verifying: true,
        })
    }

    /// Picks [`Self::verified`] or [`Self::insecure`].
    ///
    /// # Errors
    ///
    /// Returns an error if the crypto provider cannot build a client config.
    pub fn new(verify_certificates: bool) -> Result<Self> {
        if verify_certificates {
            Self::verified()
        } else {
            Self::insecure()
        }
    }

    /// Returns true if certificates are verified.
    #[must_use]
    pub const fn is_verifying(&self) -> bool {
        self.verifying
    }
}

impl fmt::Debug for RustlsUpgrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RustlsUpgrade")
            .field("verifying", &self.verifying)
            .finish_non_exhaustive()
    }
}

impl<S> TlsUpgrade<S> for RustlsUpgrade
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    type Stream = TlsStream<S>;

    async fn upgrade(&self, stream: S, host: &str) -> Result<TlsStream<S>> {
        let server_name = ServerName::try_from(host.to_string())
            .map_err(|_| Error::TlsHandshake(format!("Invalid server name: {host}")))?;
        self.connector
            .connect(server_name, stream)
            .await
            .map_err(Error::tls)
    }
}

/// Certificate verifier that trusts every chain.
#[derive(Debug)]
struct AcceptAnyCertificate {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

/// The one transport the session reads from: plaintext before STARTTLS,
/// secure after. Upgrading consumes the plaintext stream.
pub enum SmtpStream<P, S> {
    /// Plaintext stream.
    Plain(P),
    /// TLS-wrapped stream (boxed to keep the enum small).
    Secure(Box<S>),
}

impl<P, S> SmtpStream<P, S> {
    /// Returns true if the stream is TLS-encrypted.
    #[must_use]
    pub const fn is_secure(&self) -> bool {
        matches!(self, Self::Secure(_))
    }

    /// Upgrades the plaintext stream in place.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream is already secure or the handshake fails.
    pub async fn upgrade<U>(self, upgrader: &U, host: &str) -> Result<Self>
    where
        U: TlsUpgrade<P, Stream = S>,
    {
        match self {
            Self::Plain(plain) => Ok(Self::Secure(Box::new(upgrader.upgrade(plain, host).await?))),
            Self::Secure(_) => Err(Error::Protocol("Stream is already TLS".into())),
        }
    }
}

impl<P, S> fmt::Debug for SmtpStream<P, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain(_) => f.write_str("SmtpStream::Plain"),
            Self::Secure(_) => f.write_str("SmtpStream::Secure"),
        }
    }
}

impl<P, S> AsyncRead for SmtpStream<P, S>
where
    P: AsyncRead + Unpin,
    S: AsyncRead + Unpin,
{
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            Self::Secure(stream) => Pin::new(stream.as_mut()).poll_read(cx, buf),
        }
    }
}

impl<P, S> AsyncWrite for SmtpStream<P, S>
where
    P: AsyncWrite + Unpin,
    S: AsyncWrite + Unpin,
{
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            Self::Secure(stream) => Pin::new(stream.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_flush(cx),
            Self::Secure(stream) => Pin::new(stream.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            Self::Secure(stream) => Pin::new(stream.as_mut()).poll_shutdown(cx),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[test]
    fn test_upgrade_modes() {
        assert!(!RustlsUpgrade::insecure().unwrap().is_verifying());
        assert!(RustlsUpgrade::verified().unwrap().is_verifying());
        assert!(RustlsUpgrade::new(true).unwrap().is_verifying());
    }

    #[tokio::test]
    async fn test_plain_stream_passthrough() {
        let (client, mut server) = tokio::io::duplex(64);
        let mut stream: SmtpStream<_, tokio::io::DuplexStream> = SmtpStream::Plain(client);
        assert!(!stream.is_secure());

        stream.write_all(b"EHLO localhost\r\n").await.unwrap();
        let mut buf = [0u8; 16];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"EHLO localhost\r\n");

        server.write_all(b"250 OK\r\n").await.unwrap();
        let mut reply = [0u8; 8];
        stream.read_exact(&mut reply).await.unwrap();
        assert_eq!(&reply, b"250 OK\r\n");
    }

    #[tokio::test]
    async fn test_handshake_against_non_tls_peer_fails() {
        let (client, mut server) = tokio::io::duplex(64 * 1024);
        let upgrade = RustlsUpgrade::insecure().unwrap();

        let peer = tokio::spawn(async move {
            let mut hello = vec![0u8; 64 * 1024];
            let n = server.read(&mut hello).await.unwrap();
            assert!(n > 0);
            server.write_all(b"this is not a TLS record\r\n").await.unwrap();
            server.shutdown().await.unwrap();
        });

        let stream: SmtpStream<_, TlsStream<tokio::io::DuplexStream>> = SmtpStream::Plain(client);
        let err = stream.upgrade(&upgrade, "localhost").await.unwrap_err();
        assert!(err.is_tls());
        peer.await.unwrap();
    }
}
