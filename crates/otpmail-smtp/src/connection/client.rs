//! Async driver that runs a [`Session`] over a real transport.

use std::future::Future;
use std::sync::Arc;

use serde::ser::SerializeStruct;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{Config, Connector, RustlsUpgrade, SmtpStream, TcpConnector, TlsUpgrade};
use crate::error::{Error, Result};
use crate::session::{Session, Step};
use crate::types::Envelope;

const READ_CHUNK: usize = 4096;

/// Result of one send. Sending never returns `Err`; every failure lands here.
#[derive(Debug)]
pub enum SendOutcome {
    /// The server accepted the message.
    Delivered {
        /// Message-ID header value of the accepted message.
        message_id: String,
    },
    /// The session ended in `Failed`.
    Failed {
        /// Why it failed.
        error: Error,
    },
}

impl SendOutcome {
    /// Returns true if the message was accepted.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }

    /// Returns the Message-ID on success.
    #[must_use]
    pub fn message_id(&self) -> Option<&str> {
        match self {
            Self::Delivered { message_id } => Some(message_id),
            Self::Failed { .. } => None,
        }
    }

    /// Returns the error on failure.
    #[must_use]
    pub const fn error(&self) -> Option<&Error> {
        match self {
            Self::Delivered { .. } => None,
            Self::Failed { error } => Some(error),
        }
    }
}

impl From<Result<String>> for SendOutcome {
    fn from(result: Result<String>) -> Self {
        match result {
            Ok(message_id) => Self::Delivered { message_id },
            Err(error) => Self::Failed { error },
        }
    }
}

/// Renders as `{"success": true, "messageId": ..}` or `{"success": false, "error": ..}`.
impl serde::Serialize for SendOutcome {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("SendOutcome", 2)?;
        state.serialize_field("success", &self.is_success())?;
        match self {
            Self::Delivered { message_id } => state.serialize_field("messageId", message_id)?,
            Self::Failed { error } => state.serialize_field("error", &error.to_string())?,
        }
        state.end()
    }
}

/// SMTP submission client. Every send opens its own connection and runs its
/// own [`Session`]; clients can be shared between tasks.
#[derive(Debug, Clone)]
pub struct Client<C = TcpConnector, U = RustlsUpgrade> {
    config: Arc<Config>,
    connector: C,
    upgrader: U,
}

impl Client {
    /// Creates a client using TCP and rustls.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS client configuration cannot be built.
    pub fn new(config: Config) -> Result<Self> {
        let upgrader = RustlsUpgrade::new(config.verify_certificates)?;
        Ok(Self::with_transports(config, TcpConnector, upgrader))
    }
}

impl<C, U> Client<C, U>
where
    C: Connector,
    U: TlsUpgrade<C::Stream>,
{
    /// Creates a client over caller-supplied transports.
    pub fn with_transports(config: Config, connector: C, upgrader: U) -> Self {
        Self {
            config: Arc::new(config),
            connector,
            upgrader,
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Sends one message carrying a one-time code.
    pub async fn send(
        &self,
        recipient: &str,
        subject: &str,
        html_body: &str,
        one_time_code: &str,
    ) -> SendOutcome {
        match Envelope::new(recipient, subject, html_body, one_time_code) {
            Ok(envelope) => self.send_envelope(envelope).await,
            Err(error) => {
                warn!(recipient, "not sending: {error}");
                SendOutcome::Failed { error }
            }
        }
    }

    /// Sends an already-validated envelope. Waits as long as the server does
    /// unless a reply timeout is configured.
    pub async fn send_envelope(&self, envelope: Envelope) -> SendOutcome {
        self.send_envelope_until(envelope, std::future::pending())
            .await
    }

    /// Like [`Self::send_envelope`], but gives up as soon as `cancel`
    /// completes. Cancelling drops the transport, closing the socket.
    pub async fn send_envelope_until<F>(&self, envelope: Envelope, cancel: F) -> SendOutcome
    where
        F: Future<Output = ()>,
    {
        let mut session = Session::new(
            envelope,
            self.config.credentials.clone(),
            self.config.sender.clone(),
            self.config.client_hostname.clone(),
            self.config.reply_policy,
        );

        let result = tokio::select! {
            result = self.drive(&mut session) => result,
            () = cancel => Err(Error::Cancelled),
        };

        match result {
            Ok(()) => {
                info!(message_id = session.message_id(), "message accepted");
                SendOutcome::Delivered {
                    message_id: session.message_id().to_string(),
                }
            }
            Err(error) => {
                session.abort(&error);
                SendOutcome::Failed { error }
            }
        }
    }

    async fn drive(&self, session: &mut Session) -> Result<()> {
        let host = &self.config.host;
        let port = self.config.port;

        debug!(host = %host, port, "connecting");
        let plain = match self.config.connect_timeout {
            Some(limit) => tokio::time::timeout(limit, self.connector.connect(host, port))
                .await
                .map_err(|_| Error::Timeout(session.state()))?,
            None => self.connector.connect(host, port).await,
        }?;
        let mut stream: SmtpStream<C::Stream, U::Stream> = SmtpStream::Plain(plain);
        let mut buf = vec![0u8; READ_CHUNK];
        let mut deadline = self.reply_deadline();

        loop {
            let read = stream.read(&mut buf);
            let n = match deadline {
                Some(at) => tokio::time::timeout_at(at, read)
                    .await
                    .map_err(|_| Error::Timeout(session.state()))?,
                None => read.await,
            }?;
            if n == 0 {
                return Err(Error::Closed(session.state()));
            }

            match session.feed(&buf[..n]) {
                Step::Wait => {}
                Step::Send(bytes) => {
                    write(&mut stream, &bytes).await?;
                    deadline = self.reply_deadline();
                }
                Step::UpgradeTls => {
                    debug!(host = %host, "upgrading to TLS");
                    let upgrade = stream.upgrade(&self.upgrader, host);
                    stream = match self.reply_deadline() {
                        Some(at) => tokio::time::timeout_at(at, upgrade)
                            .await
                            .map_err(|_| Error::Timeout(session.state()))?,
                        None => upgrade.await,
                    }?;
                    let ehlo = session.tls_established()?;
                    write(&mut stream, &ehlo).await?;
                    deadline = self.reply_deadline();
                }
                Step::Finish(quit) => {
                    // The message is already accepted; QUIT is best effort.
                    if let Err(e) = write(&mut stream, &quit).await {
                        debug!("QUIT not delivered: {e}");
                    }
                    if let Err(e) = stream.shutdown().await {
                        debug!("shutdown after QUIT failed: {e}");
                    }
                    return Ok(());
                }
                Step::Fail(error) => return Err(error),
            }
        }
    }

    /// Instant by which the reply now awaited must be complete.
    fn reply_deadline(&self) -> Option<Instant> {
        self.config.reply_timeout.map(|limit| Instant::now() + limit)
    }
}

async fn write<S>(stream: &mut S, bytes: &[u8]) -> Result<()>
where
    S: tokio::io::AsyncWrite + Unpin,
{
    stream.write_all(bytes).await?;
    stream.flush().await?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::session::SessionState;

    #[test]
    fn test_outcome_serialization() {
        let ok = SendOutcome::Delivered {
            message_id: "<1@conf.example>".into(),
        };
        assert_eq!(
            serde_json::to_string(&ok).unwrap(),
            r#"{"success":true,"messageId":"<1@conf.example>"}"#
        );

        let failed = SendOutcome::Failed {
            error: Error::Cancelled,
        };
        assert_eq!(
            serde_json::to_string(&failed).unwrap(),
            r#"{"success":false,"error":"Session cancelled"}"#
        );
    }

    #[test]
    fn test_outcome_accessors() {
        let ok = SendOutcome::from(Ok::<_, Error>("<1@x>".to_string()));
        assert!(ok.is_success());
        assert_eq!(ok.message_id(), Some("<1@x>"));
        assert!(ok.error().is_none());

        let failed = SendOutcome::from(Err::<String, _>(Error::Closed(
            SessionState::AwaitingGreeting,
        )));
        assert!(!failed.is_success());
        assert!(failed.error().unwrap().is_connection());
    }
}
