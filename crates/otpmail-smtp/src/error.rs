//! Error types for SMTP sessions.

use std::io;

use crate::session::SessionState;
use crate::types::ReplyCode;

/// Result type alias for SMTP operations.
pub type Result<T> = std::result::Result<T, Error>;

/// SMTP session error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// TCP connect failed, or the connection was reset mid-session.
    #[error("Connection error: {0}")]
    Connection(#[from] io::Error),

    /// The peer closed the connection before the session completed.
    #[error("Connection closed by server while {0}")]
    Closed(SessionState),

    /// TLS upgrade failed after the STARTTLS acknowledgment.
    #[error("TLS handshake error: {0}")]
    TlsHandshake(String),

    /// A complete reply arrived carrying a code the current state does not accept.
    #[error("Unexpected reply {code} while {state} (expected {expected}): {text}")]
    UnexpectedReply {
        /// State the session was parked in.
        state: SessionState,
        /// Code the state was waiting for.
        expected: ReplyCode,
        /// Code actually received.
        code: ReplyCode,
        /// Reply text, continuation lines joined with newlines.
        text: String,
    },

    /// No acceptable reply arrived within the configured reply timeout.
    #[error("Timed out while {0}")]
    Timeout(SessionState),

    /// The caller cancelled the session.
    #[error("Session cancelled")]
    Cancelled,

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Malformed data from the server or an invalid driver call.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl Error {
    /// Creates a TLS handshake error from any displayable cause.
    #[must_use]
    pub fn tls(cause: impl std::fmt::Display) -> Self {
        Self::TlsHandshake(cause.to_string())
    }

    /// Returns true for transport-level failures (connect, reset, early close).
    #[must_use]
    pub const fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Closed(_))
    }

    /// Returns true if the TLS upgrade failed.
    #[must_use]
    pub const fn is_tls(&self) -> bool {
        matches!(self, Self::TlsHandshake(_))
    }

    /// Returns true if the server answered with a code the session did not expect.
    #[must_use]
    pub const fn is_unexpected_reply(&self) -> bool {
        matches!(self, Self::UnexpectedReply { .. })
    }

    /// Returns true if an unexpected reply was a permanent error (5xx).
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::UnexpectedReply { code, .. } if code.is_permanent())
    }

    /// Returns true if an unexpected reply was a transient error (4xx).
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::UnexpectedReply { code, .. } if code.is_transient())
    }
}
