//! Per-send inputs: the envelope and the submission credentials.

use std::fmt;

use super::Address;
use crate::error::Result;

/// Immutable input for one send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Recipient address (envelope `RCPT TO` and `To:` header).
    pub recipient: Address,
    /// Subject line.
    pub subject: String,
    /// HTML body.
    pub html_body: String,
    /// One-time code, treated as an opaque string.
    pub one_time_code: String,
}

impl Envelope {
    /// Creates an envelope, validating the recipient address.
    ///
    /// # Errors
    ///
    /// Returns an error if the recipient address is invalid.
    pub fn new(
        recipient: impl Into<String>,
        subject: impl Into<String>,
        html_body: impl Into<String>,
        one_time_code: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            recipient: Address::new(recipient)?,
            subject: subject.into(),
            html_body: html_body.into(),
            one_time_code: one_time_code.into(),
        })
    }
}

/// Username and password for AUTH LOGIN.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Authentication username.
    pub username: String,
    /// Authentication password.
    pub password: String,
}

impl Credentials {
    /// Creates a new credential pair.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_validates_recipient() {
        assert!(Envelope::new("nobody", "Login", "<p>hi</p>", "1234").is_err());
        let envelope = Envelope::new("a@conf.example", "Login", "<p>hi</p>", "1234").unwrap();
        assert_eq!(envelope.recipient.as_str(), "a@conf.example");
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let creds = Credentials::new("mailer@conf.example", "hunter2");
        let debug = format!("{creds:?}");
        assert!(debug.contains("mailer@conf.example"));
        assert!(!debug.contains("hunter2"));
    }
}
