//! Submission configuration types.

use std::time::Duration;

use crate::error::Result;
use crate::session::ReplyPolicy;
use crate::types::{Address, Credentials};

/// Default submission port (STARTTLS).
pub const DEFAULT_PORT: u16 = 587;

/// Default EHLO hostname.
pub const DEFAULT_CLIENT_HOSTNAME: &str = "localhost";

/// SMTP submission configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server hostname, also used as the TLS server name.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// AUTH LOGIN credentials.
    pub credentials: Credentials,
    /// Envelope sender and `From:` header.
    pub sender: Address,
    /// Name announced in `EHLO`.
    pub client_hostname: String,
    /// Reaction to replies carrying an unexpected code.
    pub reply_policy: ReplyPolicy,
    /// Connect timeout. `None` waits for the OS.
    pub connect_timeout: Option<Duration>,
    /// Time allowed for each expected reply, counted from the command that
    /// asked for it. Partial or ignored replies do not extend it. `None`
    /// waits forever.
    pub reply_timeout: Option<Duration>,
    /// Verify the server certificate against the bundled web PKI roots.
    pub verify_certificates: bool,
}

impl Config {
    /// Creates a configuration builder.
    #[must_use]
    pub fn builder(host: impl Into<String>) -> ConfigBuilder {
        ConfigBuilder::new(host)
    }
}

/// Builder for submission configuration.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    host: String,
    port: u16,
    credentials: Credentials,
    sender: Option<String>,
    client_hostname: String,
    reply_policy: ReplyPolicy,
    connect_timeout: Option<Duration>,
    reply_timeout: Option<Duration>,
    verify_certificates: bool,
}

impl ConfigBuilder {
    /// Creates a new builder with the given hostname.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            credentials: Credentials::new("", ""),
            sender: None,
            client_hostname: DEFAULT_CLIENT_HOSTNAME.to_string(),
            reply_policy: ReplyPolicy::default(),
            connect_timeout: None,
            reply_timeout: None,
            verify_certificates: false,
        }
    }

    /// Sets the port.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the AUTH LOGIN credentials.
    #[must_use]
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Credentials::new(username, password);
        self
    }

    /// Sets the sender address. Defaults to the username.
    #[must_use]
    pub fn sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    /// Sets the name announced in `EHLO`.
    #[must_use]
    pub fn client_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.client_hostname = hostname.into();
        self
    }

    /// Sets the unexpected-reply policy.
    #[must_use]
    pub const fn reply_policy(mut self, policy: ReplyPolicy) -> Self {
        self.reply_policy = policy;
        self
    }

    /// Sets the connect timeout.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Sets the per-reply timeout.
    #[must_use]
    pub const fn reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = Some(timeout);
        self
    }

    /// Enables or disables server certificate verification.
    #[must_use]
    pub const fn verify_certificates(mut self, verify: bool) -> Self {
        self.verify_certificates = verify;
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the sender (or, lacking one, the username) is not
    /// a valid address.
    pub fn build(self) -> Result<Config> {
        let sender = Address::new(
            self.sender
                .unwrap_or_else(|| self.credentials.username.clone()),
        )?;

        Ok(Config {
            host: self.host,
            port: self.port,
            credentials: self.credentials,
            sender,
            client_hostname: self.client_hostname,
            reply_policy: self.reply_policy,
            connect_timeout: self.connect_timeout,
            reply_timeout: self.reply_timeout,
            verify_certificates: self.verify_certificates,
        })
    }
}
