//! Settings resolved from the process environment.
//!
//! Every value has a default, so a missing variable never fails startup.
//! Lookups go through a closure so tests never touch the real environment.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tracing::warn;

use crate::error::{Error, Result};

/// Default SMTP relay host.
pub const DEFAULT_SMTP_HOST: &str = "smtp.gmail.com";

/// Default submission port.
pub const DEFAULT_SMTP_PORT: u16 = otpmail_smtp::connection::DEFAULT_PORT;

/// SMTP relay settings. Serializes without the password, for logging.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct SmtpSettings {
    /// Relay hostname (`SMTP_HOST`).
    pub host: String,
    /// Relay port (`SMTP_PORT`).
    pub port: u16,
    /// AUTH LOGIN username (`SMTP_USER`).
    pub username: String,
    /// AUTH LOGIN password (`SMTP_PASS`).
    #[serde(skip_serializing)]
    pub password: String,
    /// Sender address (`SMTP_FROM`), defaults to the username.
    pub sender: Option<String>,
    /// Verify the relay certificate (`SMTP_VERIFY_TLS`).
    pub verify_tls: bool,
}

impl Default for SmtpSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_SMTP_HOST.to_string(),
            port: DEFAULT_SMTP_PORT,
            username: String::new(),
            password: String::new(),
            sender: None,
            verify_tls: false,
        }
    }
}

impl fmt::Debug for SmtpSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("sender", &self.sender)
            .field("verify_tls", &self.verify_tls)
            .finish()
    }
}

impl SmtpSettings {
    /// Reads settings from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is present but unparsable.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads settings through `lookup`, falling back to defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is present but unparsable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let settings = Self {
            host: get("SMTP_HOST").unwrap_or(defaults.host),
            port: get("SMTP_PORT")
                .map(|v| parse(&v, "SMTP_PORT"))
                .transpose()?
                .unwrap_or(defaults.port),
            username: get("SMTP_USER").unwrap_or_default(),
            password: get("SMTP_PASS").unwrap_or_default(),
            sender: get("SMTP_FROM"),
            verify_tls: get("SMTP_VERIFY_TLS")
                .map(|v| parse_bool(&v, "SMTP_VERIFY_TLS"))
                .transpose()?
                .unwrap_or(defaults.verify_tls),
        };

        if settings.username.is_empty() || settings.password.is_empty() {
            warn!("SMTP_USER or SMTP_PASS is not set; authentication will fail");
        }
        Ok(settings)
    }

    /// Returns the effective sender address.
    #[must_use]
    pub fn sender(&self) -> &str {
        self.sender.as_deref().unwrap_or(&self.username)
    }

    /// Builds the SMTP client configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the sender address is invalid.
    pub fn to_config(&self) -> Result<otpmail_smtp::Config> {
        Ok(otpmail_smtp::Config::builder(&self.host)
            .port(self.port)
            .credentials(&self.username, &self.password)
            .sender(self.sender())
            .verify_certificates(self.verify_tls)
            .build()?)
    }
}

/// What happens to a send still running when the caller stops waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeoutPolicy {
    /// Keep the session running in the background; its socket stays open
    /// until the server or the OS closes it.
    #[default]
    Detach,
    /// Abort the session and close its socket.
    Cancel,
}

/// One-time-code issuance settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtpSettings {
    /// Number of digits (`OTP_LENGTH`).
    pub code_length: usize,
    /// How long a code stays valid (`OTP_TTL_SECS`).
    pub code_ttl: Duration,
    /// How long issuance waits for the email (`OTP_EMAIL_TIMEOUT_MS`).
    pub email_timeout: Duration,
    /// Fate of a send that outlives `email_timeout` (`OTP_TIMEOUT_POLICY`).
    pub timeout_policy: TimeoutPolicy,
    /// Name shown in the email (`OTP_BRAND`).
    pub brand: String,
}

impl Default for OtpSettings {
    fn default() -> Self {
        Self {
            code_length: 4,
            code_ttl: Duration::from_secs(10 * 60),
            email_timeout: Duration::from_secs(5),
            timeout_policy: TimeoutPolicy::Detach,
            brand: "Conference".to_string(),
        }
    }
}

impl OtpSettings {
    /// Reads settings from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is present but unparsable.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads settings through `lookup`, falling back to defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is present but unparsable or a code
    /// length is outside 4..=10.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let code_length = get("OTP_LENGTH")
            .map(|v| parse::<usize>(&v, "OTP_LENGTH"))
            .transpose()?
            .unwrap_or(defaults.code_length);
        if !(4..=10).contains(&code_length) {
            return Err(Error::Config(format!(
                "OTP_LENGTH must be between 4 and 10, got {code_length}"
            )));
        }

        let timeout_policy = match get("OTP_TIMEOUT_POLICY").as_deref().map(str::trim) {
            None => defaults.timeout_policy,
            Some(v) if v.eq_ignore_ascii_case("detach") => TimeoutPolicy::Detach,
            Some(v) if v.eq_ignore_ascii_case("cancel") => TimeoutPolicy::Cancel,
            Some(other) => {
                return Err(Error::Config(format!(
                    "OTP_TIMEOUT_POLICY must be detach or cancel, got {other}"
                )));
            }
        };

        Ok(Self {
            code_length,
            code_ttl: get("OTP_TTL_SECS")
                .map(|v| parse(&v, "OTP_TTL_SECS").map(Duration::from_secs))
                .transpose()?
                .unwrap_or(defaults.code_ttl),
            email_timeout: get("OTP_EMAIL_TIMEOUT_MS")
                .map(|v| parse(&v, "OTP_EMAIL_TIMEOUT_MS").map(Duration::from_millis))
                .transpose()?
                .unwrap_or(defaults.email_timeout),
            timeout_policy,
            brand: get("OTP_BRAND").unwrap_or(defaults.brand),
        })
    }
}

fn parse<T: std::str::FromStr>(value: &str, key: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("{key} has an invalid value: {value}")))
}

fn parse_bool(value: &str, key: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::Config(format!("{key} has an invalid value: {value}"))),
    }
}
