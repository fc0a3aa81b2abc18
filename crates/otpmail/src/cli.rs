use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use otpmail_core::{OtpSettings, SmtpSettings, TimeoutPolicy};
use otpmail_smtp::ReplyPolicy;

/// otpmail - mail one-time sign-in codes over SMTP
#[derive(Debug, Parser)]
#[command(name = "otpmail")]
#[command(about = "Mail one-time sign-in codes over SMTP with STARTTLS")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[command(flatten)]
    pub smtp: SmtpOverrides,

    /// Enable debug logging for every crate
    #[arg(long, global = true)]
    pub debug: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Generate a code, store it, and email it with a bounded wait
    Issue {
        /// Recipient address
        #[arg(long)]
        to: String,

        /// Milliseconds to wait for the email before reporting a timeout
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Abort the SMTP session when the wait runs out
        #[arg(long)]
        cancel_on_timeout: bool,
    },

    /// Send one message with a caller-chosen code and wait for the outcome
    Send {
        /// Recipient address
        #[arg(long)]
        to: String,

        /// One-time code to embed
        #[arg(long)]
        code: String,

        /// Subject line
        #[arg(long, default_value = otpmail_core::otp::SUBJECT)]
        subject: String,

        /// Seconds to wait for each server reply
        #[arg(long)]
        reply_timeout_secs: Option<u64>,

        /// Keep waiting when the server answers with an unexpected code
        #[arg(long)]
        stall_on_unexpected: bool,
    },
}

/// Overrides applied on top of the `SMTP_*` environment.
#[derive(Debug, Args)]
pub struct SmtpOverrides {
    /// SMTP relay host
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// SMTP relay port
    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// Sender address
    #[arg(long, global = true)]
    pub from: Option<String>,

    /// Verify the relay certificate against the web PKI roots
    #[arg(long, global = true)]
    pub verify_tls: bool,

    /// Skip certificate verification even if `SMTP_VERIFY_TLS` is set
    #[arg(long, global = true, conflicts_with = "verify_tls")]
    pub no_verify_tls: bool,
}

impl SmtpOverrides {
    pub fn apply(&self, settings: &mut SmtpSettings) {
        if let Some(host) = &self.host {
            settings.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.port = port;
        }
        if let Some(from) = &self.from {
            settings.sender = Some(from.clone());
        }
        if self.verify_tls {
            settings.verify_tls = true;
        }
        if self.no_verify_tls {
            settings.verify_tls = false;
        }
    }
}

/// Applies `issue` flags to the OTP settings.
pub fn apply_issue_flags(settings: &mut OtpSettings, timeout_ms: Option<u64>, cancel: bool) {
    if let Some(ms) = timeout_ms {
        settings.email_timeout = Duration::from_millis(ms);
    }
    if cancel {
        settings.timeout_policy = TimeoutPolicy::Cancel;
    }
}

/// Picks the reply policy for `send`.
pub const fn reply_policy(stall: bool) -> ReplyPolicy {
    if stall {
        ReplyPolicy::Stall
    } else {
        ReplyPolicy::FailFast
    }
}
