//! `otpmail` - mail one-time sign-in codes from the command line.
//!
//! Settings come from the `SMTP_*` and `OTP_*` environment variables; flags
//! override them. The outcome is printed to stdout as JSON.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod cli;

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use otpmail_core::{MemoryCodeStore, OtpService, OtpSettings, SmtpSettings, render_email};
use otpmail_smtp::Client;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.debug {
        "otpmail=debug,otpmail_core=debug,otpmail_smtp=debug"
    } else {
        "otpmail=info,otpmail_core=info,otpmail_smtp=debug"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut smtp = SmtpSettings::from_env().context("reading SMTP settings")?;
    cli.smtp.apply(&mut smtp);
    info!(host = %smtp.host, port = smtp.port, "using relay");
    debug!(settings = %serde_json::to_string(&smtp)?, "resolved SMTP settings");

    match cli.command {
        Command::Issue {
            to,
            timeout_ms,
            cancel_on_timeout,
        } => {
            let mut otp = OtpSettings::from_env().context("reading OTP settings")?;
            cli::apply_issue_flags(&mut otp, timeout_ms, cancel_on_timeout);

            let client = Client::new(smtp.to_config()?)?;
            let store = MemoryCodeStore::new(otp.code_ttl);
            let service = OtpService::new(client, store, otp);

            let report = service.issue(&to).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Send {
            to,
            code,
            subject,
            reply_timeout_secs,
            stall_on_unexpected,
        } => {
            let otp = OtpSettings::from_env().context("reading OTP settings")?;
            let mut config = smtp.to_config()?;
            config.reply_policy = cli::reply_policy(stall_on_unexpected);
            config.reply_timeout = reply_timeout_secs.map(Duration::from_secs);

            let client = Client::new(config)?;
            let html = render_email(&otp.brand, &code, otp.code_ttl.as_secs().div_ceil(60));
            let outcome = client.send(&to, &subject, &html, &code).await;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            if !outcome.is_success() {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
