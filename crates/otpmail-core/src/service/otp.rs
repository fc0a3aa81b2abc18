//! One-time-code issuance.
//!
//! Issuing a code persists it first and only then attempts delivery. The
//! email is raced against [`OtpSettings::email_timeout`]; whatever the email
//! does, issuance itself reports success so a slow or broken relay never
//! blocks sign-in.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use super::Mailer;
use crate::error::Result;
use crate::otp::{self, CodeStore};
use crate::settings::{OtpSettings, TimeoutPolicy};

/// What happened to the code email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum EmailStatus {
    /// The relay accepted the message.
    Sent {
        /// Message-ID of the accepted message.
        #[serde(rename = "messageId")]
        message_id: String,
    },
    /// The session failed.
    Failed {
        /// Failure description.
        error: String,
    },
    /// The email did not finish within the timeout.
    TimedOut,
}

/// Result of [`OtpService::issue`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueReport {
    /// Always true once the code has been stored.
    pub code_issued: bool,
    /// Delivery status of the email.
    pub email: EmailStatus,
}

/// Issues and verifies one-time codes.
#[derive(Debug)]
pub struct OtpService<M, S> {
    mailer: Arc<M>,
    store: S,
    settings: OtpSettings,
}

impl<M, S> OtpService<M, S>
where
    M: Mailer,
    S: CodeStore,
{
    /// Creates a service.
    pub fn new(mailer: M, store: S, settings: OtpSettings) -> Self {
        Self {
            mailer: Arc::new(mailer),
            store,
            settings,
        }
    }

    /// Returns the settings.
    #[must_use]
    pub const fn settings(&self) -> &OtpSettings {
        &self.settings
    }

    /// Returns the code store.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Issues a code to `email` and attempts to mail it.
    ///
    /// # Errors
    ///
    /// Returns an error only if the code cannot be stored. Email failures and
    /// timeouts are reported in the [`IssueReport`].
    pub async fn issue(&self, email: &str) -> Result<IssueReport> {
        let code = otp::generate_code(self.settings.code_length);
        self.store.save(email, &code).await?;
        info!(email, "code issued");

        let html = otp::render_email(
            &self.settings.brand,
            &code,
            self.settings.code_ttl.as_secs().div_ceil(60),
        );

        let mailer = Arc::clone(&self.mailer);
        let recipient = email.to_string();
        let mut task = tokio::spawn(async move {
            mailer.send(&recipient, otp::SUBJECT, &html, &code).await
        });

        let status = match tokio::time::timeout(self.settings.email_timeout, &mut task).await {
            Ok(Ok(outcome)) => match outcome.error() {
                None => EmailStatus::Sent {
                    message_id: outcome.message_id().unwrap_or_default().to_string(),
                },
                Some(error) => {
                    warn!(email, "code email failed: {error}");
                    EmailStatus::Failed {
                        error: error.to_string(),
                    }
                }
            },
            Ok(Err(join_error)) => {
                warn!(email, "code email task ended abnormally: {join_error}");
                EmailStatus::Failed {
                    error: join_error.to_string(),
                }
            }
            Err(_) => {
                match self.settings.timeout_policy {
                    TimeoutPolicy::Detach => {
                        warn!(email, "code email still pending, continuing in background");
                    }
                    TimeoutPolicy::Cancel => {
                        warn!(email, "code email timed out, cancelling");
                        task.abort();
                    }
                }
                EmailStatus::TimedOut
            }
        };

        Ok(IssueReport {
            code_issued: true,
            email: status,
        })
    }

    /// Checks a code submitted for `email`. A match consumes the code.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub async fn verify(&self, email: &str, code: &str) -> Result<bool> {
        let valid = self.store.verify(email, code).await?;
        if valid {
            info!(email, "code verified");
        } else {
            info!(email, "code rejected");
        }
        Ok(valid)
    }
}
