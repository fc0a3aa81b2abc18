//! Abstraction over "send one code email".

use std::future::Future;

use otpmail_smtp::connection::{Connector, TlsUpgrade};
use otpmail_smtp::{Client, SendOutcome};

/// Sends one-time-code emails.
pub trait Mailer: Send + Sync + 'static {
    /// Sends one message. Never fails; failures are reported in the outcome.
    fn send(
        &self,
        recipient: &str,
        subject: &str,
        html_body: &str,
        one_time_code: &str,
    ) -> impl Future<Output = SendOutcome> + Send;
}

impl<C, U> Mailer for Client<C, U>
where
    C: Connector + 'static,
    U: TlsUpgrade<C::Stream> + 'static,
{
    async fn send(
        &self,
        recipient: &str,
        subject: &str,
        html_body: &str,
        one_time_code: &str,
    ) -> SendOutcome {
        Self::send(self, recipient, subject, html_body, one_time_code).await
    }
}
