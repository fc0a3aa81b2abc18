//! Transport-free SMTP submission state machine.
//!
//! A [`Session`] consumes raw bytes from whichever transport is active and
//! answers with a [`Step`] telling the driver what to write next. It never
//! touches a socket, so the whole protocol flow can be exercised in memory.
//!
//! ```text
//! 220 → EHLO → 250 → STARTTLS → 220 → (upgrade) EHLO → 250 → AUTH LOGIN
//!     → 334 → user → 334 → pass → 235 → MAIL FROM → 250 → RCPT TO → 250
//!     → DATA → 354 → message → 250 → QUIT → Done
//! ```

mod state;

pub use state::{Action, SessionState, Transition, transition};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::command::Command;
use crate::error::Error;
use crate::message;
use crate::parser::next_reply;
use crate::types::{Address, Credentials, Envelope, Reply};

/// How a state reacts to a complete reply carrying a code it does not expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplyPolicy {
    /// Fail the session with [`Error::UnexpectedReply`].
    #[default]
    FailFast,
    /// Ignore the reply and keep waiting for the expected code.
    Stall,
}

/// What the driver must do after feeding bytes to the session.
#[derive(Debug)]
pub enum Step {
    /// No complete expected reply yet; keep reading.
    Wait,
    /// Write these bytes, then keep reading.
    Send(Vec<u8>),
    /// Upgrade the transport to TLS without writing anything first, then
    /// call [`Session::tls_established`].
    UpgradeTls,
    /// Write these bytes (`QUIT`), then close the transport. The session is `Done`.
    Finish(Vec<u8>),
    /// The session is `Failed`.
    Fail(Error),
}

/// One outbound submission.
#[derive(Debug)]
pub struct Session {
    state: SessionState,
    buffer: Vec<u8>,
    upgrade_pending: bool,
    envelope: Envelope,
    credentials: Credentials,
    sender: Address,
    client_hostname: String,
    policy: ReplyPolicy,
    message_id: String,
    date: DateTime<Utc>,
}

impl Session {
    /// Creates a session in `AwaitingGreeting` with a fresh Message-ID.
    #[must_use]
    pub fn new(
        envelope: Envelope,
        credentials: Credentials,
        sender: Address,
        client_hostname: impl Into<String>,
        policy: ReplyPolicy,
    ) -> Self {
        let date = Utc::now();
        let message_id = message::generate_message_id(&sender, date);
        Self {
            state: SessionState::AwaitingGreeting,
            buffer: Vec::new(),
            upgrade_pending: false,
            envelope,
            credentials,
            sender,
            client_hostname: client_hostname.into(),
            policy,
            message_id,
            date,
        }
    }

    /// Overrides the Message-ID and Date header values.
    #[must_use]
    pub fn with_message_id(mut self, message_id: impl Into<String>, date: DateTime<Utc>) -> Self {
        self.message_id = message_id.into();
        self.date = date;
        self
    }

    /// Returns the current state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Returns the Message-ID the message will carry.
    #[must_use]
    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    /// Returns the bytes received since the last recognized reply.
    #[must_use]
    pub fn buffered(&self) -> &[u8] {
        &self.buffer
    }

    /// Returns true while the driver owes a TLS upgrade.
    #[must_use]
    pub const fn upgrade_pending(&self) -> bool {
        self.upgrade_pending
    }

    /// Feeds bytes read from the active transport.
    pub fn feed(&mut self, bytes: &[u8]) -> Step {
        if self.state.is_terminal() {
            return Step::Wait;
        }
        if self.upgrade_pending {
            return self.fail(Error::Protocol(
                "received data while a TLS upgrade was pending".into(),
            ));
        }

        self.buffer.extend_from_slice(bytes);

        loop {
            let Some(expected) = transition(self.state) else {
                return Step::Wait;
            };

            let (reply, used) = match next_reply(&self.buffer) {
                Ok(Some(found)) => found,
                Ok(None) => return Step::Wait,
                Err(e) => match self.policy {
                    ReplyPolicy::FailFast => return self.fail(e),
                    ReplyPolicy::Stall => {
                        debug!(state = %self.state, "ignoring malformed line: {e}");
                        self.discard_line();
                        continue;
                    }
                },
            };
            debug!(state = %self.state, "S: {} {}", reply.code, reply.text());

            if reply.code == expected.expects {
                self.buffer.clear();
                return self.advance(expected);
            }

            match self.policy {
                ReplyPolicy::FailFast => return self.unexpected(expected, reply),
                ReplyPolicy::Stall => {
                    debug!(
                        state = %self.state,
                        "ignoring reply {} (waiting for {})",
                        reply.code,
                        expected.expects
                    );
                    self.buffer.drain(..used);
                }
            }
        }
    }

    /// Completes the STARTTLS step once the transport is secure.
    ///
    /// Returns the `EHLO` to send over the secure transport.
    ///
    /// # Errors
    ///
    /// Returns an error if no upgrade was pending.
    pub fn tls_established(&mut self) -> Result<Vec<u8>, Error> {
        if !self.upgrade_pending {
            return Err(Error::Protocol("no TLS upgrade pending".into()));
        }
        self.upgrade_pending = false;
        self.state = SessionState::AwaitingTlsEhlo;
        Ok(self.render(Action::Ehlo))
    }

    /// Moves the session to `Failed` because of an error outside the
    /// protocol flow (I/O, TLS, timeout, cancellation).
    pub fn fail(&mut self, error: Error) -> Step {
        self.abort(&error);
        Step::Fail(error)
    }

    /// Moves the session to `Failed`, logging `error`. No-op once terminal.
    pub fn abort(&mut self, error: &Error) {
        if self.state.is_terminal() {
            return;
        }
        warn!(state = %self.state, "SMTP session failed: {error}");
        self.state = SessionState::Failed;
        self.upgrade_pending = false;
        self.buffer.clear();
    }

    fn advance(&mut self, t: Transition) -> Step {
        match t.action {
            Action::UpgradeThenEhlo => {
                // Plaintext bytes past the 220 must not survive the upgrade.
                self.upgrade_pending = true;
                Step::UpgradeTls
            }
            Action::Quit => {
                self.state = t.next;
                Step::Finish(self.render(Action::Quit))
            }
            action => {
                self.state = t.next;
                Step::Send(self.render(action))
            }
        }
    }

    fn unexpected(&mut self, t: Transition, reply: Reply) -> Step {
        let error = Error::UnexpectedReply {
            state: self.state,
            expected: t.expects,
            code: reply.code,
            text: reply.text(),
        };
        self.fail(error)
    }

    fn discard_line(&mut self) {
        match self.buffer.iter().position(|&b| b == b'\n') {
            Some(end) => {
                self.buffer.drain(..=end);
            }
            None => self.buffer.clear(),
        }
    }

    fn render(&self, action: Action) -> Vec<u8> {
        let command = match action {
            Action::Ehlo | Action::UpgradeThenEhlo => Command::Ehlo {
                hostname: self.client_hostname.clone(),
            },
            Action::StartTls => Command::StartTls,
            Action::AuthLogin => Command::AuthLogin,
            Action::Username => Command::AuthResponse {
                secret: self.credentials.username.clone(),
            },
            Action::Password => Command::AuthResponse {
                secret: self.credentials.password.clone(),
            },
            Action::MailFrom => Command::MailFrom {
                from: self.sender.clone(),
            },
            Action::RcptTo => Command::RcptTo {
                to: self.envelope.recipient.clone(),
            },
            Action::Data => Command::Data,
            Action::Quit => Command::Quit,
            Action::Message => {
                debug!(
                    message_id = %self.message_id,
                    "C: <message content, {} bytes of HTML>",
                    self.envelope.html_body.len()
                );
                return message::compose(&self.sender, &self.envelope, &self.message_id, self.date);
            }
        };
        debug!("C: {}", command.redacted());
        command.serialize()
    }
}
