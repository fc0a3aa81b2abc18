//! Session states and the reply-code transition table.

use std::fmt;

use crate::types::ReplyCode;

/// Position of a submission session in the EHLO → STARTTLS → AUTH LOGIN →
/// MAIL → RCPT → DATA → QUIT sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Connected, waiting for the `220` greeting.
    AwaitingGreeting,
    /// Plaintext `EHLO` sent.
    AwaitingEhlo,
    /// `STARTTLS` sent.
    AwaitingStartTlsAck,
    /// Upgraded to TLS, second `EHLO` sent.
    AwaitingTlsEhlo,
    /// `AUTH LOGIN` sent.
    AwaitingAuthPrompt,
    /// Base64 username sent.
    AwaitingUsernameAck,
    /// Base64 password sent.
    AwaitingPasswordAck,
    /// `MAIL FROM` sent.
    AwaitingMailAck,
    /// `RCPT TO` sent.
    AwaitingRcptAck,
    /// `DATA` sent.
    AwaitingDataPrompt,
    /// Message content and terminating `.` sent.
    AwaitingSendAck,
    /// Message accepted, `QUIT` sent.
    Done,
    /// Session ended with an error.
    Failed,
}

impl SessionState {
    /// Returns true for `Done` and `Failed`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Returns the reply code this state is waiting for, if any.
    #[must_use]
    pub const fn expected_code(self) -> Option<ReplyCode> {
        match transition(self) {
            Some(t) => Some(t.expects),
            None => None,
        }
    }

    /// Returns true once the session talks over the secure transport.
    #[must_use]
    pub const fn is_secure(self) -> bool {
        !matches!(
            self,
            Self::AwaitingGreeting | Self::AwaitingEhlo | Self::AwaitingStartTlsAck
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::AwaitingGreeting => "awaiting greeting",
            Self::AwaitingEhlo => "awaiting EHLO reply",
            Self::AwaitingStartTlsAck => "awaiting STARTTLS acknowledgment",
            Self::AwaitingTlsEhlo => "awaiting EHLO reply over TLS",
            Self::AwaitingAuthPrompt => "awaiting AUTH LOGIN prompt",
            Self::AwaitingUsernameAck => "awaiting username acknowledgment",
            Self::AwaitingPasswordAck => "awaiting password acknowledgment",
            Self::AwaitingMailAck => "awaiting MAIL FROM acknowledgment",
            Self::AwaitingRcptAck => "awaiting RCPT TO acknowledgment",
            Self::AwaitingDataPrompt => "awaiting DATA prompt",
            Self::AwaitingSendAck => "awaiting message acceptance",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(text)
    }
}

/// What to put on the wire when a transition fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Send `EHLO <client hostname>`.
    Ehlo,
    /// Send `STARTTLS`.
    StartTls,
    /// Upgrade the transport in place, then send `EHLO` over it.
    UpgradeThenEhlo,
    /// Send `AUTH LOGIN`.
    AuthLogin,
    /// Send the base64 username.
    Username,
    /// Send the base64 password.
    Password,
    /// Send `MAIL FROM:<sender>`.
    MailFrom,
    /// Send `RCPT TO:<recipient>`.
    RcptTo,
    /// Send `DATA`.
    Data,
    /// Send headers, body, fallback line and the terminating `.`.
    Message,
    /// Send `QUIT` and close.
    Quit,
}

/// One row of the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// Reply code that fires the transition.
    pub expects: ReplyCode,
    /// Action to perform.
    pub action: Action,
    /// State entered once the action has been performed.
    pub next: SessionState,
}

const fn row(expects: ReplyCode, action: Action, next: SessionState) -> Option<Transition> {
    Some(Transition {
        expects,
        action,
        next,
    })
}

/// The transition table. Terminal states have no outgoing row.
#[must_use]
pub const fn transition(state: SessionState) -> Option<Transition> {
    use Action as A;
    use SessionState as S;

    match state {
        S::AwaitingGreeting => row(ReplyCode::SERVICE_READY, A::Ehlo, S::AwaitingEhlo),
        S::AwaitingEhlo => row(ReplyCode::OK, A::StartTls, S::AwaitingStartTlsAck),
        S::AwaitingStartTlsAck => row(
            ReplyCode::SERVICE_READY,
            A::UpgradeThenEhlo,
            S::AwaitingTlsEhlo,
        ),
        S::AwaitingTlsEhlo => row(ReplyCode::OK, A::AuthLogin, S::AwaitingAuthPrompt),
        S::AwaitingAuthPrompt => row(ReplyCode::AUTH_CONTINUE, A::Username, S::AwaitingUsernameAck),
        S::AwaitingUsernameAck => {
            row(ReplyCode::AUTH_CONTINUE, A::Password, S::AwaitingPasswordAck)
        }
        S::AwaitingPasswordAck => row(ReplyCode::AUTH_SUCCEEDED, A::MailFrom, S::AwaitingMailAck),
        S::AwaitingMailAck => row(ReplyCode::OK, A::RcptTo, S::AwaitingRcptAck),
        S::AwaitingRcptAck => row(ReplyCode::OK, A::Data, S::AwaitingDataPrompt),
        S::AwaitingDataPrompt => row(ReplyCode::START_DATA, A::Message, S::AwaitingSendAck),
        S::AwaitingSendAck => row(ReplyCode::OK, A::Quit, S::Done),
        S::Done | S::Failed => None,
    }
}
