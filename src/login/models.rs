// Data models for the QR login flow

use time::OffsetDateTime;

use crate::credentials::CredentialBundle;

/// Poll status codes reported by the passport API
pub const CODE_SUCCESS: i64 = 0;
pub const CODE_NOT_SCANNED: i64 = 86101;
pub const CODE_SCANNED_UNCONFIRMED: i64 = 86090;
pub const CODE_EXPIRED: i64 = 86038;

pub const AWAITING_CONFIRMATION: &str = "awaiting confirmation";
pub const QR_EXPIRED: &str = "qr code expired";

/// One login attempt's ticket. Discarded when the attempt ends.
#[derive(Debug, Clone, PartialEq)]
pub struct LoginTicket {
    /// Content to encode in the QR code
    pub qr_payload_url: String,
    pub ticket_key: String,
    pub created_at: OffsetDateTime,
}

impl LoginTicket {
    pub fn new(qr_payload_url: impl Into<String>, ticket_key: impl Into<String>) -> Self {
        Self {
            qr_payload_url: qr_payload_url.into(),
            ticket_key: ticket_key.into(),
            created_at: OffsetDateTime::now_utc(),
        }
    }

    pub fn age(&self) -> time::Duration {
        OffsetDateTime::now_utc() - self.created_at
    }
}

/// Result of one poll call
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Pending,
    ScannedUnconfirmed,
    Success(CredentialBundle),
    Expired,
    /// Unrecognised status code; carries the API's message
    Error(String),
}

/// Events streamed to the front end
#[derive(Debug, Clone, PartialEq)]
pub enum LoginEvent {
    QrReady(LoginTicket),
    StatusUpdate(String),
    LoginSucceeded(CredentialBundle),
    LoginFailed(String),
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginState {
    AwaitingScan,
    AwaitingConfirm,
    Succeeded,
    Expired,
    Errored,
    Cancelled,
}

/// Outcome of feeding one poll result to the state machine
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub next: LoginState,
    /// `None` for idle polls: nothing for the front end to show
    pub event: Option<LoginEvent>,
}

impl LoginState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Expired | Self::Errored | Self::Cancelled
        )
    }

    /// Pure transition function of the polling loop
    pub fn advance(self, outcome: PollOutcome) -> Transition {
        match outcome {
            PollOutcome::Pending => Transition {
                next: self,
                event: None,
            },
            PollOutcome::ScannedUnconfirmed if self == Self::AwaitingConfirm => Transition {
                next: self,
                event: None,
            },
            PollOutcome::ScannedUnconfirmed => Transition {
                next: Self::AwaitingConfirm,
                event: Some(LoginEvent::StatusUpdate(AWAITING_CONFIRMATION.to_string())),
            },
            PollOutcome::Success(bundle) => Transition {
                next: Self::Succeeded,
                event: Some(LoginEvent::LoginSucceeded(bundle)),
            },
            PollOutcome::Expired => Transition {
                next: Self::Expired,
                event: Some(LoginEvent::LoginFailed(QR_EXPIRED.to_string())),
            },
            PollOutcome::Error(message) => Transition {
                next: self,
                event: Some(LoginEvent::StatusUpdate(message)),
            },
        }
    }
}
