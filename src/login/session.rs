// Login session controller
//
// beginLogin: request a ticket, emit QrReady, then poll until a terminal
// state. Events go out over an unbounded channel in generation order.
//
// Errors (ticket or poll) end the attempt with LoginFailed; nothing is
// retried. Cancellation is checked before every poll request.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};

use super::models::{LoginEvent, LoginState};
use super::passport::LoginApi;

pub struct LoginSession {
    api: Arc<dyn LoginApi>,
    poll_interval: Duration,
}

impl LoginSession {
    pub fn new(api: Arc<dyn LoginApi>, poll_interval: Duration) -> Self {
        Self { api, poll_interval }
    }

    /// Start a login attempt on its own task
    pub fn start(self) -> LoginHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let task = tokio::spawn(async move { self.run(token, tx).await });

        LoginHandle {
            events: rx,
            cancel: cancel.clone(),
            _guard: cancel.drop_guard(),
            task,
        }
    }

    /// Run one attempt to completion; returns the final state
    pub async fn run(
        &self,
        cancel: CancellationToken,
        events: UnboundedSender<LoginEvent>,
    ) -> LoginState {
        let emit = |event: LoginEvent| {
            let _ = events.send(event);
        };

        if cancel.is_cancelled() {
            emit(LoginEvent::Cancelled);
            return LoginState::Cancelled;
        }

        let ticket = match self.api.generate_ticket().await {
            Ok(ticket) => ticket,
            Err(e) => {
                tracing::warn!(error = %e, "[Login] Ticket request failed");
                emit(LoginEvent::LoginFailed(e.to_string()));
                return LoginState::Errored;
            }
        };
        let ticket_key = ticket.ticket_key.clone();
        tracing::info!("[Login] QR code ready, waiting for scan");
        emit(LoginEvent::QrReady(ticket.clone()));

        let mut state = LoginState::AwaitingScan;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
            if cancel.is_cancelled() {
                tracing::info!("[Login] Cancelled");
                emit(LoginEvent::Cancelled);
                return LoginState::Cancelled;
            }

            let outcome = match self.api.poll(&ticket_key).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::warn!(error = %e, "[Login] Poll failed");
                    emit(LoginEvent::LoginFailed(e.to_string()));
                    return LoginState::Errored;
                }
            };

            let transition = state.advance(outcome);
            if transition.next != state {
                tracing::info!(from = ?state, to = ?transition.next, "[Login] State change");
            }
            state = transition.next;
            if let Some(event) = transition.event {
                emit(event);
            }

            if state.is_terminal() {
                if state == LoginState::Expired {
                    tracing::info!(age_secs = ticket.age().whole_seconds(), "[Login] QR code expired");
                }
                return state;
            }
        }
    }
}

/// Handle to a running login attempt
pub struct LoginHandle {
    events: UnboundedReceiver<LoginEvent>,
    cancel: CancellationToken,
    /// Dropping the handle cancels the operation
    _guard: DropGuard,
    task: JoinHandle<LoginState>,
}

impl LoginHandle {
    /// Next event, or `None` after the attempt ended and events were drained
    pub async fn next_event(&mut self) -> Option<LoginEvent> {
        self.events.recv().await
    }

    /// Stop polling; observed before the next poll request
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn join(self) -> LoginState {
        self.task.await.unwrap_or(LoginState::Errored)
    }
}
