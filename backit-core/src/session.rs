//! The verification session: state and input of one email change attempt

use crate::{
    account::{AccountSnapshot, RefreshedAccount},
    error::{ErrorKind, Field},
};
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use zeroize::Zeroizing;

/// Where a session is in the email change process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    /// The user is entering the new address (and password)
    Editing,
    /// Provider calls for a submission are in flight
    Submitting,
    /// A verification link was sent, waiting for the user to follow it
    AwaitingVerification,
    /// The provider reports the new address as active
    Verified,
    /// The account has no password credential and can't change its email here
    Blocked,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Editing => "editing",
            SessionState::Submitting => "submitting",
            SessionState::AwaitingVerification => "awaiting verification",
            SessionState::Verified => "verified",
            SessionState::Blocked => "blocked",
        };
        f.write_str(name)
    }
}

/// Result of comparing the provider's account email with the candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationStatus {
    /// The provider reports the candidate address as active
    Verified,
    /// The verification link hasn't been used yet
    NotYetVerified,
}

/// State of one email change attempt.
///
/// Owned exclusively by one [crate::EmailChangeFlow].
pub(crate) struct VerificationSession {
    pub(crate) current_email: String,
    pub(crate) candidate_email: String,
    pub(crate) password: Zeroizing<String>,
    pub(crate) has_password_credential: bool,
    pub(crate) linked_providers: Vec<String>,
    pub(crate) state: SessionState,
    pub(crate) last_error: Option<ErrorKind>,
    /// Cancels the poller of the current `AwaitingVerification` phase
    pub(crate) poll_token: Option<CancellationToken>,
}

impl std::fmt::Debug for VerificationSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerificationSession")
            .field("current_email", &self.current_email)
            .field("candidate_email", &self.candidate_email)
            .field("has_password_credential", &self.has_password_credential)
            .field("state", &self.state)
            .field("last_error", &self.last_error)
            .finish_non_exhaustive()
    }
}

impl VerificationSession {
    pub(crate) fn new(account: AccountSnapshot) -> Self {
        let state = if account.has_password_credential {
            SessionState::Editing
        } else {
            SessionState::Blocked
        };

        Self {
            current_email: account.email,
            candidate_email: String::new(),
            password: Zeroizing::new(String::new()),
            has_password_credential: account.has_password_credential,
            linked_providers: account.linked_providers,
            state,
            last_error: None,
            poll_token: None,
        }
    }

    /// Stop the poller of this session, if one is running
    pub(crate) fn stop_polling(&mut self) {
        if let Some(token) = self.poll_token.take() {
            token.cancel();
        }
    }

    /// Compare a refreshed account with the candidate address.
    ///
    /// Returns `None` if the session isn't waiting for verification (anymore).
    pub(crate) fn observe_refresh(
        &mut self,
        account: &RefreshedAccount,
    ) -> Option<VerificationStatus> {
        match self.state {
            SessionState::AwaitingVerification if account.email == self.candidate_email => {
                self.state = SessionState::Verified;
                self.stop_polling();
                Some(VerificationStatus::Verified)
            }
            SessionState::AwaitingVerification => Some(VerificationStatus::NotYetVerified),
            SessionState::Verified => Some(VerificationStatus::Verified),
            _ => None,
        }
    }

    pub(crate) fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            current_email: self.current_email.clone(),
            candidate_email: self.candidate_email.clone(),
            has_password_credential: self.has_password_credential,
            state: self.state,
            last_error: self.last_error,
        }
    }
}

/// A password-free view of a session, handed to the presentation layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// The account email at session start
    pub current_email: String,
    /// The address the user wants to switch to
    pub candidate_email: String,
    /// Whether the password variant of the flow runs
    pub has_password_credential: bool,
    /// Current state
    pub state: SessionState,
    /// The most recent recoverable failure
    pub last_error: Option<ErrorKind>,
}

impl SessionSnapshot {
    /// The form field to mark invalid because of the last error
    pub fn invalid_field(&self) -> Option<Field> {
        self.last_error.and_then(|kind| kind.invalid_field())
    }

    /// The message to show for the last error
    pub fn error_message(&self) -> Option<&'static str> {
        self.last_error.map(|kind| kind.message())
    }
}

/// A session together with the channel its snapshots are published on.
///
/// The lock is never held across an `.await`.
#[derive(Debug)]
pub(crate) struct SharedSession {
    inner: Mutex<VerificationSession>,
    updates: watch::Sender<SessionSnapshot>,
}

impl SharedSession {
    pub(crate) fn new(session: VerificationSession) -> Self {
        let (updates, _) = watch::channel(session.snapshot());
        Self {
            inner: Mutex::new(session),
            updates,
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, VerificationSession> {
        self.inner.lock()
    }

    /// Publish the session's current state to all subscribers
    pub(crate) fn publish(&self, session: &VerificationSession) {
        self.updates.send_replace(session.snapshot());
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.updates.subscribe()
    }
}
