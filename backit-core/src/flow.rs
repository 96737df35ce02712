//! The email change verification flow
//!
//! ```text
//!                 submit                success
//!  Editing ─────────────────▶ Submitting ─────────▶ AwaitingVerification ──▶ Verified
//!     │   ◀───────────────────────┘ failure              │   poll / check now
//!     │   ◀──────────────────────────────────────────────┘ cancel
//!     └─▶ Blocked (account without a password credential)
//! ```

use crate::{
    error::{ErrorKind, FlowError, SideEffect},
    poller,
    provider::IdentityProvider,
    session::{
        SessionSnapshot, SessionState, SharedSession, VerificationSession, VerificationStatus,
    },
    settings::FlowSettings,
    validation::{validate_submission, EmailAddress},
};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use zeroize::Zeroizing;

/// Drives one attempt at changing the signed-in account's email address.
///
/// The account email never changes through this flow directly: the provider
/// sends a verification link to the new address and the flow waits until the
/// provider reports that address as active.
///
/// Dropping the flow stops its background poller.
pub struct EmailChangeFlow<P: IdentityProvider> {
    provider: Arc<P>,
    settings: FlowSettings,
    shared: Arc<SharedSession>,
}

impl<P: IdentityProvider> std::fmt::Debug for EmailChangeFlow<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailChangeFlow")
            .field("settings", &self.settings)
            .field("session", &self.shared)
            .finish()
    }
}

/// Input captured when a submission is accepted
struct Submission {
    current_email: String,
    candidate: EmailAddress,
    password: Zeroizing<String>,
    password_variant: bool,
    unlink: Option<String>,
}

impl<P: IdentityProvider> EmailChangeFlow<P> {
    /// Start a new session for the currently signed-in account.
    ///
    /// Accounts without a password credential start out `Blocked`.
    pub async fn start(provider: Arc<P>, settings: FlowSettings) -> Result<Self, FlowError> {
        let account = provider.current_account().await?;

        tracing::info!(
            email = %account.email,
            has_password_credential = account.has_password_credential,
            "Starting email change session"
        );

        let session = VerificationSession::new(account);
        if session.state == SessionState::Blocked {
            tracing::info!("Account has no password credential, email change is blocked");
        }

        Ok(Self {
            provider,
            settings,
            shared: Arc::new(SharedSession::new(session)),
        })
    }

    /// The current state of the session
    pub fn snapshot(&self) -> SessionSnapshot {
        self.shared.lock().snapshot()
    }

    /// Get notified whenever the session changes
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.shared.subscribe()
    }

    /// Enter the address to switch to
    pub fn set_candidate_email(&self, email: impl Into<String>) -> Result<(), FlowError> {
        let mut session = self.shared.lock();
        ensure_state(&session, SessionState::Editing, "edit the email address")?;
        session.candidate_email = email.into();
        session.last_error = None;
        self.shared.publish(&session);
        Ok(())
    }

    /// Enter the account password
    pub fn set_password(&self, password: impl Into<String>) -> Result<(), FlowError> {
        let mut session = self.shared.lock();
        ensure_state(&session, SessionState::Editing, "edit the password")?;
        session.password = Zeroizing::new(password.into());
        session.last_error = None;
        self.shared.publish(&session);
        Ok(())
    }

    /// Submit the entered address.
    ///
    /// Validation failures are rejected without contacting the provider.
    /// Otherwise the flow re-authenticates, unlinks the configured federated
    /// provider (best-effort) and asks the provider to send a verification
    /// link. On success the session waits for verification and polls the
    /// provider in the background. On failure it returns to `Editing` with
    /// the error recorded, keeping the entered input.
    #[tracing::instrument(skip(self))]
    pub async fn submit(&self) -> Result<(), FlowError> {
        let submission = self.begin_submission()?;
        let mut guard = SubmittingGuard {
            shared: &self.shared,
            armed: true,
        };

        let outcome = self.run_submission(&submission).await;
        guard.armed = false;

        let mut session = self.shared.lock();
        ensure_state(&session, SessionState::Submitting, "submit")?;

        match outcome {
            Ok(()) => {
                let token = CancellationToken::new();
                session.state = SessionState::AwaitingVerification;
                session.poll_token = Some(token.clone());
                self.shared.publish(&session);

                poller::spawn(
                    self.provider.clone(),
                    self.shared.clone(),
                    self.settings.poll_interval(),
                    token,
                );

                tracing::info!(
                    candidate_email = %submission.candidate,
                    "Verification link sent, waiting for confirmation"
                );
                Ok(())
            }
            Err(kind) => {
                session.state = SessionState::Editing;
                session.last_error = Some(kind);
                self.shared.publish(&session);
                Err(FlowError::Rejected(kind))
            }
        }
    }

    fn begin_submission(&self) -> Result<Submission, FlowError> {
        let mut session = self.shared.lock();
        ensure_state(&session, SessionState::Editing, "submit")?;

        session.last_error = None;
        let candidate = match validate_submission(
            &session.current_email,
            &session.candidate_email,
            &session.password,
            session.has_password_credential,
        ) {
            Ok(candidate) => candidate,
            Err(kind) => {
                tracing::debug!(?kind, "Submission rejected by local validation");
                session.last_error = Some(kind);
                self.shared.publish(&session);
                return Err(FlowError::Rejected(kind));
            }
        };

        let unlink = self
            .settings
            .unlink_provider
            .as_ref()
            .filter(|id| session.linked_providers.contains(id))
            .cloned();

        session.state = SessionState::Submitting;
        self.shared.publish(&session);

        Ok(Submission {
            current_email: session.current_email.clone(),
            candidate,
            password: session.password.clone(),
            password_variant: session.has_password_credential,
            unlink,
        })
    }

    async fn run_submission(&self, submission: &Submission) -> Result<(), ErrorKind> {
        let candidate = submission.candidate.as_str();

        if self.settings.check_email_availability {
            let available = self
                .provider
                .check_email_available(candidate)
                .await
                .map_err(|e| provider_failure("check_email_available", &e))?;

            if !available {
                tracing::info!(candidate_email = %candidate, "Email address already in use");
                return Err(ErrorKind::EmailAlreadyInUse);
            }
        }

        if submission.password_variant {
            self.provider
                .reauthenticate(&submission.current_email, &submission.password)
                .await
                .map_err(|e| provider_failure("reauthenticate", &e))?;

            self.unlink_provider(submission.unlink.as_deref()).await;
        }

        self.provider
            .send_verification_for_email_change(candidate)
            .await
            .map_err(|e| provider_failure("send_verification_for_email_change", &e))?;

        Ok(())
    }

    /// Best-effort removal of a federated sign-in method.
    pub(crate) async fn unlink_provider(&self, provider_id: Option<&str>) -> SideEffect {
        let Some(provider_id) = provider_id else {
            return SideEffect::Skipped;
        };

        match self.provider.unlink_provider(provider_id).await {
            Ok(()) => {
                tracing::info!(provider_id, "Unlinked federated provider");
                self.shared
                    .lock()
                    .linked_providers
                    .retain(|id| id != provider_id);
                SideEffect::Applied
            }
            Err(e) => {
                tracing::warn!(provider_id, %e, "Couldn't unlink federated provider, continuing");
                SideEffect::NonFatal(e)
            }
        }
    }

    /// Ask the provider right away whether the new address was verified.
    ///
    /// Provider failures are returned to the caller and leave the session as is.
    pub async fn check_now(&self) -> Result<VerificationStatus, FlowError> {
        {
            let session = self.shared.lock();
            match session.state {
                SessionState::AwaitingVerification => {}
                SessionState::Verified => return Ok(VerificationStatus::Verified),
                state => {
                    return Err(FlowError::NotAllowed {
                        command: "check verification",
                        state,
                    })
                }
            }
        }

        let account = self.provider.refresh_account().await?;

        let mut session = self.shared.lock();
        let state = session.state;
        let status = session
            .observe_refresh(&account)
            .ok_or(FlowError::NotAllowed {
                command: "check verification",
                state,
            })?;

        if status == VerificationStatus::Verified && state != SessionState::Verified {
            tracing::info!(email = %account.email, "New email address verified");
            self.shared.publish(&session);
        }

        Ok(status)
    }

    /// Stop waiting for verification and go back to editing.
    ///
    /// The entered password is cleared. Does nothing in any state other than
    /// `AwaitingVerification`. Returns the state after cancelling.
    pub fn cancel(&self) -> SessionState {
        let mut session = self.shared.lock();

        if session.state == SessionState::AwaitingVerification {
            session.stop_polling();
            session.state = SessionState::Editing;
            session.password = Zeroizing::new(String::new());
            self.shared.publish(&session);
            tracing::info!("Stopped waiting for email verification");
        }

        session.state
    }

    /// Acknowledge a verified email change and end the session.
    ///
    /// Signs the user out if configured, so they sign in again with the new
    /// address. Consumes the flow either way. Returns the new email address.
    pub async fn finalize(self) -> Result<String, FlowError> {
        let new_email = {
            let session = self.shared.lock();
            ensure_state(&session, SessionState::Verified, "finalize")?;
            session.candidate_email.clone()
        };

        if self.settings.sign_out_after_verification {
            tracing::info!("Signing out to re-establish the session with the new email address");
            self.provider.sign_out().await?;
        }

        Ok(new_email)
    }
}

impl<P: IdentityProvider> Drop for EmailChangeFlow<P> {
    fn drop(&mut self) {
        self.shared.lock().stop_polling();
    }
}

/// Returns a session to `Editing` if a submission is abandoned mid-flight
struct SubmittingGuard<'a> {
    shared: &'a SharedSession,
    armed: bool,
}

impl Drop for SubmittingGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let mut session = self.shared.lock();
        if session.state == SessionState::Submitting {
            tracing::debug!("Submission abandoned, back to editing");
            session.state = SessionState::Editing;
            self.shared.publish(&session);
        }
    }
}

fn ensure_state(
    session: &VerificationSession,
    expected: SessionState,
    command: &'static str,
) -> Result<(), FlowError> {
    if session.state == expected {
        Ok(())
    } else {
        Err(FlowError::NotAllowed {
            command,
            state: session.state,
        })
    }
}

fn provider_failure(operation: &'static str, err: &crate::error::AuthError) -> ErrorKind {
    tracing::warn!(operation, %err, "Identity provider call failed");
    ErrorKind::from(err)
}
