//! An in-memory identity provider for testing the email change flow

use crate::{
    account::{AccountSnapshot, RefreshedAccount},
    error::AuthError,
    provider::IdentityProvider,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::{
    collections::{BTreeSet, HashMap, VecDeque},
    sync::Arc,
};
use tokio::sync::Notify;

/// Provider operations, used to inject failures and pauses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// [IdentityProvider::current_account]
    CurrentAccount,
    /// [IdentityProvider::reauthenticate]
    Reauthenticate,
    /// [IdentityProvider::unlink_provider]
    UnlinkProvider,
    /// [IdentityProvider::send_verification_for_email_change]
    SendVerification,
    /// [IdentityProvider::check_email_available]
    CheckEmailAvailable,
    /// [IdentityProvider::refresh_account]
    RefreshAccount,
    /// [IdentityProvider::sign_out]
    SignOut,
}

/// A recorded provider call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    /// Looked up the current account
    CurrentAccount,
    /// Re-authenticated with email and password
    Reauthenticate {
        /// email used
        email: String,
        /// password used
        password: String,
    },
    /// Unlinked a federated provider
    UnlinkProvider(String),
    /// Sent a verification link
    SendVerification(String),
    /// Checked address availability
    CheckEmailAvailable(String),
    /// Reloaded the account
    RefreshAccount,
    /// Signed out
    SignOut,
}

impl Call {
    /// The operation this call belongs to
    pub fn operation(&self) -> Operation {
        match self {
            Call::CurrentAccount => Operation::CurrentAccount,
            Call::Reauthenticate { .. } => Operation::Reauthenticate,
            Call::UnlinkProvider(_) => Operation::UnlinkProvider,
            Call::SendVerification(_) => Operation::SendVerification,
            Call::CheckEmailAvailable(_) => Operation::CheckEmailAvailable,
            Call::RefreshAccount => Operation::RefreshAccount,
            Call::SignOut => Operation::SignOut,
        }
    }

    /// Whether this call changes anything on the provider's side
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Call::Reauthenticate { .. }
                | Call::UnlinkProvider(_)
                | Call::SendVerification(_)
                | Call::SignOut
        )
    }
}

/// An identity provider keeping everything in memory.
///
/// The account email only changes when [FakeIdentityProvider::confirm_email]
/// is called, simulating the user following the verification link.
#[derive(Debug, Clone)]
pub struct FakeIdentityProvider {
    inner: Arc<State>,
}

#[derive(Debug)]
struct State {
    account: Mutex<AccountSnapshot>,
    password: String,
    taken_emails: Mutex<BTreeSet<String>>,
    calls: Mutex<Vec<Call>>,
    failures: Mutex<HashMap<Operation, VecDeque<AuthError>>>,
    persistent_failures: Mutex<HashMap<Operation, AuthError>>,
    pauses: Mutex<HashMap<Operation, Arc<Notify>>>,
}

impl FakeIdentityProvider {
    /// An account that signs in with `email` and `password`
    pub fn with_password(email: &str, password: &str) -> Self {
        Self::new(
            AccountSnapshot {
                email: email.to_string(),
                has_password_credential: true,
                linked_providers: Vec::new(),
            },
            password,
        )
    }

    /// An account that only signs in through a federated provider
    pub fn federated_only(email: &str, provider_id: &str) -> Self {
        Self::new(
            AccountSnapshot {
                email: email.to_string(),
                has_password_credential: false,
                linked_providers: vec![provider_id.to_string()],
            },
            "",
        )
    }

    fn new(account: AccountSnapshot, password: &str) -> Self {
        Self {
            inner: Arc::new(State {
                account: Mutex::new(account),
                password: password.to_string(),
                taken_emails: Mutex::new(BTreeSet::new()),
                calls: Mutex::new(Vec::new()),
                failures: Mutex::new(HashMap::new()),
                persistent_failures: Mutex::new(HashMap::new()),
                pauses: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Link a federated provider to the account
    pub fn link_provider(self, provider_id: &str) -> Self {
        self.inner
            .account
            .lock()
            .linked_providers
            .push(provider_id.to_string());
        self
    }

    /// Register `email` with some other account
    pub fn take_email(&self, email: &str) {
        self.inner.taken_emails.lock().insert(email.to_string());
    }

    /// Make the next call of `operation` fail with `err`
    pub fn fail_once(&self, operation: Operation, err: AuthError) {
        self.inner
            .failures
            .lock()
            .entry(operation)
            .or_default()
            .push_back(err);
    }

    /// Make every call of `operation` fail with `err`
    pub fn fail_always(&self, operation: Operation, err: AuthError) {
        self.inner.persistent_failures.lock().insert(operation, err);
    }

    /// Make calls of `operation` wait until the returned [Notify] is notified
    pub fn pause(&self, operation: Operation) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        self.inner.pauses.lock().insert(operation, notify.clone());
        notify
    }

    /// Simulate the user following the verification link sent to `email`
    pub fn confirm_email(&self, email: &str) {
        self.inner.account.lock().email = email.to_string();
    }

    /// All calls made so far, in order
    pub fn calls(&self) -> Vec<Call> {
        self.inner.calls.lock().clone()
    }

    /// How often `operation` was called
    pub fn count(&self, operation: Operation) -> usize {
        self.inner
            .calls
            .lock()
            .iter()
            .filter(|call| call.operation() == operation)
            .count()
    }

    async fn enter(&self, call: Call) -> Result<(), AuthError> {
        let operation = call.operation();
        self.inner.calls.lock().push(call);

        let pause = self.inner.pauses.lock().get(&operation).cloned();
        if let Some(notify) = pause {
            notify.notified().await;
        }

        if let Some(err) = self
            .inner
            .failures
            .lock()
            .get_mut(&operation)
            .and_then(VecDeque::pop_front)
        {
            return Err(err);
        }

        match self.inner.persistent_failures.lock().get(&operation) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentityProvider {
    async fn current_account(&self) -> Result<AccountSnapshot, AuthError> {
        self.enter(Call::CurrentAccount).await?;
        Ok(self.inner.account.lock().clone())
    }

    async fn reauthenticate(&self, email: &str, password: &str) -> Result<(), AuthError> {
        self.enter(Call::Reauthenticate {
            email: email.to_string(),
            password: password.to_string(),
        })
        .await?;

        let account = self.inner.account.lock();
        if !account.has_password_credential
            || account.email != email
            || self.inner.password != password
        {
            return Err(AuthError::Credential);
        }
        Ok(())
    }

    async fn unlink_provider(&self, provider_id: &str) -> Result<(), AuthError> {
        self.enter(Call::UnlinkProvider(provider_id.to_string()))
            .await?;
        self.inner
            .account
            .lock()
            .linked_providers
            .retain(|id| id != provider_id);
        Ok(())
    }

    async fn send_verification_for_email_change(&self, new_email: &str) -> Result<(), AuthError> {
        self.enter(Call::SendVerification(new_email.to_string()))
            .await?;
        if self.inner.taken_emails.lock().contains(new_email) {
            return Err(AuthError::Conflict);
        }
        Ok(())
    }

    async fn check_email_available(&self, email: &str) -> Result<bool, AuthError> {
        self.enter(Call::CheckEmailAvailable(email.to_string()))
            .await?;
        Ok(!self.inner.taken_emails.lock().contains(email))
    }

    async fn refresh_account(&self) -> Result<RefreshedAccount, AuthError> {
        self.enter(Call::RefreshAccount).await?;
        Ok(RefreshedAccount {
            email: self.inner.account.lock().email.clone(),
        })
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.enter(Call::SignOut).await
    }
}
