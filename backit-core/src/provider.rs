//! The identity provider capability the flow is built against

use crate::{
    account::{AccountSnapshot, RefreshedAccount},
    error::AuthError,
};
use async_trait::async_trait;

/// Provides the identity operations the email change flow needs.
/// Abstracted away, so you can plug in a real backend client
/// or an in-memory fake for tests.
#[async_trait]
pub trait IdentityProvider: Send + Sync + 'static {
    /// Look up the currently signed-in account
    async fn current_account(&self) -> Result<AccountSnapshot, AuthError>;

    /// Re-validate the user's password credential
    async fn reauthenticate(&self, email: &str, password: &str) -> Result<(), AuthError>;

    /// Detach a federated sign-in provider from the account
    async fn unlink_provider(&self, provider_id: &str) -> Result<(), AuthError>;

    /// Send a verification link to `new_email`.
    /// The account email only changes once that link is used.
    async fn send_verification_for_email_change(&self, new_email: &str) -> Result<(), AuthError>;

    /// Whether `email` is still free to be used
    async fn check_email_available(&self, email: &str) -> Result<bool, AuthError>;

    /// Reload the account from the provider
    async fn refresh_account(&self) -> Result<RefreshedAccount, AuthError>;

    /// End the current session
    async fn sign_out(&self) -> Result<(), AuthError>;
}
