//! Account data as reported by the identity provider

use serde::{Deserialize, Serialize};

/// The signed-in account at the time an email change session starts
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct AccountSnapshot {
    /// The email address currently associated with the account
    pub email: String,
    /// Whether the account can re-authenticate with a password.
    /// Federated-only accounts (e.g. "sign in with Google") can't.
    pub has_password_credential: bool,
    /// Identifiers of federated sign-in providers linked to this account
    #[serde(default)]
    pub linked_providers: Vec<String>,
}

/// Account state after asking the provider to reload it
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct RefreshedAccount {
    /// The email address the provider now reports as active
    pub email: String,
}
