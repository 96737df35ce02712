//! Request and response bodies exchanged with the identity backend

use serde::{Deserialize, Serialize};

/// Re-authentication request
#[derive(Serialize, Deserialize)]
pub struct ReauthenticateRequest {
    /// The account's current email address
    pub email: String,
    /// The account password
    pub password: String,
}

impl std::fmt::Debug for ReauthenticateRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReauthenticateRequest")
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

/// Request to send a verification link for an email change
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct EmailChangeRequest {
    /// The address to verify and switch to
    pub email: String,
}

/// Response to an email availability check
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AvailabilityResponse {
    /// Whether the address is still free
    pub available: bool,
}

/// Error in JSON API response format.
#[derive(Serialize, Deserialize, Debug)]
pub struct ErrorResponse {
    pub errors: Vec<ErrorObject>,
}

/// A single [JSONAPI error object](https://jsonapi.org/examples/#error-objects).
#[derive(Serialize, Deserialize, Debug)]
pub struct ErrorObject {
    pub status: u16,
    pub detail: Option<String>,
    pub title: Option<String>,
}

impl ErrorResponse {
    /// Join the most descriptive part of each error object
    pub fn describe(&self) -> Option<String> {
        let parts = self
            .errors
            .iter()
            .filter_map(|e| e.detail.as_ref().or(e.title.as_ref()))
            .map(String::as_str)
            .collect::<Vec<_>>();

        if parts.is_empty() {
            None
        } else {
            Some(parts.join(", "))
        }
    }
}
