//! Error types for the email change flow

use crate::session::SessionState;
use serde::{Deserialize, Serialize};

///////////
// TYPES //
///////////

/// Failures reported by the identity provider
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// The supplied credential was rejected (wrong password, expired session)
    #[error("The supplied credentials were rejected")]
    Credential,

    /// The email address is already registered with another account
    #[error("The email address is already in use")]
    Conflict,

    /// The provider couldn't be reached
    #[error("Network error: {0}")]
    Network(String),

    /// Anything else the provider reported
    #[error("Identity provider error: {0}")]
    Unknown(String),
}

/// The most recent recoverable failure of a session, as shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The new address isn't a syntactically valid email address
    InvalidEmailFormat,
    /// The new address is the same as the current one
    EmailNotDifferent,
    /// A password is needed to re-authenticate, but none was given
    PasswordRequired,
    /// Re-authentication failed
    IncorrectPassword,
    /// The new address belongs to another account
    EmailAlreadyInUse,
    /// The identity provider couldn't be reached
    NetworkError,
    /// Any other provider failure
    Unknown,
}

/// Input fields of the email change form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Field {
    /// The new email address
    Email,
    /// The account password
    Password,
}

/// Outcome of a rejected or failed flow command
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FlowError {
    /// The command isn't accepted in the session's current state
    #[error("Can't {command} while the session is {state}")]
    NotAllowed {
        /// The command that was issued
        command: &'static str,
        /// The state the session was in
        state: SessionState,
    },

    /// The command failed and the session recorded this as its last error
    #[error("{}", .0.message())]
    Rejected(ErrorKind),

    /// A provider call failed outside of the submit transition
    #[error(transparent)]
    Provider(#[from] AuthError),
}

/// Outcome of a best-effort step that must never abort its transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SideEffect {
    /// The step ran and succeeded
    Applied,
    /// The step wasn't needed
    Skipped,
    /// The step failed, the failure was logged and otherwise ignored
    NonFatal(AuthError),
}

/////////////////////
// IMPLEMENTATIONS //
/////////////////////

impl ErrorKind {
    /// A short human-readable message for this error
    pub fn message(&self) -> &'static str {
        match self {
            ErrorKind::InvalidEmailFormat => "Please enter a valid email address.",
            ErrorKind::EmailNotDifferent => {
                "The new email address must be different from your current one."
            }
            ErrorKind::PasswordRequired => "Please enter your password.",
            ErrorKind::IncorrectPassword => "The password is incorrect.",
            ErrorKind::EmailAlreadyInUse => "This email address is already in use.",
            ErrorKind::NetworkError => "Network error. Please check your connection.",
            ErrorKind::Unknown => "Something went wrong. Please try again.",
        }
    }

    /// The form field that should be marked invalid, if any
    pub fn invalid_field(&self) -> Option<Field> {
        match self {
            ErrorKind::IncorrectPassword => Some(Field::Password),
            ErrorKind::EmailAlreadyInUse => Some(Field::Email),
            _ => None,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

impl From<&AuthError> for ErrorKind {
    fn from(err: &AuthError) -> Self {
        match err {
            AuthError::Credential => ErrorKind::IncorrectPassword,
            AuthError::Conflict => ErrorKind::EmailAlreadyInUse,
            AuthError::Network(_) => ErrorKind::NetworkError,
            AuthError::Unknown(_) => ErrorKind::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_errors_map_to_error_kinds() {
        assert_eq!(
            ErrorKind::from(&AuthError::Credential),
            ErrorKind::IncorrectPassword
        );
        assert_eq!(
            ErrorKind::from(&AuthError::Conflict),
            ErrorKind::EmailAlreadyInUse
        );
        assert_eq!(
            ErrorKind::from(&AuthError::Network("timeout".into())),
            ErrorKind::NetworkError
        );
        assert_eq!(
            ErrorKind::from(&AuthError::Unknown("teapot".into())),
            ErrorKind::Unknown
        );
    }

    #[test]
    fn test_invalid_field_marks() {
        assert_eq!(
            ErrorKind::IncorrectPassword.invalid_field(),
            Some(Field::Password)
        );
        assert_eq!(
            ErrorKind::EmailAlreadyInUse.invalid_field(),
            Some(Field::Email)
        );
        assert_eq!(ErrorKind::InvalidEmailFormat.invalid_field(), None);
        assert_eq!(ErrorKind::NetworkError.invalid_field(), None);
    }

    #[test]
    fn test_rejected_displays_message() {
        let err = FlowError::Rejected(ErrorKind::EmailNotDifferent);
        assert_eq!(
            err.to_string(),
            "The new email address must be different from your current one."
        );
    }
}
