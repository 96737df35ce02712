//! Local checks run before a submission ever reaches the identity provider

use crate::error::ErrorKind;
use std::str::FromStr;
use validator::{Validate, ValidationErrors};

/// A syntactically valid email address (`local@domain`, no whitespace).
#[derive(Clone, Debug, PartialEq, Eq, Validate)]
pub struct EmailAddress {
    #[validate(email)]
    inner: String,
}

impl FromStr for EmailAddress {
    type Err = ValidationErrors;

    fn from_str(s: &str) -> Result<Self, ValidationErrors> {
        let email = Self {
            inner: s.to_string(),
        };
        email.validate()?;
        Ok(email)
    }
}

impl EmailAddress {
    /// Get a string reference of this address
    pub fn as_str(&self) -> &str {
        self.inner.as_str()
    }
}

impl AsRef<str> for EmailAddress {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl std::fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.as_str().fmt(f)
    }
}

/// Check a submission.
///
/// Emails are compared case-sensitively, without any normalization.
pub fn validate_submission(
    current_email: &str,
    candidate_email: &str,
    password: &str,
    password_required: bool,
) -> Result<EmailAddress, ErrorKind> {
    let candidate = candidate_email
        .parse::<EmailAddress>()
        .map_err(|_| ErrorKind::InvalidEmailFormat)?;

    if candidate.as_str() == current_email {
        return Err(ErrorKind::EmailNotDifferent);
    }

    if password_required && password.is_empty() {
        return Err(ErrorKind::PasswordRequired);
    }

    Ok(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_valid_addresses() {
        assert_matches!("b@x.com".parse::<EmailAddress>(), Ok(_));
        assert_matches!("first.last+tag@example.test".parse::<EmailAddress>(), Ok(_));
    }

    #[test]
    fn test_invalid_addresses() {
        assert_matches!("".parse::<EmailAddress>(), Err(_));
        assert_matches!("no-at-sign.com".parse::<EmailAddress>(), Err(_));
        assert_matches!("missing-domain@".parse::<EmailAddress>(), Err(_));
        assert_matches!("@missing-local.com".parse::<EmailAddress>(), Err(_));
        assert_matches!("has space@x.com".parse::<EmailAddress>(), Err(_));
        assert_matches!("a@x .com".parse::<EmailAddress>(), Err(_));
        assert_matches!(" a@x.com".parse::<EmailAddress>(), Err(_));
    }

    #[test]
    fn test_syntax_is_checked_first() {
        assert_eq!(
            validate_submission("a@x.com", "not an email", "", true),
            Err(ErrorKind::InvalidEmailFormat)
        );
    }

    #[test]
    fn test_same_email_rejected_regardless_of_password() {
        assert_eq!(
            validate_submission("a@x.com", "a@x.com", "secret123", true),
            Err(ErrorKind::EmailNotDifferent)
        );
        assert_eq!(
            validate_submission("a@x.com", "a@x.com", "", true),
            Err(ErrorKind::EmailNotDifferent)
        );
    }

    #[test]
    fn test_comparison_is_case_sensitive() {
        assert_matches!(validate_submission("a@x.com", "A@x.com", "pw", true), Ok(_));
    }

    #[test]
    fn test_password_required_only_for_password_accounts() {
        assert_eq!(
            validate_submission("a@x.com", "b@x.com", "", true),
            Err(ErrorKind::PasswordRequired)
        );
        assert_matches!(validate_submission("a@x.com", "b@x.com", "", false), Ok(_));
    }
}
