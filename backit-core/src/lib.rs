#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_debug_implementations, missing_docs, rust_2018_idioms)]
#![deny(unreachable_pub)]

//! backit-core
//!
//! The email change verification flow of the backit client: a small state
//! machine that re-authenticates the user, asks the identity provider to send
//! a verification link to the new address and then polls until the provider
//! reports the new address as active.

pub mod account;
pub mod error;
pub mod flow;
pub mod poller;
pub mod provider;
pub mod session;
pub mod settings;
pub mod validation;

#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;

pub use error::{AuthError, ErrorKind, Field, FlowError};
pub use flow::EmailChangeFlow;
pub use provider::IdentityProvider;
pub use session::{SessionSnapshot, SessionState, VerificationStatus};
pub use settings::FlowSettings;
