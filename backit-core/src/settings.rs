//! Flow settings

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables of the email change flow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowSettings {
    /// How often to ask the provider whether the new address was verified
    pub poll_interval_ms: u64,
    /// Federated provider to unlink after re-authenticating, e.g. "google.com"
    pub unlink_provider: Option<String>,
    /// Whether to ask the provider if the new address is still free before submitting
    pub check_email_availability: bool,
    /// Whether finalizing the flow signs the user out
    pub sign_out_after_verification: bool,
}

impl Default for FlowSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 3000,
            unlink_provider: Some("google.com".to_string()),
            check_email_availability: true,
            sign_out_after_verification: true,
        }
    }
}

impl FlowSettings {
    /// The polling interval as a [Duration]. Never zero.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}
