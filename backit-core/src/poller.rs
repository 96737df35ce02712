//! Background task that waits for the provider to report the new address

use crate::{
    provider::IdentityProvider,
    session::{SessionState, SharedSession, VerificationStatus},
};
use std::{sync::Arc, time::Duration};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Spawn a poller for a session that just entered `AwaitingVerification`.
///
/// The poller runs until `token` is cancelled or it observes the candidate
/// address as the account's email. Refresh failures are logged and retried
/// on the next tick.
pub(crate) fn spawn<P: IdentityProvider>(
    provider: Arc<P>,
    shared: Arc<SharedSession>,
    period: Duration,
    token: CancellationToken,
) {
    tokio::spawn(async move {
        // First refresh one period after the link was sent
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = interval.tick() => {},
            }

            tracing::debug!("Checking whether the new email address was verified");

            let refreshed = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                refreshed = provider.refresh_account() => refreshed,
            };

            let account = match refreshed {
                Ok(account) => account,
                Err(e) => {
                    tracing::warn!(%e, "Refreshing the account failed, retrying on next tick");
                    continue;
                }
            };

            let finished = {
                let mut session = shared.lock();

                if token.is_cancelled() || session.state != SessionState::AwaitingVerification {
                    true
                } else if let Some(VerificationStatus::Verified) = session.observe_refresh(&account)
                {
                    tracing::info!(email = %account.email, "New email address verified");
                    shared.publish(&session);
                    true
                } else {
                    false
                }
            };

            if finished {
                break;
            }
        }

        tracing::debug!("Verification poller stopped");
    });
}
