use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};
use tracing::debug;

use crate::provider_policy::{ProviderPolicy, QuotaWindow};
use crate::ProviderId;

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Outbound quota gate for providers with a hard upstream call ceiling.
///
/// Unlike the orchestrator's budget this never refuses: [`acquire`](Self::acquire)
/// suspends until every window has capacity.
#[derive(Clone)]
pub struct RequestQuota {
    provider: ProviderId,
    limiters: Arc<Vec<DirectRateLimiter>>,
}

impl RequestQuota {
    pub fn new(provider: ProviderId, windows: &[QuotaWindow]) -> Self {
        let limiters = windows
            .iter()
            .map(|window| RateLimiter::direct(quota_from_window(window.window, window.limit)))
            .collect();
        Self {
            provider,
            limiters: Arc::new(limiters),
        }
    }

    pub fn from_policy(policy: &ProviderPolicy) -> Self {
        Self::new(policy.provider_id, &policy.quotas)
    }

    /// Waits until a call may be sent.
    pub async fn acquire(&self) {
        for limiter in self.limiters.iter() {
            if limiter.check().is_err() {
                debug!(provider = %self.provider, "hard quota reached, waiting for capacity");
                limiter.until_ready().await;
            }
        }
    }

    /// Takes a slot only when every window has room right now.
    pub fn try_acquire(&self) -> bool {
        self.limiters.iter().all(|limiter| limiter.check().is_ok())
    }
}

fn quota_from_window(quota_window: Duration, quota_limit: u32) -> Quota {
    let burst = NonZeroU32::new(quota_limit).unwrap_or(NonZeroU32::MIN);

    let seconds_per_cell = (quota_window.as_secs_f64() / f64::from(burst.get())).max(0.001);
    let period = Duration::from_secs_f64(seconds_per_cell);

    Quota::with_period(period)
        .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN))
        .allow_burst(burst)
}
