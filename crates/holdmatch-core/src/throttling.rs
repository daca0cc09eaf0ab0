use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::provider_policy::ProviderPolicy;

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Gate every upstream request passes through: a concurrency cap plus a
/// rate quota.
#[derive(Clone)]
pub struct ThrottlingQueue {
    limiter: Arc<DirectRateLimiter>,
    slots: Arc<Semaphore>,
}

/// Held for the duration of one request; dropping it frees the slot.
#[derive(Debug)]
pub struct ThrottlePermit {
    _slot: Option<OwnedSemaphorePermit>,
}

impl ThrottlingQueue {
    pub fn new(quota_window: Duration, quota_limit: u32, max_concurrency: usize) -> Self {
        Self {
            limiter: Arc::new(RateLimiter::direct(quota_from_window(
                quota_window,
                quota_limit,
            ))),
            slots: Arc::new(Semaphore::new(max_concurrency.max(1))),
        }
    }

    pub fn from_policy(policy: &ProviderPolicy) -> Self {
        Self::new(policy.quota_window, policy.quota_limit, policy.max_concurrency)
    }

    /// Waits for a free slot, then for rate budget.
    pub async fn acquire(&self) -> ThrottlePermit {
        // The semaphore is never closed, so acquisition only fails if that
        // invariant breaks; proceed unslotted rather than stall.
        let slot = Arc::clone(&self.slots).acquire_owned().await.ok();
        self.limiter.until_ready().await;
        ThrottlePermit { _slot: slot }
    }

    /// Non-blocking budget probe.
    pub fn try_acquire(&self) -> bool {
        self.limiter.check().is_ok()
    }

    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }
}

impl std::fmt::Debug for ThrottlingQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThrottlingQueue")
            .field("available_slots", &self.available_slots())
            .finish_non_exhaustive()
    }
}

fn quota_from_window(quota_window: Duration, quota_limit: u32) -> Quota {
    let burst = NonZeroU32::new(quota_limit).unwrap_or(NonZeroU32::MIN);
    let seconds_per_cell = (quota_window.as_secs_f64() / f64::from(burst.get())).max(0.000_001);

    Quota::with_period(Duration::from_secs_f64(seconds_per_cell))
        .unwrap_or_else(|| Quota::per_second(burst))
        .allow_burst(burst)
}
