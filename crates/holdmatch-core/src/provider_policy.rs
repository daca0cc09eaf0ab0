use std::time::Duration;

/// Request budget for one upstream source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderPolicy {
    /// Requests in flight at once.
    pub max_concurrency: usize,
    pub quota_window: Duration,
    /// Requests allowed per `quota_window`.
    pub quota_limit: u32,
}

impl ProviderPolicy {
    /// EODHD allows 1000 requests per minute on paid plans; stay well under.
    pub fn eodhd_default() -> Self {
        Self {
            max_concurrency: 5,
            quota_window: Duration::from_secs(60),
            quota_limit: 600,
        }
    }

    /// One page at a time, a few pages per second.
    pub fn portfolio_default() -> Self {
        Self {
            max_concurrency: 1,
            quota_window: Duration::from_secs(1),
            quota_limit: 4,
        }
    }

    /// No effective limit; used by tests and offline fixtures.
    pub fn unthrottled() -> Self {
        Self {
            max_concurrency: 64,
            quota_window: Duration::from_millis(1),
            quota_limit: 1_000,
        }
    }
}
