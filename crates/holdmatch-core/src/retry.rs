//! Retry schedule for outbound HTTP calls.

use std::time::Duration;

/// Delay schedule between attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    Fixed(Duration),
    /// `base * 2^attempt`, capped at `max`, optionally spread ±50%.
    Doubling {
        base: Duration,
        max: Duration,
        jitter: bool,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Doubling {
            base: Duration::from_millis(250),
            max: Duration::from_secs(4),
            jitter: true,
        }
    }
}

impl Backoff {
    /// Delay before retry number `attempt` (0-based).
    pub fn delay(self, attempt: u32) -> Duration {
        match self {
            Self::Fixed(delay) => delay,
            Self::Doubling { base, max, jitter } => {
                let factor = 1_u32.checked_shl(attempt.min(16)).unwrap_or(u32::MAX);
                let delay = base.saturating_mul(factor).min(max);
                if !jitter {
                    return delay;
                }

                let millis = delay.as_millis() as u64;
                let spread = millis / 2;
                Duration::from_millis(millis - spread + fastrand::u64(0..=spread * 2))
            }
        }
    }
}

/// When and how often a request is retried.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub enabled: bool,
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub backoff: Backoff,
    pub retry_on_status: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: 3,
            backoff: Backoff::default(),
            retry_on_status: vec![408, 500, 502, 503, 504],
        }
    }
}

impl RetryConfig {
    pub fn fixed(delay: Duration, max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff: Backoff::Fixed(delay),
            ..Self::default()
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            max_retries: 0,
            ..Self::default()
        }
    }

    /// 429 is absent from the default list: rate limits surface to the caller
    /// as `RateLimited` instead of being absorbed here.
    pub fn should_retry_status(&self, status: u16) -> bool {
        self.enabled && self.retry_on_status.contains(&status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubling_without_jitter_caps_at_max() {
        let backoff = Backoff::Doubling {
            base: Duration::from_millis(100),
            max: Duration::from_millis(500),
            jitter: false,
        };

        assert_eq!(backoff.delay(0), Duration::from_millis(100));
        assert_eq!(backoff.delay(2), Duration::from_millis(400));
        assert_eq!(backoff.delay(3), Duration::from_millis(500));
        assert_eq!(backoff.delay(40), Duration::from_millis(500));
    }

    #[test]
    fn jitter_stays_within_half_either_side() {
        let backoff = Backoff::Doubling {
            base: Duration::from_millis(200),
            max: Duration::from_secs(1),
            jitter: true,
        };

        for _ in 0..50 {
            let delay = backoff.delay(0);
            assert!(delay >= Duration::from_millis(100) && delay <= Duration::from_millis(300));
        }
    }

    #[test]
    fn disabled_config_never_retries() {
        assert!(RetryConfig::default().should_retry_status(503));
        assert!(!RetryConfig::default().should_retry_status(429));
        assert!(!RetryConfig::disabled().should_retry_status(503));
    }
}
