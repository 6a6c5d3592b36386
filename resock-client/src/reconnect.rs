//! Reconnection schedule
//!
//! A [`ReconnectionStrategy`] answers one question for the reconnect state
//! machine: how long to wait after attempt number `n`, or whether to give up.
//! The channel opens a fresh transport, waits that long, and checks whether
//! the transport came up.
//!
//! [`ExponentialBackoff`] is the default schedule: the first wait is the
//! initial delay, each following wait doubles, and no wait exceeds the cap.
//! With the defaults (2 s initial, 5 s cap, 10 attempts) the waits are
//! `2s, 4s, 5s, 5s, ...`.
//!
//! # Examples
//!
//! ```rust
//! use resock_client::{ExponentialBackoff, ReconnectionStrategy};
//! use std::time::Duration;
//!
//! let mut backoff = ExponentialBackoff::new(Duration::from_secs(2), Duration::from_secs(5))
//!     .with_max_attempts(3);
//!
//! assert_eq!(backoff.next_delay(0), Some(Duration::from_secs(2)));
//! assert_eq!(backoff.next_delay(1), Some(Duration::from_secs(4)));
//! assert_eq!(backoff.next_delay(2), Some(Duration::from_secs(5)));
//! assert_eq!(backoff.next_delay(3), None);
//! ```

use std::time::Duration;

/// Default delay before the first reconnect check
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(2000);
/// Default upper bound on the delay between checks
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(5000);
/// Default number of attempts in one reconnect sequence
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Delay schedule for a reconnect sequence
pub trait ReconnectionStrategy: Send + Sync {
    /// Delay to wait after opening attempt number `attempt` (0-indexed)
    ///
    /// `None` means the budget is spent and the sequence must fail.
    fn next_delay(&mut self, attempt: u32) -> Option<Duration>;

    /// Called when a new sequence starts
    fn reset(&mut self);
}

/// Doubling delay with a cap and an optional attempt budget
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial_delay: Duration,
    max_delay: Duration,
    max_attempts: Option<u32>,
    jitter: bool,
}

impl ExponentialBackoff {
    /// Unlimited attempts between `initial_delay` and `max_delay`
    pub fn new(initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            initial_delay,
            max_delay,
            max_attempts: None,
            jitter: false,
        }
    }

    /// Give up after `max_attempts` attempts; `0` fails immediately
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Retry forever
    pub fn unlimited(mut self) -> Self {
        self.max_attempts = None;
        self
    }

    /// Add up to 25% random extra delay to each wait
    pub fn with_jitter(mut self) -> Self {
        self.jitter = true;
        self
    }

    /// Delay before the first check
    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    /// Upper bound on the delay
    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Attempt budget, `None` for unlimited
    pub fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }

    fn base_delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return self.initial_delay;
        }

        let initial_ms = self.initial_delay.as_millis() as u64;
        let max_ms = self.max_delay.as_millis() as u64;
        let factor = 2u64.checked_pow(attempt).unwrap_or(u64::MAX);

        Duration::from_millis(initial_ms.saturating_mul(factor).min(max_ms))
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(DEFAULT_INITIAL_DELAY, DEFAULT_MAX_DELAY).with_max_attempts(DEFAULT_MAX_ATTEMPTS)
    }
}

impl ReconnectionStrategy for ExponentialBackoff {
    fn next_delay(&mut self, attempt: u32) -> Option<Duration> {
        if let Some(max) = self.max_attempts {
            if attempt >= max {
                return None;
            }
        }

        let delay = self.base_delay(attempt);

        if self.jitter {
            use rand::Rng;
            let delay_ms = delay.as_millis() as u64;
            let jitter_ms = rand::thread_rng().gen_range(0..=(delay_ms / 4));
            return Some(Duration::from_millis(delay_ms + jitter_ms));
        }

        Some(delay)
    }

    /// The schedule depends only on the attempt index
    fn reset(&mut self) {}
}
