//! # Per-item Exponential Backoff
//!
//! Delay before a failed key is requeued. The delay doubles with each
//! consecutive failure of the same key, starting at `base` and capped at `max`.
//! Failure counts live in the [`ReconcileLoop`](crate::ReconcileLoop); this
//! type is the stateless calculator.

use std::time::Duration;

/// Default first retry delay
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(5);

/// Default upper bound for retry delays
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(1000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemBackoff {
    base: Duration,
    max: Duration,
}

impl ItemBackoff {
    /// Create a backoff starting at `base` and never exceeding `max`
    #[must_use]
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    /// Delay for a key that has already failed `failures` times.
    ///
    /// `base * 2^failures`, saturating at `max` on overflow.
    #[must_use]
    pub fn delay(&self, failures: u32) -> Duration {
        2u32.checked_pow(failures)
            .and_then(|factor| self.base.checked_mul(factor))
            .map_or(self.max, |delay| delay.min(self.max))
    }
}

impl Default for ItemBackoff {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY)
    }
}
