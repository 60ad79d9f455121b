//! Loop configuration

use crate::backoff::{DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY, ItemBackoff};
use std::time::Duration;

/// Retries granted to a failing key before it is dropped
pub const DEFAULT_MAX_RETRIES: u32 = 1;

/// Retry policy of a [`ReconcileLoop`](crate::ReconcileLoop)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopConfig {
    /// Requeues allowed after the first failure
    pub max_retries: u32,
    /// Delay before the first requeue, doubled on each further failure
    pub base_delay: Duration,
    /// Upper bound of the requeue delay
    pub max_delay: Duration,
}

impl LoopConfig {
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    #[must_use]
    pub fn with_delays(mut self, base_delay: Duration, max_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self.max_delay = max_delay;
        self
    }

    #[must_use]
    pub fn backoff(&self) -> ItemBackoff {
        ItemBackoff::new(self.base_delay, self.max_delay)
    }
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}
