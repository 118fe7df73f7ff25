//! Flat retry delay used between subscription attempts.
//!
//! Every failure category waits the same interval; there is no attempt cap
//! and no growth factor.

use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedBackoff {
    delay: Duration,
}

impl FixedBackoff {
    pub const fn new(delay: Duration) -> Self {
        Self { delay }
    }

    #[inline]
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Sleep for the configured delay.
    ///
    /// Returns `false` if `cancel` fired first, in which case no retry should
    /// be scheduled.
    pub async fn wait(&self, cancel: &CancellationToken) -> bool {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            _ = sleep(self.delay) => true,
        }
    }
}
