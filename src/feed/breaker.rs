//! Per-feed failure counting.
//!
//! A feed whose error count exceeds the threshold stays disabled until the
//! process restarts. There is no recovery path and no reset.

use tracing::warn;

use crate::feed::types::{FeedConfig, DEFAULT_MAX_FEED_ERRORS};

/// Result of recording one failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Failure counted; the feed keeps being polled.
    Counted(u32),
    /// This failure pushed the feed over the threshold.
    Tripped(u32),
}

/// Disables feeds after too many processing failures.
#[derive(Debug, Clone, Copy)]
pub struct ErrorCircuitBreaker {
    threshold: u32,
}

impl ErrorCircuitBreaker {
    pub fn new(threshold: u32) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Count a failure for `feed`.
    ///
    /// Returns [`BreakerState::Tripped`] only for the failure that crosses
    /// the threshold; later failures on an already tripped feed are still
    /// counted but reported as [`BreakerState::Counted`].
    pub fn record_failure(&self, feed: &mut FeedConfig) -> BreakerState {
        let was_tripped = self.is_tripped(feed);
        feed.error_count = feed.error_count.saturating_add(1);

        if !was_tripped && self.is_tripped(feed) {
            warn!(
                "{}: disabled after {} errors, will not be polled again until restart",
                feed.title, feed.error_count
            );
            BreakerState::Tripped(feed.error_count)
        } else {
            BreakerState::Counted(feed.error_count)
        }
    }

    /// Whether `feed` has exceeded the threshold.
    pub fn is_tripped(&self, feed: &FeedConfig) -> bool {
        feed.error_count > self.threshold
    }
}

impl Default for ErrorCircuitBreaker {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FEED_ERRORS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed() -> FeedConfig {
        FeedConfig::new("Show", "https://example.com/feed.xml", 1)
    }

    #[test]
    fn test_default_threshold() {
        assert_eq!(ErrorCircuitBreaker::default().threshold(), DEFAULT_MAX_FEED_ERRORS);
    }

    #[test]
    fn test_trips_only_after_exceeding_threshold() {
        let breaker = ErrorCircuitBreaker::new(3);
        let mut feed = feed();

        for expected in 1..=3 {
            assert_eq!(
                breaker.record_failure(&mut feed),
                BreakerState::Counted(expected)
            );
            assert!(!breaker.is_tripped(&feed));
        }

        assert_eq!(breaker.record_failure(&mut feed), BreakerState::Tripped(4));
        assert!(breaker.is_tripped(&feed));
    }

    #[test]
    fn test_tripped_is_reported_once() {
        let breaker = ErrorCircuitBreaker::new(0);
        let mut feed = feed();
        assert_eq!(breaker.record_failure(&mut feed), BreakerState::Tripped(1));
        assert_eq!(breaker.record_failure(&mut feed), BreakerState::Counted(2));
        assert!(breaker.is_tripped(&feed));
    }

    #[test]
    fn test_error_count_never_decreases() {
        let breaker = ErrorCircuitBreaker::new(2);
        let mut feed = feed();
        let mut last = feed.error_count;
        for _ in 0..6 {
            breaker.record_failure(&mut feed);
            assert!(feed.error_count > last);
            last = feed.error_count;
        }
    }
}
