//! Sliding-window restart-intensity accounting.
//!
//! A `VecDeque<DateTime<Utc>>` sliding window per child or per parent: each
//! restart event is pushed, entries older than the window are evicted, and
//! the remaining count is compared against the ceiling. This is a pure
//! count-within-window test, not an exponential backoff delay — a restart
//! event is charged and the only question is whether the ceiling was
//! exceeded, never how long to wait before retrying.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};

/// Per-child or parent-wide ring of recent restart timestamps.
#[derive(Debug, Clone, Default)]
pub struct RestartRing {
    history: VecDeque<DateTime<Utc>>,
}

impl RestartRing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a restart event at `now` and evicts entries older than
    /// `window` relative to `now`, then reports whether the count within
    /// the window exceeds `max` (`None` meaning `infinity`, i.e. never
    /// exceeded).
    pub fn record_and_check(&mut self, now: DateTime<Utc>, window: Duration, max: Option<u32>) -> bool {
        self.history.push_back(now);
        let cutoff = now - chrono::Duration::from_std(window).unwrap_or(chrono::Duration::zero());
        while let Some(front) = self.history.front() {
            if *front < cutoff {
                self.history.pop_front();
            } else {
                break;
            }
        }
        match max {
            None => false,
            Some(max) => self.history.len() as u32 > max,
        }
    }

    pub fn count(&self) -> usize {
        self.history.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exceeds_after_max_restarts_within_window() {
        let mut ring = RestartRing::new();
        let window = Duration::from_secs(5);
        let t0 = Utc::now();
        assert!(!ring.record_and_check(t0, window, Some(2)));
        assert!(!ring.record_and_check(t0, window, Some(2)));
        assert!(ring.record_and_check(t0, window, Some(2)));
    }

    #[test]
    fn infinity_never_exceeds() {
        let mut ring = RestartRing::new();
        let window = Duration::from_secs(5);
        let t0 = Utc::now();
        for _ in 0..50 {
            assert!(!ring.record_and_check(t0, window, None));
        }
    }

    #[test]
    fn events_outside_window_are_evicted() {
        let mut ring = RestartRing::new();
        let window = Duration::from_secs(5);
        let t0 = Utc::now();
        assert!(!ring.record_and_check(t0, window, Some(1)));
        let later = t0 + chrono::Duration::seconds(10);
        assert!(!ring.record_and_check(later, window, Some(1)));
    }
}
