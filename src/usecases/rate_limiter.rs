//! Sliding-window rate limiter for audit ingestion.
//!
//! One shared list of admission timestamps behind a lock. Entries older
//! than the window are pruned lazily on every `try_acquire`.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};

use crate::domain::clock::{Clock, SystemClock};

/// Upper bound on the admission log allocated up front.
const PREALLOCATE_MAX: usize = 4096;

pub struct SlidingWindowLimiter {
  max_events: usize,
  window: Duration,
  clock: Arc<dyn Clock>,
  admitted: Mutex<VecDeque<DateTime<Utc>>>,
}

impl SlidingWindowLimiter {
  /// Admit at most `max_per_second` events in any trailing second.
  pub fn per_second(max_per_second: usize) -> Self {
    Self {
      max_events: max_per_second,
      window: Duration::seconds(1),
      clock: Arc::new(SystemClock),
      admitted: Mutex::new(VecDeque::with_capacity(max_per_second.min(PREALLOCATE_MAX))),
    }
  }

  #[must_use]
  pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
    self.clock = clock;
    self
  }

  /// Record an admission if under the cap.
  pub fn try_acquire(&self) -> bool {
    let now = self.clock.now();
    let cutoff = now - self.window;
    let mut admitted = self.admitted.lock().unwrap_or_else(PoisonError::into_inner);
    while admitted.front().is_some_and(|t| *t <= cutoff) {
      admitted.pop_front();
    }
    if admitted.len() >= self.max_events {
      return false;
    }
    admitted.push_back(now);
    true
  }

  /// Admissions currently inside the window (without pruning).
  pub fn in_window(&self) -> usize {
    self.admitted.lock().unwrap_or_else(PoisonError::into_inner).len()
  }

  pub const fn capacity(&self) -> usize {
    self.max_events
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::clock::ManualClock;

  #[test]
  fn test_cap_then_window_slides() {
    let clock = Arc::new(ManualClock::default());
    let limiter = SlidingWindowLimiter::per_second(2).with_clock(clock.clone());
    assert!(limiter.try_acquire());
    clock.advance(Duration::milliseconds(400));
    assert!(limiter.try_acquire());
    assert!(!limiter.try_acquire());

    // first admission leaves the window
    clock.advance(Duration::milliseconds(600));
    assert!(limiter.try_acquire());
    assert!(!limiter.try_acquire());

    clock.advance(Duration::seconds(2));
    assert!(limiter.try_acquire());
    assert_eq!(limiter.in_window(), 1);
  }

  #[test]
  fn test_huge_cap_does_not_preallocate() {
    let limiter = SlidingWindowLimiter::per_second(usize::MAX);
    assert!(limiter.try_acquire());
    assert_eq!(limiter.in_window(), 1);
  }

  #[test]
  fn test_zero_cap_rejects_everything() {
    let limiter = SlidingWindowLimiter::per_second(0);
    assert!(!limiter.try_acquire());
  }
}
