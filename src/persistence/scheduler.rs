use std::time::{Duration, Instant};

/// Debounces automatic saves into a single trailing save.
///
/// Every request moves the deadline to `now + interval`, so a burst of requests fires once, one
/// interval after the last of them. Time is passed in by the caller.
#[derive(Debug, Clone)]
pub struct SaveScheduler {
  interval: Duration,
  deadline: Option<Instant>,
}

impl SaveScheduler {
  #[must_use]
  pub fn new(interval: Duration) -> Self {
    Self {
      interval,
      deadline: None,
    }
  }

  #[must_use]
  pub fn interval(&self) -> Duration {
    self.interval
  }

  #[must_use]
  pub fn deadline(&self) -> Option<Instant> {
    self.deadline
  }

  /// Arms the timer, replacing any pending deadline.
  pub fn request(&mut self, now: Instant) {
    self.deadline = Some(now + self.interval);
  }

  /// Whether the pending save is due. A due save is consumed.
  pub fn take_due(&mut self, now: Instant) -> bool {
    if self.deadline.is_some_and(|deadline| now >= deadline) {
      self.deadline = None;
      true
    } else {
      false
    }
  }

  pub fn cancel(&mut self) {
    self.deadline = None;
  }
}
