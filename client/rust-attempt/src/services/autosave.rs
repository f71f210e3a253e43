use std::time::Duration;
use tokio::time::Instant;

/// Debounce state for background answer saves.
///
/// Each `arm` pushes the deadline out by the debounce window, so a burst of
/// answer changes produces a single save once the student pauses.
#[derive(Debug, Clone)]
pub struct AutosaveScheduler {
    debounce: Duration,
    deadline: Option<Instant>,
}

impl AutosaveScheduler {
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            deadline: None,
        }
    }

    pub fn arm(&mut self, now: Instant) {
        self.deadline = Some(now + self.debounce);
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Consumes the pending save if its quiet period has passed.
    pub fn take_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    /// Drops the pending deadline so the caller can save immediately.
    /// Returns whether a save was pending.
    pub fn fire_now(&mut self) -> bool {
        self.deadline.take().is_some()
    }
}
