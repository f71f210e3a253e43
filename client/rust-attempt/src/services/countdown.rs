use chrono::{DateTime, Utc};

use crate::utils::time::elapsed_seconds_since;

/// Remaining seconds of an attempt, counted down locally once per tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Countdown {
    remaining_seconds: u32,
    low_time_threshold_seconds: u32,
}

impl Countdown {
    pub fn new(remaining_seconds: u32, low_time_threshold_seconds: u32) -> Self {
        Self {
            remaining_seconds,
            low_time_threshold_seconds,
        }
    }

    /// Reconciles the server-authoritative duration with wall-clock time.
    pub fn from_server(
        duration_minutes: i64,
        started_at: &str,
        now: DateTime<Utc>,
        low_time_threshold_seconds: u32,
    ) -> Self {
        Self::new(
            remaining_seconds(duration_minutes, started_at, now),
            low_time_threshold_seconds,
        )
    }

    pub fn remaining_seconds(&self) -> u32 {
        self.remaining_seconds
    }

    pub fn is_expired(&self) -> bool {
        self.remaining_seconds == 0
    }

    pub fn is_urgent(&self) -> bool {
        self.remaining_seconds < self.low_time_threshold_seconds
    }

    /// Advances one second, never below zero. Returns whether time is up.
    pub fn tick(&mut self) -> bool {
        self.remaining_seconds = self.remaining_seconds.saturating_sub(1);
        self.is_expired()
    }

    pub fn display(&self) -> String {
        format_hms(self.remaining_seconds)
    }
}

/// `max(max(duration, 1) * 60 - elapsed, 0)` in seconds.
pub fn remaining_seconds(duration_minutes: i64, started_at: &str, now: DateTime<Utc>) -> u32 {
    let total = duration_minutes.max(1).saturating_mul(60);
    let elapsed = i64::try_from(elapsed_seconds_since(started_at, now)).unwrap_or(i64::MAX);
    let remaining = total.saturating_sub(elapsed).max(0);
    u32::try_from(remaining).unwrap_or(u32::MAX)
}

/// `HH:MM:SS`, zero padded; hours are not wrapped.
pub fn format_hms(seconds: u32) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, secs)
}
