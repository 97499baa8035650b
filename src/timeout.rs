//! Wall-clock deadlines for build tool invocations
//!
//! A [`Deadline`] only reports whether its budget is spent. Stopping the
//! subprocess is left to the caller.

use std::time::{Duration, Instant};

/// Deadline check result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadlineStatus {
    /// Still within budget
    Ok,
    /// Budget exceeded
    Expired,
}

impl DeadlineStatus {
    pub fn is_expired(&self) -> bool {
        matches!(self, DeadlineStatus::Expired)
    }
}

/// Wall-clock budget for one subprocess.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    limit: Duration,
    start_time: Instant,
}

impl Deadline {
    /// Start a deadline that expires `limit` from now.
    pub fn new(limit: Duration) -> Self {
        Self {
            limit,
            start_time: Instant::now(),
        }
    }

    pub fn limit(&self) -> Duration {
        self.limit
    }

    pub fn check(&self) -> DeadlineStatus {
        if self.start_time.elapsed() > self.limit {
            DeadlineStatus::Expired
        } else {
            DeadlineStatus::Ok
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Time left before expiry, zero once expired.
    pub fn remaining(&self) -> Duration {
        self.limit.saturating_sub(self.start_time.elapsed())
    }

    /// Poll interval bounded by the remaining budget.
    pub fn next_wait(&self, max: Duration) -> Duration {
        let remaining = self.remaining();
        if remaining.is_zero() {
            Duration::from_millis(1)
        } else {
            remaining.min(max)
        }
    }
}
