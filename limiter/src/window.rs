use chrono::{DateTime, Duration, Utc};

const HOUR_MS: i64 = 60 * 60 * 1000;

/// Length of every quota window.
pub fn daily_window() -> Duration {
    Duration::hours(24)
}

/// When a window counts as elapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    /// Elapsed once its age is strictly greater than the window length.
    Exceeded,
    /// Elapsed as soon as its age reaches the window length.
    Reached,
}

/// A counter together with the instant its window opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaWindow {
    pub count: i64,
    pub started_at: DateTime<Utc>,
}

impl QuotaWindow {
    pub fn open(now: DateTime<Utc>) -> Self {
        Self {
            count: 0,
            started_at: now,
        }
    }

    fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        (now - self.started_at).max(Duration::zero())
    }

    pub fn is_stale(&self, now: DateTime<Utc>, length: Duration, boundary: Boundary) -> bool {
        let elapsed = self.elapsed(now);
        match boundary {
            Boundary::Exceeded => elapsed > length,
            Boundary::Reached => elapsed >= length,
        }
    }

    /// The window as it stands at `now`: unchanged while it is running, a fresh
    /// empty one once it has elapsed. The flag tells whether a reset happened.
    pub fn advance(self, now: DateTime<Utc>, length: Duration, boundary: Boundary) -> (Self, bool) {
        if self.is_stale(now, length, boundary) {
            (Self::open(now), true)
        } else {
            (self, false)
        }
    }

    /// Whole hours left until the window elapses, rounded up and never negative.
    pub fn hours_until_reset(&self, now: DateTime<Utc>, length: Duration) -> i64 {
        let remaining_ms = (length - self.elapsed(now)).num_milliseconds();
        if remaining_ms <= 0 {
            0
        } else {
            (remaining_ms + HOUR_MS - 1) / HOUR_MS
        }
    }
}
