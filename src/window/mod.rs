//! Window planning for resumable per-period processing.
//!
//! Given a metric's resume point and the current time, produces the ordered
//! sequence of closed windows that still need processing. The in-progress
//! partial period is never emitted.

use chrono::{DateTime, Duration, NaiveTime, Utc};

use crate::config::Period;

/// Half-open `[start, end)` interval, exactly one period long.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl std::fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}, {})",
            self.start.to_rfc3339(),
            self.end.to_rfc3339()
        )
    }
}

impl Period {
    /// Length of one window at this granularity.
    pub fn length(&self) -> Duration {
        match self {
            Self::Day => Duration::days(1),
        }
    }

    /// Floor a timestamp to the start of its period (UTC).
    pub fn floor(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Self::Day => ts.date_naive().and_time(NaiveTime::MIN).and_utc(),
        }
    }
}

/// Plan the pending windows for one metric.
///
/// The first window starts at `resume_point` floored to the period boundary;
/// windows advance by one period length and stop before any window whose
/// `end` would exceed `now`. Re-planning with an advanced resume point and a
/// later `now` yields exactly the windows not yet returned.
pub fn plan(
    period: Period,
    resume_point: DateTime<Utc>,
    now: DateTime<Utc>,
) -> impl Iterator<Item = TimeWindow> {
    let len = period.length();
    let first = period.floor(resume_point);

    std::iter::successors(Some(first), move |start| Some(*start + len))
        .map(move |start| TimeWindow {
            start,
            end: start + len,
        })
        .take_while(move |w| w.end <= now)
}
