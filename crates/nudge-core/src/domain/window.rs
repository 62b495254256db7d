//! Due window: the range of trigger times a tick is responsible for.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// `(start, end]`: lower bound exclusive, upper bound inclusive.
///
/// A pending reminder whose `trigger_time` is at or before `start` has aged
/// out: it is no longer dispatched automatically and keeps its status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DueWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DueWindow {
    /// Window for a tick running at `now` with the given slack.
    pub fn ending_at(now: DateTime<Utc>, slack: Duration) -> Self {
        Self {
            start: now - slack,
            end: now,
        }
    }

    pub fn contains(&self, trigger_time: DateTime<Utc>) -> bool {
        trigger_time > self.start && trigger_time <= self.end
    }
}
