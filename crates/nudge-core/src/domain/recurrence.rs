//! Recurrence rule for recurring reminders.
//!
//! Offsets are fixed durations: a "month" is 30 days, not a calendar month.
//! A monthly reminder created on Jan 31 drifts to Mar 2, Apr 1, ...

use chrono::{DateTime, Duration, Utc};

use super::reminder::Frequency;

impl Frequency {
    /// The fixed offset between two occurrences. `None` for one-time reminders.
    pub fn interval(self) -> Option<Duration> {
        match self {
            Frequency::OneTime => None,
            Frequency::Hourly => Some(Duration::hours(1)),
            Frequency::Daily => Some(Duration::days(1)),
            Frequency::Weekly => Some(Duration::days(7)),
            Frequency::Monthly => Some(Duration::days(30)),
        }
    }
}

/// Next occurrence strictly after `now`, on the reminder's cadence.
///
/// `previous + Δ`, advanced by further whole multiples of Δ while it is not
/// after `now` (e.g. the process was down for several periods). Returns
/// `None` for one-time reminders.
pub fn next_occurrence(
    previous: DateTime<Utc>,
    frequency: Frequency,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let step = frequency.interval()?;
    let mut next = previous + step;
    if next <= now {
        // skip missed periods in one jump
        let behind = (now - next).num_milliseconds();
        let step_ms = step.num_milliseconds();
        let periods = behind / step_ms + 1;
        next += Duration::milliseconds(step_ms * periods);
    }
    debug_assert!(next > now);
    Some(next)
}
