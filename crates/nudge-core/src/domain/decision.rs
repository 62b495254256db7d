//! Decision model: what to persist for a reminder after a dispatch outcome.
//!
//! The [`Decider`] is a pure function of (reminder, outcome, now). Persisting
//! the resulting [`Transition`] is the scheduler's job.

use chrono::{DateTime, Utc};

use super::outcome::DispatchOutcome;
use super::recurrence::next_occurrence;
use super::reminder::Reminder;
use super::state::ReminderStatus;

/// The next persisted state of a reminder.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// One-time reminder delivered.
    Complete,

    /// Recurring reminder delivered: Triggered, then back to Pending at `next`
    /// in the same write.
    Reschedule { next: DateTime<Utc> },

    /// Transient failure: keep Pending with the same trigger time.
    Retry { reason: String },

    /// Permanent failure for this occurrence.
    Fail { reason: String },

    /// Skipped by policy, no delivery attempted.
    Cancel { reason: String },
}

impl Transition {
    /// Status to persist. `Retry` keeps the reminder pending.
    pub fn status(&self) -> ReminderStatus {
        match self {
            Transition::Complete => ReminderStatus::Completed,
            Transition::Reschedule { .. } | Transition::Retry { .. } => ReminderStatus::Pending,
            Transition::Fail { .. } => ReminderStatus::Failed,
            Transition::Cancel { .. } => ReminderStatus::Cancelled,
        }
    }

    /// New trigger time to persist, if it changes.
    pub fn trigger_time(&self) -> Option<DateTime<Utc>> {
        match self {
            Transition::Reschedule { next } => Some(*next),
            _ => None,
        }
    }

    /// `Retry` writes nothing; only the claim is released.
    pub fn changes_record(&self) -> bool {
        !matches!(self, Transition::Retry { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Transition::Complete => "complete",
            Transition::Reschedule { .. } => "reschedule",
            Transition::Retry { .. } => "retry",
            Transition::Fail { .. } => "fail",
            Transition::Cancel { .. } => "cancel",
        }
    }
}

/// Decides the next transition for a reminder given a dispatch outcome.
pub trait Decider: Send + Sync {
    fn decide(&self, reminder: &Reminder, outcome: DispatchOutcome, now: DateTime<Utc>) -> Transition;
}

/// The status/rescheduling rules of the reminder engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultDecider;

impl Decider for DefaultDecider {
    fn decide(&self, reminder: &Reminder, outcome: DispatchOutcome, now: DateTime<Utc>) -> Transition {
        match outcome {
            DispatchOutcome::Sent => {
                match next_occurrence(reminder.trigger_time, reminder.frequency, now) {
                    Some(next) => Transition::Reschedule { next },
                    None => Transition::Complete,
                }
            }
            DispatchOutcome::FailedTransient => Transition::Retry {
                reason: "transient delivery failure".to_string(),
            },
            // A dead token fails every future occurrence too, so recurring
            // reminders are not rescheduled here.
            DispatchOutcome::FailedPermanent => Transition::Fail {
                reason: "permanent delivery failure".to_string(),
            },
            DispatchOutcome::SkippedNoToken => Transition::Cancel {
                reason: "user has no device token".to_string(),
            },
            DispatchOutcome::SkippedInactiveUser => Transition::Cancel {
                reason: "user is inactive".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Frequency, ReminderId, ReminderType, UserId};
    use chrono::{Duration, TimeZone};
    use rstest::rstest;
    use ulid::Ulid;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 7, 0, 0).unwrap()
    }

    fn reminder(frequency: Frequency, trigger_time: DateTime<Utc>) -> Reminder {
        Reminder {
            id: ReminderId::from_ulid(Ulid::new()),
            user_id: UserId::from_ulid(Ulid::new()),
            reminder_type: ReminderType::Meditation,
            title: "Breathe".into(),
            message: "Two minutes of breathing".into(),
            trigger_time,
            frequency,
            status: ReminderStatus::Pending,
            is_active: true,
            created_at: now(),
            updated_at: now(),
        }
    }

    #[test]
    fn sent_one_time_completes() {
        let r = reminder(Frequency::OneTime, now() - Duration::seconds(30));
        let t = DefaultDecider.decide(&r, DispatchOutcome::Sent, now());
        assert_eq!(t, Transition::Complete);
        assert_eq!(t.status(), ReminderStatus::Completed);
    }

    #[test]
    fn sent_weekly_reschedules_seven_days_later() {
        let trigger = now() - Duration::seconds(10);
        let r = reminder(Frequency::Weekly, trigger);
        let t = DefaultDecider.decide(&r, DispatchOutcome::Sent, now());
        assert_eq!(t, Transition::Reschedule { next: trigger + Duration::days(7) });
        assert_eq!(t.status(), ReminderStatus::Pending);
    }

    #[rstest]
    #[case(Frequency::OneTime)]
    #[case(Frequency::Daily)]
    fn permanent_failure_is_terminal_even_for_recurring(#[case] frequency: Frequency) {
        let r = reminder(frequency, now());
        let t = DefaultDecider.decide(&r, DispatchOutcome::FailedPermanent, now());
        assert_eq!(t.status(), ReminderStatus::Failed);
        assert_eq!(t.trigger_time(), None);
    }

    #[test]
    fn transient_failure_keeps_pending_and_time() {
        let r = reminder(Frequency::Hourly, now());
        let t = DefaultDecider.decide(&r, DispatchOutcome::FailedTransient, now());
        assert_eq!(t.status(), ReminderStatus::Pending);
        assert_eq!(t.trigger_time(), None);
        assert!(!t.changes_record());
    }

    #[rstest]
    #[case(DispatchOutcome::SkippedNoToken)]
    #[case(DispatchOutcome::SkippedInactiveUser)]
    fn skips_cancel(#[case] outcome: DispatchOutcome) {
        let r = reminder(Frequency::Daily, now());
        let t = DefaultDecider.decide(&r, outcome, now());
        assert_eq!(t.status(), ReminderStatus::Cancelled);
    }
}
