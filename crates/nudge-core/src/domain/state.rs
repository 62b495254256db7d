//! Reminder status state machine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::errors::ValidationError;

/// Reminder status.
///
/// State transitions (driven by the scheduler only):
/// - Pending -> Completed (one-time reminder delivered)
/// - Pending -> Triggered -> Pending (recurring reminder delivered, rescheduled)
/// - Pending -> Failed (permanent delivery failure)
/// - Pending -> Cancelled (inactive user / no device token)
/// - Pending -> Pending (transient failure, retried next tick)
///
/// Failed and Cancelled are terminal for the occurrence; only an external
/// edit re-arms the reminder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderStatus {
    /// Waiting for `trigger_time` to come into the due window.
    Pending,

    /// Delivered; a recurring reminder passes through here on its way back to Pending.
    Triggered,

    /// One-time reminder delivered.
    Completed,

    /// Delivery failed permanently (dead token).
    Failed,

    /// Skipped by policy; no delivery attempt was made.
    Cancelled,
}

impl ReminderStatus {
    pub const ALL: [ReminderStatus; 5] = [
        ReminderStatus::Pending,
        ReminderStatus::Triggered,
        ReminderStatus::Completed,
        ReminderStatus::Failed,
        ReminderStatus::Cancelled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ReminderStatus::Pending => "pending",
            ReminderStatus::Triggered => "triggered",
            ReminderStatus::Completed => "completed",
            ReminderStatus::Failed => "failed",
            ReminderStatus::Cancelled => "cancelled",
        }
    }

    /// Is this status eligible for the due-set query?
    pub fn is_dispatchable(self) -> bool {
        matches!(self, ReminderStatus::Pending)
    }

    /// Transitions the scheduler is allowed to persist.
    pub fn can_transition_to(self, next: ReminderStatus) -> bool {
        use ReminderStatus::*;
        matches!(
            (self, next),
            (Pending, Pending | Triggered | Completed | Failed | Cancelled) | (Triggered, Pending)
        )
    }
}

impl fmt::Display for ReminderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReminderStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ReminderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownVariant {
                field: "status",
                value: s.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ReminderStatus::Pending, ReminderStatus::Completed, true)]
    #[case(ReminderStatus::Pending, ReminderStatus::Triggered, true)]
    #[case(ReminderStatus::Pending, ReminderStatus::Failed, true)]
    #[case(ReminderStatus::Pending, ReminderStatus::Cancelled, true)]
    #[case(ReminderStatus::Triggered, ReminderStatus::Pending, true)]
    #[case(ReminderStatus::Completed, ReminderStatus::Pending, false)]
    #[case(ReminderStatus::Failed, ReminderStatus::Pending, false)]
    #[case(ReminderStatus::Cancelled, ReminderStatus::Triggered, false)]
    fn transitions(
        #[case] from: ReminderStatus,
        #[case] to: ReminderStatus,
        #[case] allowed: bool,
    ) {
        assert_eq!(from.can_transition_to(to), allowed);
    }

    #[test]
    fn only_pending_is_dispatchable() {
        let dispatchable: Vec<_> = ReminderStatus::ALL
            .into_iter()
            .filter(|s| s.is_dispatchable())
            .collect();
        assert_eq!(dispatchable, vec![ReminderStatus::Pending]);
    }

    #[test]
    fn parses_its_own_names() {
        for status in ReminderStatus::ALL {
            assert_eq!(status.as_str().parse::<ReminderStatus>().unwrap(), status);
        }
        assert!("done".parse::<ReminderStatus>().is_err());
    }

    #[test]
    fn serializes_as_snake_case() {
        let s = serde_json::to_string(&ReminderStatus::Cancelled).unwrap();
        assert_eq!(s, "\"cancelled\"");
    }
}
