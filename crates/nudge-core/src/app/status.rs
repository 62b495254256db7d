//! Status - tick レポートとスケジューラの状態スナップショット

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::DispatchOutcome;

/// Per-outcome counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeCounts {
    pub sent: usize,
    pub skipped_no_token: usize,
    pub skipped_inactive_user: usize,
    pub failed_transient: usize,
    pub failed_permanent: usize,
    /// Reminders whose processing hit an unexpected fault (store write, user
    /// lookup) and were left pending.
    pub errors: usize,
}

impl OutcomeCounts {
    pub fn record(&mut self, outcome: DispatchOutcome) {
        match outcome {
            DispatchOutcome::Sent => self.sent += 1,
            DispatchOutcome::SkippedNoToken => self.skipped_no_token += 1,
            DispatchOutcome::SkippedInactiveUser => self.skipped_inactive_user += 1,
            DispatchOutcome::FailedTransient => self.failed_transient += 1,
            DispatchOutcome::FailedPermanent => self.failed_permanent += 1,
        }
    }

    pub fn record_error(&mut self) {
        self.errors += 1;
    }

    pub fn total(&self) -> usize {
        self.sent
            + self.skipped_no_token
            + self.skipped_inactive_user
            + self.failed_transient
            + self.failed_permanent
            + self.errors
    }

    pub fn add(&mut self, other: &OutcomeCounts) {
        self.sent += other.sent;
        self.skipped_no_token += other.skipped_no_token;
        self.skipped_inactive_user += other.skipped_inactive_user;
        self.failed_transient += other.failed_transient;
        self.failed_permanent += other.failed_permanent;
        self.errors += other.errors;
    }
}

/// What one tick did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickReport {
    pub ran_at: DateTime<Utc>,
    /// Reminders claimed from the due window.
    pub due: usize,
    pub counts: OutcomeCounts,
}

impl TickReport {
    pub fn empty(ran_at: DateTime<Utc>) -> Self {
        Self {
            ran_at,
            due: 0,
            counts: OutcomeCounts::default(),
        }
    }
}

/// Snapshot of a running (or stopped) scheduler service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub ticks: u64,
    /// Ticks abandoned because the due set could not be loaded.
    pub failed_ticks: u64,
    pub last_tick: Option<TickReport>,
    pub totals: OutcomeCounts,
}

impl SchedulerStatus {
    pub(crate) fn record_tick(&mut self, report: TickReport) {
        self.ticks += 1;
        self.totals.add(&report.counts);
        self.last_tick = Some(report);
    }

    pub(crate) fn record_failed_tick(&mut self) {
        self.ticks += 1;
        self.failed_ticks += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn totals_accumulate_across_ticks() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut status = SchedulerStatus::default();

        let mut first = TickReport::empty(at);
        first.counts.record(DispatchOutcome::Sent);
        first.counts.record(DispatchOutcome::SkippedNoToken);
        first.due = 2;
        status.record_tick(first);

        let mut second = TickReport::empty(at);
        second.counts.record(DispatchOutcome::Sent);
        second.counts.record_error();
        second.due = 2;
        status.record_tick(second.clone());
        status.record_failed_tick();

        assert_eq!(status.ticks, 3);
        assert_eq!(status.failed_ticks, 1);
        assert_eq!(status.totals.sent, 2);
        assert_eq!(status.totals.skipped_no_token, 1);
        assert_eq!(status.totals.errors, 1);
        assert_eq!(status.totals.total(), 4);
        assert_eq!(status.last_tick, Some(second));
    }
}
