//! ReminderStore port - reminder の正本（source of truth）
//!
//! # 設計原則
//! - 状態遷移は reminder 単位の `update_status` のみ（bulk update はしない）
//! - `claim_due` は「検索 + claim」をアトミックに行う。claim 済みの reminder は
//!   次の `claim_due` に含まれないので、同じ reminder への配信が重ならない
//! - claim は `update_status` または `release` で解放される

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{DueWindow, NewReminder, NudgeError, Reminder, ReminderId, ReminderStatus, StoreError};

/// Result of a single-reminder mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateResult {
    Updated,
    NotFound,
}

#[async_trait]
pub trait ReminderStore: Send + Sync {
    /// Pending, active reminders whose trigger time lies in `window`.
    /// Read-only; does not claim.
    async fn find_due(&self, window: &DueWindow) -> Result<Vec<Reminder>, StoreError>;

    /// Like `find_due`, but atomically marks every returned reminder as
    /// claimed and skips reminders that are already claimed.
    async fn claim_due(&self, window: &DueWindow) -> Result<Vec<Reminder>, StoreError>;

    /// Persist a new status (and optionally a new trigger time) and release
    /// the claim. `updated_at` is stamped with `now`.
    async fn update_status(
        &self,
        id: ReminderId,
        status: ReminderStatus,
        trigger_time: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<UpdateResult, StoreError>;

    /// Release a claim without changing the reminder.
    async fn release(&self, id: ReminderId) -> Result<UpdateResult, StoreError>;

    /// Release claims left behind by a process that did not shut down cleanly.
    /// Returns how many were released.
    async fn release_stale_claims(&self) -> Result<usize, StoreError>;

    async fn get(&self, id: ReminderId) -> Result<Option<Reminder>, StoreError>;

    /// Create a reminder in `Pending` state.
    async fn insert(&self, reminder: NewReminder) -> Result<Reminder, NudgeError>;
}
