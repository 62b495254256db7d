//! ReminderScheduler - 1 tick 分の処理
//!
//! # フロー（reminder ごとに独立）
//! 1. `ReminderStore::claim_due` で due window 内の reminder を claim
//! 2. `UserDirectory::get` で owner を解決（inactive / 不明 / token なしは skip）
//! 3. `DeliveryAdapter::send` → `DispatchOutcome`
//! 4. `Decider::decide` → `Transition`
//! 5. `update_status`（または `Retry` なら `release` のみ）
//!
//! 1 件の失敗は他の reminder の処理を止めません。claim_due 自体が失敗した
//! 場合だけ tick 全体を諦め、次の tick に任せます。

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};

use crate::config::SchedulerConfig;
use crate::domain::{
    Decider, DefaultDecider, DispatchOutcome, DueWindow, Reminder, ReminderId, StoreError,
    Transition,
};
use crate::ports::{Clock, ReminderStore, UpdateResult, UserDirectory};

use super::adapter::{DeliveryAdapter, reminder_data};
use super::status::TickReport;

pub struct ReminderScheduler {
    store: Arc<dyn ReminderStore>,
    users: Arc<dyn UserDirectory>,
    adapter: DeliveryAdapter,
    decider: Arc<dyn Decider>,
    clock: Arc<dyn Clock>,
    window_slack: chrono::Duration,
    max_concurrent: usize,
}

impl ReminderScheduler {
    pub fn new(
        store: Arc<dyn ReminderStore>,
        users: Arc<dyn UserDirectory>,
        adapter: DeliveryAdapter,
        clock: Arc<dyn Clock>,
        config: &SchedulerConfig,
    ) -> Self {
        Self {
            store,
            users,
            adapter,
            decider: Arc::new(DefaultDecider),
            clock,
            window_slack: config.window_slack(),
            max_concurrent: config.max_concurrent_dispatches.max(1),
        }
    }

    pub fn store(&self) -> &Arc<dyn ReminderStore> {
        &self.store
    }

    /// Run one tick.
    ///
    /// `Err` only when the due set could not be claimed; nothing was
    /// dispatched in that case.
    pub async fn tick(&self) -> Result<TickReport, StoreError> {
        let now = self.clock.now();
        let window = DueWindow::ending_at(now, self.window_slack);

        let due = match self.store.claim_due(&window).await {
            Ok(due) => due,
            Err(err) => {
                tracing::error!(error = %err, "tick abandoned: could not claim due reminders");
                return Err(err);
            }
        };

        let mut report = TickReport::empty(now);
        report.due = due.len();
        if due.is_empty() {
            tracing::debug!(window_start = %window.start, window_end = %window.end, "no due reminders");
            return Ok(report);
        }
        tracing::info!(
            due = due.len(),
            gateway = self.adapter.gateway_name(),
            "processing due reminders"
        );

        let results: Vec<Result<DispatchOutcome, StoreError>> = stream::iter(due)
            .map(|reminder| self.process(reminder, now))
            .buffer_unordered(self.max_concurrent)
            .collect()
            .await;

        for result in results {
            match result {
                Ok(outcome) => report.counts.record(outcome),
                Err(_) => report.counts.record_error(),
            }
        }

        tracing::info!(
            due = report.due,
            sent = report.counts.sent,
            skipped = report.counts.skipped_no_token + report.counts.skipped_inactive_user,
            failed_transient = report.counts.failed_transient,
            failed_permanent = report.counts.failed_permanent,
            errors = report.counts.errors,
            "tick finished"
        );
        Ok(report)
    }

    /// Process one claimed reminder. On error the claim is released so the
    /// reminder stays pending for the next tick.
    async fn process(&self, reminder: Reminder, now: DateTime<Utc>) -> Result<DispatchOutcome, StoreError> {
        let id = reminder.id;
        match self.dispatch(&reminder, now).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                tracing::error!(reminder_id = %id, error = %err, "failed to process reminder");
                if let Err(release_err) = self.store.release(id).await {
                    tracing::error!(
                        reminder_id = %id,
                        error = %release_err,
                        "failed to release claim"
                    );
                }
                Err(err)
            }
        }
    }

    async fn dispatch(&self, reminder: &Reminder, now: DateTime<Utc>) -> Result<DispatchOutcome, StoreError> {
        if !reminder.status.is_dispatchable() {
            return Err(StoreError::Corrupt {
                entity: format!("reminder {}", reminder.id),
                reason: format!("claimed while {}", reminder.status),
            });
        }

        let outcome = self.deliver(reminder).await?;
        let transition = self.decider.decide(reminder, outcome, now);
        if !reminder.status.can_transition_to(transition.status()) {
            return Err(StoreError::Corrupt {
                entity: format!("reminder {}", reminder.id),
                reason: format!(
                    "illegal transition {} -> {}",
                    reminder.status,
                    transition.status()
                ),
            });
        }

        match &transition {
            Transition::Complete | Transition::Reschedule { .. } => tracing::info!(
                reminder_id = %reminder.id,
                user_id = %reminder.user_id,
                outcome = %outcome,
                transition = transition.name(),
                next_trigger = ?transition.trigger_time(),
                "reminder dispatched"
            ),
            Transition::Retry { reason } | Transition::Cancel { reason } => tracing::warn!(
                reminder_id = %reminder.id,
                user_id = %reminder.user_id,
                outcome = %outcome,
                transition = transition.name(),
                %reason,
                "reminder not delivered"
            ),
            Transition::Fail { reason } => tracing::error!(
                reminder_id = %reminder.id,
                user_id = %reminder.user_id,
                outcome = %outcome,
                %reason,
                "reminder failed"
            ),
        }

        self.persist(reminder.id, &transition).await?;
        Ok(outcome)
    }

    async fn deliver(&self, reminder: &Reminder) -> Result<DispatchOutcome, StoreError> {
        let Some(user) = self.users.get(reminder.user_id).await? else {
            tracing::warn!(reminder_id = %reminder.id, user_id = %reminder.user_id, "owner not found");
            return Ok(DispatchOutcome::SkippedInactiveUser);
        };
        if !user.is_active {
            return Ok(DispatchOutcome::SkippedInactiveUser);
        }
        let Some(token) = user.token() else {
            return Ok(DispatchOutcome::SkippedNoToken);
        };

        Ok(self
            .adapter
            .send(token, &reminder.title, &reminder.message, reminder_data(reminder))
            .await)
    }

    async fn persist(&self, id: ReminderId, transition: &Transition) -> Result<(), StoreError> {
        let result = if transition.changes_record() {
            self.store
                .update_status(id, transition.status(), transition.trigger_time(), self.clock.now())
                .await?
        } else {
            self.store.release(id).await?
        };

        if result == UpdateResult::NotFound {
            // Deleted while in flight (user delete cascades).
            tracing::warn!(reminder_id = %id, "reminder disappeared before its transition was saved");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        Frequency, NewReminder, NudgeError, ReminderStatus, ReminderType, UserId, UserProfile,
    };
    use crate::impls::{InMemoryReminderStore, InMemoryUserDirectory, ScriptedGateway};
    use crate::ports::{ManualClock, PushError};
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};
    use std::collections::HashSet;
    use std::sync::Mutex;
    use ulid::Ulid;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, 8, 0, 0).unwrap()
    }

    struct Harness {
        clock: Arc<ManualClock>,
        store: Arc<InMemoryReminderStore>,
        users: Arc<InMemoryUserDirectory>,
        gateway: Arc<ScriptedGateway>,
    }

    impl Harness {
        fn new() -> Self {
            let clock = Arc::new(ManualClock::new(t0()));
            Self {
                store: Arc::new(InMemoryReminderStore::new(clock.clone())),
                users: Arc::new(InMemoryUserDirectory::new()),
                gateway: Arc::new(ScriptedGateway::new()),
                clock,
            }
        }

        fn scheduler(&self) -> ReminderScheduler {
            self.scheduler_over(self.store.clone())
        }

        fn scheduler_over(&self, store: Arc<dyn ReminderStore>) -> ReminderScheduler {
            let adapter = DeliveryAdapter::new(self.gateway.clone(), std::time::Duration::from_secs(5));
            ReminderScheduler::new(
                store,
                self.users.clone(),
                adapter,
                self.clock.clone(),
                &SchedulerConfig::default(),
            )
        }

        async fn user(&self, is_active: bool, token: Option<&str>) -> UserId {
            let id = UserId::from_ulid(Ulid::new());
            self.users
                .upsert(UserProfile {
                    id,
                    is_active,
                    device_token: token.map(str::to_string),
                })
                .await;
            id
        }

        async fn reminder(
            &self,
            user_id: UserId,
            frequency: Frequency,
            trigger_time: DateTime<Utc>,
        ) -> Reminder {
            self.store
                .insert(NewReminder {
                    user_id,
                    reminder_type: ReminderType::Meditation,
                    title: "Breathe".into(),
                    message: "Two minutes of box breathing".into(),
                    trigger_time,
                    frequency,
                })
                .await
                .unwrap()
        }

        async fn stored(&self, id: ReminderId) -> Reminder {
            self.store.get(id).await.unwrap().unwrap()
        }
    }

    #[tokio::test]
    async fn one_time_sent_completes() {
        let h = Harness::new();
        let user = h.user(true, Some("token-abcdefghijkl")).await;
        let r = h.reminder(user, Frequency::OneTime, t0() - Duration::seconds(30)).await;

        let report = h.scheduler().tick().await.unwrap();

        assert_eq!(report.due, 1);
        assert_eq!(report.counts.sent, 1);
        let stored = h.stored(r.id).await;
        assert_eq!(stored.status, ReminderStatus::Completed);
        assert!(!h.store.is_claimed(r.id).await);

        let sent = h.gateway.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].title, "Breathe");
        assert_eq!(sent[0].body, "Two minutes of box breathing");
        assert_eq!(sent[0].data["reminder_id"], r.id.to_string());
        assert_eq!(sent[0].data["reminder_type"], "meditation");

        // never again
        h.clock.advance(Duration::seconds(30));
        let report = h.scheduler().tick().await.unwrap();
        assert_eq!(report.due, 0);
        assert_eq!(h.gateway.sent_count(), 1);
    }

    #[tokio::test]
    async fn weekly_sent_is_rescheduled_seven_days_later() {
        let h = Harness::new();
        let user = h.user(true, Some("tok")).await;
        let trigger = t0() - Duration::seconds(10);
        let r = h.reminder(user, Frequency::Weekly, trigger).await;

        h.scheduler().tick().await.unwrap();

        let stored = h.stored(r.id).await;
        assert_eq!(stored.status, ReminderStatus::Pending);
        assert_eq!(stored.trigger_time, trigger + Duration::days(7));
        assert_eq!(stored.updated_at, t0());
    }

    #[tokio::test]
    async fn daily_reschedule_lands_strictly_after_now() {
        let h = Harness::new();
        let user = h.user(true, Some("tok")).await;
        let trigger = t0() - Duration::seconds(60);
        let r = h.reminder(user, Frequency::Daily, trigger).await;

        h.scheduler().tick().await.unwrap();

        let stored = h.stored(r.id).await;
        assert!(stored.trigger_time > t0());
        assert_eq!(stored.trigger_time, trigger + Duration::days(1));
    }

    #[tokio::test]
    async fn missing_token_cancels_without_gateway_call() {
        let h = Harness::new();
        let user = h.user(true, None).await;
        let r = h.reminder(user, Frequency::Daily, t0()).await;

        let report = h.scheduler().tick().await.unwrap();

        assert_eq!(report.counts.skipped_no_token, 1);
        assert_eq!(h.stored(r.id).await.status, ReminderStatus::Cancelled);
        assert_eq!(h.gateway.sent_count(), 0);
    }

    #[tokio::test]
    async fn inactive_or_unknown_owner_cancels() {
        let h = Harness::new();
        let inactive = h.user(false, Some("tok")).await;
        let a = h.reminder(inactive, Frequency::OneTime, t0()).await;
        let b = h
            .reminder(UserId::from_ulid(Ulid::new()), Frequency::OneTime, t0())
            .await;

        let report = h.scheduler().tick().await.unwrap();

        assert_eq!(report.counts.skipped_inactive_user, 2);
        assert_eq!(h.stored(a.id).await.status, ReminderStatus::Cancelled);
        assert_eq!(h.stored(b.id).await.status, ReminderStatus::Cancelled);
        assert_eq!(h.gateway.sent_count(), 0);
    }

    #[tokio::test]
    async fn permanent_failure_fails_recurring_reminder_for_good() {
        let h = Harness::new();
        let user = h.user(true, Some("dead-token")).await;
        h.gateway.fail_token("dead-token", PushError::Unregistered);
        let r = h.reminder(user, Frequency::Daily, t0() - Duration::seconds(5)).await;

        h.scheduler().tick().await.unwrap();

        let stored = h.stored(r.id).await;
        assert_eq!(stored.status, ReminderStatus::Failed);
        assert_eq!(stored.trigger_time, r.trigger_time);

        h.clock.advance(Duration::seconds(30));
        assert_eq!(h.scheduler().tick().await.unwrap().due, 0);
        assert_eq!(h.gateway.sent_count(), 1);
    }

    #[tokio::test]
    async fn transient_failure_retries_until_aged_out() {
        let h = Harness::new();
        let user = h.user(true, Some("flaky")).await;
        h.gateway
            .fail_token("flaky", PushError::Unavailable("503".into()));
        let r = h.reminder(user, Frequency::OneTime, t0() - Duration::seconds(10)).await;
        let scheduler = h.scheduler();

        let report = scheduler.tick().await.unwrap();
        assert_eq!(report.counts.failed_transient, 1);
        let stored = h.stored(r.id).await;
        assert_eq!(stored.status, ReminderStatus::Pending);
        assert_eq!(stored.trigger_time, r.trigger_time);
        assert!(!h.store.is_claimed(r.id).await);

        // next tick, still inside the window: retried
        h.clock.advance(Duration::seconds(60));
        assert_eq!(scheduler.tick().await.unwrap().due, 1);
        assert_eq!(h.gateway.sent_count(), 2);

        // two minutes after the trigger it has aged out and stays pending
        h.clock.advance(Duration::seconds(60));
        assert_eq!(scheduler.tick().await.unwrap().due, 0);
        assert_eq!(h.gateway.sent_count(), 2);
        assert_eq!(h.stored(r.id).await.status, ReminderStatus::Pending);
    }

    #[tokio::test]
    async fn reminders_outside_the_window_are_untouched() {
        let h = Harness::new();
        let user = h.user(true, Some("tok")).await;
        let future = h.reminder(user, Frequency::OneTime, t0() + Duration::seconds(1)).await;
        let edge = h.reminder(user, Frequency::OneTime, t0() - Duration::minutes(2)).await;
        let inside = h.reminder(user, Frequency::OneTime, t0()).await;

        let report = h.scheduler().tick().await.unwrap();

        assert_eq!(report.due, 1);
        assert_eq!(h.stored(inside.id).await.status, ReminderStatus::Completed);
        assert_eq!(h.stored(future.id).await.status, ReminderStatus::Pending);
        assert_eq!(h.stored(edge.id).await.status, ReminderStatus::Pending);
    }

    /// Wraps the in-memory store and fails `update_status` for chosen ids.
    struct FlakyStore {
        inner: Arc<InMemoryReminderStore>,
        broken: Mutex<HashSet<ReminderId>>,
    }

    #[async_trait]
    impl ReminderStore for FlakyStore {
        async fn find_due(&self, window: &DueWindow) -> Result<Vec<Reminder>, StoreError> {
            self.inner.find_due(window).await
        }

        async fn claim_due(&self, window: &DueWindow) -> Result<Vec<Reminder>, StoreError> {
            self.inner.claim_due(window).await
        }

        async fn update_status(
            &self,
            id: ReminderId,
            status: ReminderStatus,
            trigger_time: Option<DateTime<Utc>>,
            now: DateTime<Utc>,
        ) -> Result<UpdateResult, StoreError> {
            if self.broken.lock().unwrap().contains(&id) {
                return Err(StoreError::Backend("disk full".into()));
            }
            self.inner.update_status(id, status, trigger_time, now).await
        }

        async fn release(&self, id: ReminderId) -> Result<UpdateResult, StoreError> {
            self.inner.release(id).await
        }

        async fn release_stale_claims(&self) -> Result<usize, StoreError> {
            self.inner.release_stale_claims().await
        }

        async fn get(&self, id: ReminderId) -> Result<Option<Reminder>, StoreError> {
            self.inner.get(id).await
        }

        async fn insert(&self, reminder: NewReminder) -> Result<Reminder, NudgeError> {
            self.inner.insert(reminder).await
        }
    }

    #[tokio::test]
    async fn one_faulty_reminder_does_not_stop_the_others() {
        let h = Harness::new();
        let user = h.user(true, Some("tok")).await;
        let mut ids = Vec::new();
        for i in 0..5 {
            let r = h
                .reminder(user, Frequency::OneTime, t0() - Duration::seconds(i * 10))
                .await;
            ids.push(r.id);
        }
        let faulty = ids[2];
        let store = Arc::new(FlakyStore {
            inner: h.store.clone(),
            broken: Mutex::new(HashSet::from([faulty])),
        });

        let report = h.scheduler_over(store).tick().await.unwrap();

        assert_eq!(report.due, 5);
        assert_eq!(report.counts.sent, 4);
        assert_eq!(report.counts.errors, 1);
        for id in ids {
            let stored = h.stored(id).await;
            if id == faulty {
                assert_eq!(stored.status, ReminderStatus::Pending);
                assert!(!h.store.is_claimed(id).await);
            } else {
                assert_eq!(stored.status, ReminderStatus::Completed);
            }
        }
    }

    #[tokio::test]
    async fn tick_leaves_claims_held_by_another_tick_alone() {
        let h = Harness::new();
        let user = h.user(true, Some("tok")).await;
        let r = h.reminder(user, Frequency::OneTime, t0()).await;
        let window = DueWindow::ending_at(t0(), Duration::minutes(2));
        h.store.claim_due(&window).await.unwrap();

        let report = h.scheduler().tick().await.unwrap();

        assert_eq!(report.due, 0);
        assert_eq!(h.gateway.sent_count(), 0);
        assert!(h.store.is_claimed(r.id).await);
    }

    /// Hands out every stored reminder as claimed, whatever its status.
    struct StaleClaims {
        inner: Arc<InMemoryReminderStore>,
        ids: Vec<ReminderId>,
    }

    #[async_trait]
    impl ReminderStore for StaleClaims {
        async fn find_due(&self, window: &DueWindow) -> Result<Vec<Reminder>, StoreError> {
            self.inner.find_due(window).await
        }

        async fn claim_due(&self, _: &DueWindow) -> Result<Vec<Reminder>, StoreError> {
            let mut out = Vec::new();
            for id in &self.ids {
                if let Some(r) = self.inner.get(*id).await? {
                    out.push(r);
                }
            }
            Ok(out)
        }

        async fn update_status(
            &self,
            id: ReminderId,
            status: ReminderStatus,
            trigger_time: Option<DateTime<Utc>>,
            now: DateTime<Utc>,
        ) -> Result<UpdateResult, StoreError> {
            self.inner.update_status(id, status, trigger_time, now).await
        }

        async fn release(&self, id: ReminderId) -> Result<UpdateResult, StoreError> {
            self.inner.release(id).await
        }

        async fn release_stale_claims(&self) -> Result<usize, StoreError> {
            self.inner.release_stale_claims().await
        }

        async fn get(&self, id: ReminderId) -> Result<Option<Reminder>, StoreError> {
            self.inner.get(id).await
        }

        async fn insert(&self, reminder: NewReminder) -> Result<Reminder, NudgeError> {
            self.inner.insert(reminder).await
        }
    }

    #[tokio::test]
    async fn finished_reminder_handed_out_again_is_not_resent() {
        let h = Harness::new();
        let user = h.user(true, Some("tok")).await;
        let done = h.reminder(user, Frequency::OneTime, t0()).await;
        let fresh = h.reminder(user, Frequency::OneTime, t0()).await;
        h.store
            .update_status(done.id, ReminderStatus::Completed, None, t0())
            .await
            .unwrap();
        let store = Arc::new(StaleClaims {
            inner: h.store.clone(),
            ids: vec![done.id, fresh.id],
        });

        let report = h.scheduler_over(store).tick().await.unwrap();

        assert_eq!(report.counts.errors, 1);
        assert_eq!(report.counts.sent, 1);
        assert_eq!(h.gateway.sent_count(), 1);
        assert_eq!(h.stored(done.id).await.status, ReminderStatus::Completed);
        assert_eq!(h.stored(fresh.id).await.status, ReminderStatus::Completed);
    }

    struct BrokenClaims;

    #[async_trait]
    impl ReminderStore for BrokenClaims {
        async fn find_due(&self, _: &DueWindow) -> Result<Vec<Reminder>, StoreError> {
            Err(StoreError::Backend("connection refused".into()))
        }

        async fn claim_due(&self, _: &DueWindow) -> Result<Vec<Reminder>, StoreError> {
            Err(StoreError::Backend("connection refused".into()))
        }

        async fn update_status(
            &self,
            _: ReminderId,
            _: ReminderStatus,
            _: Option<DateTime<Utc>>,
            _: DateTime<Utc>,
        ) -> Result<UpdateResult, StoreError> {
            unreachable!("nothing was claimed")
        }

        async fn release(&self, _: ReminderId) -> Result<UpdateResult, StoreError> {
            unreachable!("nothing was claimed")
        }

        async fn release_stale_claims(&self) -> Result<usize, StoreError> {
            Ok(0)
        }

        async fn get(&self, _: ReminderId) -> Result<Option<Reminder>, StoreError> {
            Ok(None)
        }

        async fn insert(&self, _: NewReminder) -> Result<Reminder, NudgeError> {
            Err(StoreError::Backend("read only".into()).into())
        }
    }

    #[tokio::test]
    async fn failed_claim_abandons_the_tick() {
        let h = Harness::new();
        let err = h.scheduler_over(Arc::new(BrokenClaims)).tick().await.unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)));
        assert_eq!(h.gateway.sent_count(), 0);
    }
}
