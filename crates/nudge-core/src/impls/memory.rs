//! In-memory reminder store and user directory (開発用・テスト用)
//!
//! # 実装詳細
//! - `HashMap<ReminderId, Entry>` を tokio の Mutex で保護
//! - claim は Entry 上のフラグ。`claim_due` はロックを握ったまま
//!   検索と claim を行うのでアトミック

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::domain::{
    DueWindow, NewReminder, NudgeError, Reminder, ReminderId, ReminderStatus, StoreError, UserId,
    UserProfile,
};
use crate::ports::{
    Clock, IdGenerator, ReminderStore, UlidGenerator, UpdateResult, UserDirectory,
};

#[derive(Debug, Clone)]
struct Entry {
    reminder: Reminder,
    claimed: bool,
}

impl Entry {
    fn is_due(&self, window: &DueWindow) -> bool {
        self.reminder.status.is_dispatchable()
            && self.reminder.is_active
            && window.contains(self.reminder.trigger_time)
    }
}

pub struct InMemoryReminderStore {
    entries: Arc<Mutex<HashMap<ReminderId, Entry>>>,
    ids: Box<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
}

impl InMemoryReminderStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            ids: Box::new(UlidGenerator::new(Arc::clone(&clock))),
            clock,
        }
    }

    /// Store a fully-formed reminder as is (status and timestamps included).
    pub async fn put(&self, reminder: Reminder) {
        let mut entries = self.entries.lock().await;
        entries.insert(
            reminder.id,
            Entry {
                reminder,
                claimed: false,
            },
        );
    }

    pub async fn is_claimed(&self, id: ReminderId) -> bool {
        let entries = self.entries.lock().await;
        entries.get(&id).is_some_and(|e| e.claimed)
    }
}

#[async_trait]
impl ReminderStore for InMemoryReminderStore {
    async fn find_due(&self, window: &DueWindow) -> Result<Vec<Reminder>, StoreError> {
        let entries = self.entries.lock().await;
        let mut due: Vec<Reminder> = entries
            .values()
            .filter(|e| e.is_due(window))
            .map(|e| e.reminder.clone())
            .collect();
        due.sort_by_key(|r| r.trigger_time);
        Ok(due)
    }

    async fn claim_due(&self, window: &DueWindow) -> Result<Vec<Reminder>, StoreError> {
        let mut entries = self.entries.lock().await;
        let mut claimed: Vec<Reminder> = entries
            .values_mut()
            .filter(|e| !e.claimed && e.is_due(window))
            .map(|e| {
                e.claimed = true;
                e.reminder.clone()
            })
            .collect();
        claimed.sort_by_key(|r| r.trigger_time);
        Ok(claimed)
    }

    async fn update_status(
        &self,
        id: ReminderId,
        status: ReminderStatus,
        trigger_time: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<UpdateResult, StoreError> {
        let mut entries = self.entries.lock().await;
        let Some(entry) = entries.get_mut(&id) else {
            return Ok(UpdateResult::NotFound);
        };
        entry.reminder.status = status;
        if let Some(trigger_time) = trigger_time {
            entry.reminder.trigger_time = trigger_time;
        }
        entry.reminder.updated_at = now;
        entry.claimed = false;
        Ok(UpdateResult::Updated)
    }

    async fn release(&self, id: ReminderId) -> Result<UpdateResult, StoreError> {
        let mut entries = self.entries.lock().await;
        match entries.get_mut(&id) {
            Some(entry) => {
                entry.claimed = false;
                Ok(UpdateResult::Updated)
            }
            None => Ok(UpdateResult::NotFound),
        }
    }

    async fn release_stale_claims(&self) -> Result<usize, StoreError> {
        let mut entries = self.entries.lock().await;
        let mut released = 0;
        for entry in entries.values_mut().filter(|e| e.claimed) {
            entry.claimed = false;
            released += 1;
        }
        Ok(released)
    }

    async fn get(&self, id: ReminderId) -> Result<Option<Reminder>, StoreError> {
        let entries = self.entries.lock().await;
        Ok(entries.get(&id).map(|e| e.reminder.clone()))
    }

    async fn insert(&self, reminder: NewReminder) -> Result<Reminder, NudgeError> {
        let reminder = reminder.into_reminder(self.ids.generate_reminder_id(), self.clock.now())?;
        self.put(reminder.clone()).await;
        Ok(reminder)
    }
}

#[derive(Default)]
pub struct InMemoryUserDirectory {
    users: Mutex<HashMap<UserId, UserProfile>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn upsert(&self, user: UserProfile) {
        self.users.lock().await.insert(user.id, user);
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn get(&self, user_id: UserId) -> Result<Option<UserProfile>, StoreError> {
        Ok(self.users.lock().await.get(&user_id).cloned())
    }
}
