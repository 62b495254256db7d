//! SQLite-backed reminder store and user directory.
//!
//! # 実装詳細
//! - rusqlite の `Connection` は同期 API なので、`std::sync::Mutex` で保護し
//!   `spawn_blocking` の中で使う
//! - 時刻は UTC の epoch millis（INTEGER）で保存。範囲検索がそのまま効く
//! - claim は `reminders.claimed` 列。`claim_due` は IMMEDIATE トランザクションで
//!   SELECT と UPDATE を行う
//! - user を消すと reminder も消える（ON DELETE CASCADE）

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};

use crate::domain::{
    DueWindow, NewReminder, NudgeError, Reminder, ReminderId, ReminderStatus, StoreError, UserId,
    UserProfile,
};
use crate::ports::{Clock, IdGenerator, ReminderStore, UlidGenerator, UpdateResult, UserDirectory};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    id           TEXT PRIMARY KEY,
    is_active    INTEGER NOT NULL DEFAULT 1,
    device_token TEXT
);

CREATE TABLE IF NOT EXISTS reminders (
    id              TEXT PRIMARY KEY,
    user_id         TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    reminder_type   TEXT NOT NULL,
    title           TEXT NOT NULL,
    message         TEXT NOT NULL,
    trigger_time_ms INTEGER NOT NULL,
    frequency       TEXT NOT NULL,
    status          TEXT NOT NULL DEFAULT 'pending',
    is_active       INTEGER NOT NULL DEFAULT 1,
    claimed         INTEGER NOT NULL DEFAULT 0,
    created_at_ms   INTEGER NOT NULL,
    updated_at_ms   INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_reminders_due ON reminders (status, trigger_time_ms);
";

const REMINDER_COLUMNS: &str = "id, user_id, reminder_type, title, message, trigger_time_ms, \
     frequency, status, is_active, created_at_ms, updated_at_ms";

const DUE_FILTER: &str = "status = 'pending' AND is_active = 1 \
     AND trigger_time_ms > ?1 AND trigger_time_ms <= ?2";

/// Reminder row as stored, before parsing.
struct ReminderRow {
    id: String,
    user_id: String,
    reminder_type: String,
    title: String,
    message: String,
    trigger_time_ms: i64,
    frequency: String,
    status: String,
    is_active: bool,
    created_at_ms: i64,
    updated_at_ms: i64,
}

impl ReminderRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            reminder_type: row.get(2)?,
            title: row.get(3)?,
            message: row.get(4)?,
            trigger_time_ms: row.get(5)?,
            frequency: row.get(6)?,
            status: row.get(7)?,
            is_active: row.get(8)?,
            created_at_ms: row.get(9)?,
            updated_at_ms: row.get(10)?,
        })
    }

    fn into_reminder(self) -> Result<Reminder, StoreError> {
        let corrupt = |reason: String| StoreError::Corrupt {
            entity: format!("reminder {}", self.id),
            reason,
        };
        Ok(Reminder {
            id: self.id.parse()?,
            user_id: self.user_id.parse()?,
            reminder_type: self.reminder_type.parse().map_err(|e| corrupt(format!("{e}")))?,
            title: self.title.clone(),
            message: self.message.clone(),
            trigger_time: from_millis(self.trigger_time_ms).ok_or_else(|| corrupt("trigger_time".into()))?,
            frequency: self.frequency.parse().map_err(|e| corrupt(format!("{e}")))?,
            status: self.status.parse().map_err(|e| corrupt(format!("{e}")))?,
            is_active: self.is_active,
            created_at: from_millis(self.created_at_ms).ok_or_else(|| corrupt("created_at".into()))?,
            updated_at: from_millis(self.updated_at_ms).ok_or_else(|| corrupt("updated_at".into()))?,
        })
    }
}

fn from_millis(ms: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
}

fn query_due(conn: &Connection, window: &DueWindow, unclaimed_only: bool) -> Result<Vec<Reminder>, StoreError> {
    let claim_filter = if unclaimed_only { " AND claimed = 0" } else { "" };
    let sql = format!(
        "SELECT {REMINDER_COLUMNS} FROM reminders WHERE {DUE_FILTER}{claim_filter} \
         ORDER BY trigger_time_ms"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        params![window.start.timestamp_millis(), window.end.timestamp_millis()],
        ReminderRow::from_row,
    )?;
    let mut reminders = Vec::new();
    for row in rows {
        reminders.push(row?.into_reminder()?);
    }
    Ok(reminders)
}

/// One SQLite database holding both reminders and users.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
}

impl SqliteStore {
    pub fn open(path: &Path, clock: Arc<dyn Clock>) -> Result<Self, StoreError> {
        Self::with_connection(Connection::open(path)?, clock)
    }

    pub fn open_in_memory(clock: Arc<dyn Clock>) -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?, clock)
    }

    fn with_connection(conn: Connection, clock: Arc<dyn Clock>) -> Result<Self, StoreError> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            ids: Arc::new(UlidGenerator::new(Arc::clone(&clock))),
            clock,
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn blocking<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|e| StoreError::Backend(format!("connection lock poisoned: {e}")))?;
            f(&mut guard)
        })
        .await?
    }

    pub async fn upsert_user(&self, user: UserProfile) -> Result<(), StoreError> {
        self.blocking(move |conn| {
            conn.execute(
                "INSERT INTO users (id, is_active, device_token) VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET is_active = excluded.is_active,
                                               device_token = excluded.device_token",
                params![user.id.to_string(), user.is_active, user.device_token],
            )?;
            Ok(())
        })
        .await
    }

    /// Delete a user and, by cascade, their reminders.
    pub async fn delete_user(&self, user_id: UserId) -> Result<bool, StoreError> {
        self.blocking(move |conn| {
            let n = conn.execute("DELETE FROM users WHERE id = ?1", params![user_id.to_string()])?;
            Ok(n > 0)
        })
        .await
    }

    pub async fn is_claimed(&self, id: ReminderId) -> Result<bool, StoreError> {
        self.blocking(move |conn| {
            let claimed: Option<bool> = conn
                .query_row(
                    "SELECT claimed FROM reminders WHERE id = ?1",
                    params![id.to_string()],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(claimed.unwrap_or(false))
        })
        .await
    }
}

#[async_trait]
impl ReminderStore for SqliteStore {
    async fn find_due(&self, window: &DueWindow) -> Result<Vec<Reminder>, StoreError> {
        let window = *window;
        self.blocking(move |conn| query_due(conn, &window, false)).await
    }

    async fn claim_due(&self, window: &DueWindow) -> Result<Vec<Reminder>, StoreError> {
        let window = *window;
        self.blocking(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let due = query_due(&tx, &window, true)?;
            {
                let mut claim = tx.prepare("UPDATE reminders SET claimed = 1 WHERE id = ?1")?;
                for reminder in &due {
                    claim.execute(params![reminder.id.to_string()])?;
                }
            }
            tx.commit()?;
            Ok(due)
        })
        .await
    }

    async fn update_status(
        &self,
        id: ReminderId,
        status: ReminderStatus,
        trigger_time: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<UpdateResult, StoreError> {
        self.blocking(move |conn| {
            let n = conn.execute(
                "UPDATE reminders
                 SET status = ?2,
                     trigger_time_ms = COALESCE(?3, trigger_time_ms),
                     updated_at_ms = ?4,
                     claimed = 0
                 WHERE id = ?1",
                params![
                    id.to_string(),
                    status.as_str(),
                    trigger_time.map(|t| t.timestamp_millis()),
                    now.timestamp_millis(),
                ],
            )?;
            Ok(if n == 0 { UpdateResult::NotFound } else { UpdateResult::Updated })
        })
        .await
    }

    async fn release(&self, id: ReminderId) -> Result<UpdateResult, StoreError> {
        self.blocking(move |conn| {
            let n = conn.execute(
                "UPDATE reminders SET claimed = 0 WHERE id = ?1",
                params![id.to_string()],
            )?;
            Ok(if n == 0 { UpdateResult::NotFound } else { UpdateResult::Updated })
        })
        .await
    }

    async fn release_stale_claims(&self) -> Result<usize, StoreError> {
        self.blocking(|conn| Ok(conn.execute("UPDATE reminders SET claimed = 0 WHERE claimed = 1", [])?))
            .await
    }

    async fn get(&self, id: ReminderId) -> Result<Option<Reminder>, StoreError> {
        self.blocking(move |conn| {
            let row = conn
                .query_row(
                    &format!("SELECT {REMINDER_COLUMNS} FROM reminders WHERE id = ?1"),
                    params![id.to_string()],
                    ReminderRow::from_row,
                )
                .optional()?;
            row.map(ReminderRow::into_reminder).transpose()
        })
        .await
    }

    async fn insert(&self, reminder: NewReminder) -> Result<Reminder, NudgeError> {
        let mut reminder = reminder.into_reminder(self.ids.generate_reminder_id(), self.clock.now())?;
        // columns hold millis; hand back exactly what `get` will load
        reminder.trigger_time = reminder.trigger_time.trunc_subsecs(3);
        reminder.created_at = reminder.created_at.trunc_subsecs(3);
        reminder.updated_at = reminder.updated_at.trunc_subsecs(3);
        let row = reminder.clone();
        self.blocking(move |conn| {
            conn.execute(
                &format!(
                    "INSERT INTO reminders ({REMINDER_COLUMNS}) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
                ),
                params![
                    row.id.to_string(),
                    row.user_id.to_string(),
                    row.reminder_type.as_str(),
                    row.title,
                    row.message,
                    row.trigger_time.timestamp_millis(),
                    row.frequency.as_str(),
                    row.status.as_str(),
                    row.is_active,
                    row.created_at.timestamp_millis(),
                    row.updated_at.timestamp_millis(),
                ],
            )?;
            Ok(())
        })
        .await?;
        Ok(reminder)
    }
}

#[async_trait]
impl UserDirectory for SqliteStore {
    async fn get(&self, user_id: UserId) -> Result<Option<UserProfile>, StoreError> {
        self.blocking(move |conn| {
            let row = conn
                .query_row(
                    "SELECT is_active, device_token FROM users WHERE id = ?1",
                    params![user_id.to_string()],
                    |row| Ok((row.get::<_, bool>(0)?, row.get::<_, Option<String>>(1)?)),
                )
                .optional()?;
            Ok(row.map(|(is_active, device_token)| UserProfile {
                id: user_id,
                is_active,
                device_token,
            }))
        })
        .await
    }
}
