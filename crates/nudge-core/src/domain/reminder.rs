//! Reminder model: the unit of scheduled work.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::errors::ValidationError;
use super::ids::{ReminderId, UserId};
use super::state::ReminderStatus;

/// What the reminder is about. Carried to the device in the push data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderType {
    Meditation,
    Exercise,
    MindfulEating,
    Break,
    Custom,
}

impl ReminderType {
    pub const ALL: [ReminderType; 5] = [
        ReminderType::Meditation,
        ReminderType::Exercise,
        ReminderType::MindfulEating,
        ReminderType::Break,
        ReminderType::Custom,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ReminderType::Meditation => "meditation",
            ReminderType::Exercise => "exercise",
            ReminderType::MindfulEating => "mindful_eating",
            ReminderType::Break => "break",
            ReminderType::Custom => "custom",
        }
    }
}

impl fmt::Display for ReminderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReminderType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ReminderType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownVariant {
                field: "reminder_type",
                value: s.to_string(),
            })
    }
}

/// How often a reminder recurs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    #[serde(rename = "one-time")]
    OneTime,
    Hourly,
    Daily,
    Weekly,
    Monthly,
}

impl Frequency {
    pub const ALL: [Frequency; 5] = [
        Frequency::OneTime,
        Frequency::Hourly,
        Frequency::Daily,
        Frequency::Weekly,
        Frequency::Monthly,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Frequency::OneTime => "one-time",
            Frequency::Hourly => "hourly",
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
            Frequency::Monthly => "monthly",
        }
    }

    pub fn is_recurring(self) -> bool {
        !matches!(self, Frequency::OneTime)
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Frequency::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownVariant {
                field: "frequency",
                value: s.to_string(),
            })
    }
}

/// A persisted reminder.
///
/// Invariant: while `status == Pending`, `trigger_time` is the one and only
/// instant left to evaluate for this reminder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reminder {
    pub id: ReminderId,
    pub user_id: UserId,
    pub reminder_type: ReminderType,
    pub title: String,
    pub message: String,
    pub trigger_time: DateTime<Utc>,
    pub frequency: Frequency,
    pub status: ReminderStatus,

    /// Reminders switched off by their owner are never claimed.
    pub is_active: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a reminder. The store assigns the id and timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewReminder {
    pub user_id: UserId,
    pub reminder_type: ReminderType,
    pub title: String,
    pub message: String,
    pub trigger_time: DateTime<Utc>,
    pub frequency: Frequency,
}

impl NewReminder {
    /// Title and message are required and must not be blank.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError::Empty { field: "title" });
        }
        if self.message.trim().is_empty() {
            return Err(ValidationError::Empty { field: "message" });
        }
        Ok(())
    }

    /// Build the stored form. New reminders always start `Pending` and active.
    pub fn into_reminder(self, id: ReminderId, now: DateTime<Utc>) -> Result<Reminder, ValidationError> {
        self.validate()?;
        Ok(Reminder {
            id,
            user_id: self.user_id,
            reminder_type: self.reminder_type,
            title: self.title,
            message: self.message,
            trigger_time: self.trigger_time,
            frequency: self.frequency,
            status: ReminderStatus::Pending,
            is_active: true,
            created_at: now,
            updated_at: now,
        })
    }
}
