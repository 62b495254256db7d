//! Domain model (IDs, reminders, status, outcomes, decisions, ...).
//!
//! ドメイン層は I/O を持ちません。時刻は引数で受け取り、
//! 永続化・配信は ports 経由で app 層が行います。

pub mod decision;
pub mod errors;
pub mod ids;
pub mod outcome;
pub mod recurrence;
pub mod reminder;
pub mod state;
pub mod user;
pub mod window;

pub use decision::{Decider, DefaultDecider, Transition};
pub use errors::{ConfigError, NudgeError, StoreError, ValidationError};
pub use ids::{ParseIdError, ReminderId, UserId};
pub use outcome::DispatchOutcome;
pub use recurrence::next_occurrence;
pub use reminder::{Frequency, NewReminder, Reminder, ReminderType};
pub use state::ReminderStatus;
pub use user::UserProfile;
pub use window::DueWindow;
