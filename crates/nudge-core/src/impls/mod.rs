//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **InMemoryReminderStore / InMemoryUserDirectory**: 開発用・テスト用
//! - **SqliteStore**: reminder と user を 1 つの SQLite DB に保存
//! - **FcmGateway**: Firebase Cloud Messaging HTTP v1
//! - **LogGateway**: ログに出すだけの dry-run
//! - **ScriptedGateway**: 結果を仕込めるテスト用 gateway

pub mod fcm;
pub mod log_gateway;
pub mod memory;
pub mod scripted;
pub mod sqlite;

pub use self::fcm::{DEFAULT_FCM_ENDPOINT, FcmGateway};
pub use self::log_gateway::LogGateway;
pub use self::memory::{InMemoryReminderStore, InMemoryUserDirectory};
pub use self::scripted::ScriptedGateway;
pub use self::sqlite::SqliteStore;

/// First 10 characters of a device token, for logs.
pub(crate) fn token_preview(token: &str) -> String {
    let head: String = token.chars().take(10).collect();
    format!("{head}...")
}
