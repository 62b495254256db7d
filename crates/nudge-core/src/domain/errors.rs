//! Errors - エラー型と分類
//!
//! 配信結果（sent / failed-transient / ...）はエラーではなく値として
//! [`DispatchOutcome`](super::DispatchOutcome) で表現します。
//! ここにあるのはインフラ・入力・設定の失敗だけです。

use thiserror::Error;

use super::ids::ParseIdError;

/// Failure of the persistent reminder store or the user directory backend.
///
/// "Not found" is not an error: lookups return `Option`, updates return
/// [`UpdateResult`](crate::ports::UpdateResult).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),

    #[error("corrupt row for {entity}: {reason}")]
    Corrupt { entity: String, reason: String },

    #[error("invalid id in store: {0}")]
    Id(#[from] ParseIdError),

    #[error("store worker panicked or was cancelled: {0}")]
    Join(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(err: tokio::task::JoinError) -> Self {
        StoreError::Join(err.to_string())
    }
}

/// Reminder field validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} must not be empty")]
    Empty { field: &'static str },

    #[error("unknown {field} value {value:?}")]
    UnknownVariant { field: &'static str, value: String },
}

/// Configuration could not be loaded or is inconsistent.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level error for operations that cross several layers.
#[derive(Debug, Error)]
pub enum NudgeError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
