//! PushGateway port - 外部 push 配信サービス（FCM など）の境界
//!
//! provider 固有のエラー語彙はここで [`PushError`] に閉じ込めます。
//! scheduler は `PushError` すら見ず、`DeliveryAdapter` が
//! `DispatchOutcome` に写したものだけを扱います。

use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

/// One notification to one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PushMessage {
    pub device_token: String,
    pub title: String,
    pub body: String,
    /// Structured data delivered alongside the notification (string values only,
    /// as FCM requires).
    pub data: BTreeMap<String, String>,
}

/// Provider failure vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PushError {
    #[error("device token is not registered")]
    Unregistered,

    #[error("device token is invalid: {0}")]
    InvalidToken(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out")]
    Timeout,

    #[error("push service unavailable: {0}")]
    Unavailable(String),

    #[error("push service rejected the request: {0}")]
    Rejected(String),
}

impl PushError {
    /// Only a dead token is permanent. Everything else is treated as transient
    /// and left to the due-window aging to bound.
    pub fn is_permanent(&self) -> bool {
        matches!(self, PushError::Unregistered | PushError::InvalidToken(_))
    }
}

/// A push delivery provider. One call, one outbound request, no retries.
#[async_trait]
pub trait PushGateway: Send + Sync {
    /// Returns the provider's message id on success.
    async fn send(&self, message: &PushMessage) -> Result<String, PushError>;

    /// Short name for logs ("fcm", "log", ...).
    fn name(&self) -> &'static str;
}
