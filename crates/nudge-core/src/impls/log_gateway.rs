//! Dry-run push gateway: logs the message and reports success.
//!
//! Only built when asked for (`gateway.kind = "log"` or `--dry-run`): the
//! scheduler treats every logged message as delivered, so due reminders are
//! completed or rescheduled without reaching a device.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::ports::{PushError, PushGateway, PushMessage};

#[derive(Debug, Default)]
pub struct LogGateway {
    sent: AtomicU64,
}

impl LogGateway {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PushGateway for LogGateway {
    async fn send(&self, message: &PushMessage) -> Result<String, PushError> {
        let n = self.sent.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::info!(
            token = %super::token_preview(&message.device_token),
            title = %message.title,
            data = ?message.data,
            "dry-run push: {}",
            message.body
        );
        Ok(format!("log-{n}"))
    }

    fn name(&self) -> &'static str {
        "log"
    }
}
