//! DeliveryAdapter - push gateway を `DispatchOutcome` に写す境界
//!
//! # 方針
//! - 1 回の `send` で外部呼び出しは最大 1 回。リトライはしない
//! - provider のエラーは `PushError::is_permanent` で permanent / transient に分類
//! - timeout は transient と同じ扱い
//! - 呼び出し元には決して Err を返さない

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::domain::{DispatchOutcome, Reminder};
use crate::impls::token_preview;
use crate::ports::{PushGateway, PushMessage};

/// Data keys carried with every reminder notification.
pub const DATA_REMINDER_ID: &str = "reminder_id";
pub const DATA_REMINDER_TYPE: &str = "reminder_type";
pub const DATA_NOTIFICATION_TYPE: &str = "notification_type";

pub struct DeliveryAdapter {
    gateway: Arc<dyn PushGateway>,
    send_timeout: Duration,
}

impl DeliveryAdapter {
    pub fn new(gateway: Arc<dyn PushGateway>, send_timeout: Duration) -> Self {
        Self {
            gateway,
            send_timeout,
        }
    }

    pub fn gateway_name(&self) -> &'static str {
        self.gateway.name()
    }

    /// Deliver one notification.
    ///
    /// An empty token or a blank title/body can never be delivered and maps to
    /// `FailedPermanent` without calling the gateway.
    pub async fn send(
        &self,
        device_token: &str,
        title: &str,
        body: &str,
        data: BTreeMap<String, String>,
    ) -> DispatchOutcome {
        if device_token.trim().is_empty() {
            tracing::warn!("refusing to send: empty device token");
            return DispatchOutcome::FailedPermanent;
        }
        if title.trim().is_empty() || body.trim().is_empty() {
            tracing::warn!(
                token = %token_preview(device_token),
                "refusing to send: blank title or body"
            );
            return DispatchOutcome::FailedPermanent;
        }

        let message = PushMessage {
            device_token: device_token.to_string(),
            title: title.to_string(),
            body: body.to_string(),
            data,
        };

        match tokio::time::timeout(self.send_timeout, self.gateway.send(&message)).await {
            Ok(Ok(message_id)) => {
                tracing::debug!(
                    gateway = self.gateway.name(),
                    token = %token_preview(device_token),
                    %message_id,
                    "push accepted"
                );
                DispatchOutcome::Sent
            }
            Ok(Err(err)) if err.is_permanent() => {
                tracing::warn!(
                    gateway = self.gateway.name(),
                    token = %token_preview(device_token),
                    error = %err,
                    "push rejected permanently"
                );
                DispatchOutcome::FailedPermanent
            }
            Ok(Err(err)) => {
                tracing::warn!(
                    gateway = self.gateway.name(),
                    token = %token_preview(device_token),
                    error = %err,
                    "push failed"
                );
                DispatchOutcome::FailedTransient
            }
            Err(_elapsed) => {
                tracing::warn!(
                    gateway = self.gateway.name(),
                    token = %token_preview(device_token),
                    timeout_ms = self.send_timeout.as_millis() as u64,
                    "push timed out"
                );
                DispatchOutcome::FailedTransient
            }
        }
    }
}

/// Push data for a reminder notification.
pub fn reminder_data(reminder: &Reminder) -> BTreeMap<String, String> {
    BTreeMap::from([
        (DATA_REMINDER_ID.to_string(), reminder.id.to_string()),
        (
            DATA_REMINDER_TYPE.to_string(),
            reminder.reminder_type.as_str().to_string(),
        ),
        (DATA_NOTIFICATION_TYPE.to_string(), "reminder".to_string()),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::ScriptedGateway;
    use crate::ports::PushError;
    use rstest::rstest;

    fn adapter(gateway: Arc<ScriptedGateway>, timeout: Duration) -> DeliveryAdapter {
        DeliveryAdapter::new(gateway, timeout)
    }

    #[tokio::test]
    async fn accepted_push_is_sent() {
        let gw = Arc::new(ScriptedGateway::new());
        let outcome = adapter(gw.clone(), Duration::from_secs(1))
            .send("token-1", "Breathe", "Two minutes", BTreeMap::new())
            .await;

        assert_eq!(outcome, DispatchOutcome::Sent);
        let sent = gw.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].device_token, "token-1");
        assert_eq!(sent[0].title, "Breathe");
    }

    #[rstest]
    #[case(PushError::Unregistered, DispatchOutcome::FailedPermanent)]
    #[case(PushError::InvalidToken("bad".into()), DispatchOutcome::FailedPermanent)]
    #[case(PushError::Network("reset".into()), DispatchOutcome::FailedTransient)]
    #[case(PushError::Timeout, DispatchOutcome::FailedTransient)]
    #[case(PushError::Unavailable("503".into()), DispatchOutcome::FailedTransient)]
    #[case(PushError::Rejected("teapot".into()), DispatchOutcome::FailedTransient)]
    #[tokio::test]
    async fn provider_errors_map_to_outcomes(
        #[case] error: PushError,
        #[case] expected: DispatchOutcome,
    ) {
        let gw = Arc::new(ScriptedGateway::new());
        gw.fail_token("tok", error);
        let outcome = adapter(gw, Duration::from_secs(1))
            .send("tok", "t", "b", BTreeMap::new())
            .await;
        assert_eq!(outcome, expected);
    }

    #[rstest]
    #[case("", "title", "body")]
    #[case("tok", "  ", "body")]
    #[case("tok", "title", "")]
    #[tokio::test]
    async fn undeliverable_input_is_permanent_without_a_call(
        #[case] token: &str,
        #[case] title: &str,
        #[case] body: &str,
    ) {
        let gw = Arc::new(ScriptedGateway::new());
        let outcome = adapter(gw.clone(), Duration::from_secs(1))
            .send(token, title, body, BTreeMap::new())
            .await;
        assert_eq!(outcome, DispatchOutcome::FailedPermanent);
        assert_eq!(gw.sent_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_gateway_times_out_as_transient() {
        let gw = Arc::new(ScriptedGateway::new());
        gw.delay_token("slow", Duration::from_secs(30));
        let outcome = adapter(gw, Duration::from_millis(100))
            .send("slow", "t", "b", BTreeMap::new())
            .await;
        assert_eq!(outcome, DispatchOutcome::FailedTransient);
    }
}
