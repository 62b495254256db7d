//! ScriptedGateway - 結果を事前に仕込める push gateway（テスト用・開発用）
//!
//! token ごとに返す結果（あるいは遅延）を設定でき、送信されたメッセージを
//! すべて記録します。

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::ports::{PushError, PushGateway, PushMessage};

#[derive(Debug, Clone)]
enum Script {
    Fail(PushError),
    Hang(Duration),
}

#[derive(Debug, Default)]
pub struct ScriptedGateway {
    scripts: Mutex<HashMap<String, Script>>,
    sent: Mutex<Vec<PushMessage>>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every send to `token` fails with `error`.
    pub fn fail_token(&self, token: &str, error: PushError) {
        self.lock_scripts().insert(token.to_string(), Script::Fail(error));
    }

    /// Every send to `token` sleeps for `delay` before succeeding.
    pub fn delay_token(&self, token: &str, delay: Duration) {
        self.lock_scripts().insert(token.to_string(), Script::Hang(delay));
    }

    /// Messages handed to `send`, in call order (failed ones included).
    pub fn sent(&self) -> Vec<PushMessage> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn lock_scripts(&self) -> std::sync::MutexGuard<'_, HashMap<String, Script>> {
        self.scripts.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl PushGateway for ScriptedGateway {
    async fn send(&self, message: &PushMessage) -> Result<String, PushError> {
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(message.clone());

        let script = self.lock_scripts().get(&message.device_token).cloned();
        match script {
            Some(Script::Fail(error)) => Err(error),
            Some(Script::Hang(delay)) => {
                tokio::time::sleep(delay).await;
                Ok(format!("scripted-{}", message.device_token))
            }
            None => Ok(format!("scripted-{}", message.device_token)),
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}
