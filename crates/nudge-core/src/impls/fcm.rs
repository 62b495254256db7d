//! Firebase Cloud Messaging (HTTP v1) push gateway.
//!
//! The OAuth2 access token is supplied from outside (config or
//! `FCM_ACCESS_TOKEN`); minting and refreshing it is not done here.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::ports::{PushError, PushGateway, PushMessage};

pub const DEFAULT_FCM_ENDPOINT: &str = "https://fcm.googleapis.com";

pub struct FcmGateway {
    client: reqwest::Client,
    send_url: String,
    access_token: String,
}

impl FcmGateway {
    pub fn new(endpoint: &str, project_id: &str, access_token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            send_url: format!(
                "{}/v1/projects/{}/messages:send",
                endpoint.trim_end_matches('/'),
                project_id
            ),
            access_token: access_token.into(),
        }
    }

    pub fn send_url(&self) -> &str {
        &self.send_url
    }

    /// Request body for one message. High priority on Android, default sound
    /// and a badge on iOS.
    pub fn request_body(message: &PushMessage) -> serde_json::Value {
        json!({
            "message": {
                "token": message.device_token,
                "notification": {
                    "title": message.title,
                    "body": message.body,
                },
                "data": message.data,
                "android": {
                    "priority": "high",
                    "notification": {
                        "sound": "default",
                        "visibility": "PUBLIC",
                    },
                },
                "apns": {
                    "payload": {
                        "aps": {
                            "sound": "default",
                            "badge": 1,
                            "content-available": 1,
                        },
                    },
                },
            }
        })
    }
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    error: ErrorBody,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    details: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(rename = "errorCode")]
    error_code: Option<String>,
}

/// Map an FCM error response onto the provider-neutral vocabulary.
pub fn classify_error(http_status: u16, body: &str) -> PushError {
    let envelope: ErrorEnvelope = serde_json::from_str(body).unwrap_or_default();
    let error = envelope.error;
    let fcm_code = error
        .details
        .iter()
        .find_map(|d| d.error_code.clone())
        .unwrap_or_default();
    let message = if error.message.is_empty() {
        format!("HTTP {http_status}")
    } else {
        error.message
    };

    match (fcm_code.as_str(), error.status.as_str(), http_status) {
        ("UNREGISTERED", _, _) | (_, "NOT_FOUND", 404) => PushError::Unregistered,
        ("INVALID_ARGUMENT" | "SENDER_ID_MISMATCH", _, _) | (_, "INVALID_ARGUMENT", 400) => {
            PushError::InvalidToken(message)
        }
        ("QUOTA_EXCEEDED" | "UNAVAILABLE" | "INTERNAL", _, _) => PushError::Unavailable(message),
        (_, _, 401 | 403) => PushError::Unavailable(format!("authentication failed: {message}")),
        (_, _, 429 | 500..=599) => PushError::Unavailable(message),
        _ => PushError::Rejected(message),
    }
}

#[async_trait]
impl PushGateway for FcmGateway {
    async fn send(&self, message: &PushMessage) -> Result<String, PushError> {
        let response = self
            .client
            .post(&self.send_url)
            .bearer_auth(&self.access_token)
            .json(&Self::request_body(message))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PushError::Timeout
                } else {
                    PushError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if status.is_success() {
            let sent: SendResponse = response
                .json()
                .await
                .map_err(|e| PushError::Network(format!("unreadable FCM response: {e}")))?;
            return Ok(sent.name);
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify_error(status.as_u16(), &body))
    }

    fn name(&self) -> &'static str {
        "fcm"
    }
}
