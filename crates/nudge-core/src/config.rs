//! Configuration surface: TOML file, every field defaulted.
//!
//! ```toml
//! [scheduler]
//! tick_interval_secs = 60
//! window_slack_secs = 120
//! send_timeout_secs = 10
//! max_concurrent_dispatches = 8
//!
//! [gateway]
//! kind = "fcm"
//! project_id = "my-project"
//!
//! [store]
//! database_path = "nudge.db"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::ConfigError;
use crate::impls::DEFAULT_FCM_ENDPOINT;

/// Env var that overrides `gateway.access_token`.
pub const FCM_ACCESS_TOKEN_ENV: &str = "FCM_ACCESS_TOKEN";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NudgeConfig {
    pub scheduler: SchedulerConfig,
    pub gateway: GatewayConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub tick_interval_secs: u64,
    pub window_slack_secs: u64,
    pub send_timeout_secs: u64,
    /// Upper bound on gateway calls in flight within one tick.
    pub max_concurrent_dispatches: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 60,
            window_slack_secs: 120,
            send_timeout_secs: 10,
            max_concurrent_dispatches: 8,
        }
    }
}

impl SchedulerConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn window_slack(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.window_slack_secs as i64)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "scheduler.tick_interval_secs must be > 0".into(),
            ));
        }
        if self.send_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "scheduler.send_timeout_secs must be > 0".into(),
            ));
        }
        // A slack shorter than the tick lets reminders fall between two windows.
        if self.window_slack_secs < self.tick_interval_secs {
            return Err(ConfigError::Invalid(format!(
                "scheduler.window_slack_secs ({}) must be >= tick_interval_secs ({})",
                self.window_slack_secs, self.tick_interval_secs
            )));
        }
        if self.window_slack_secs > i64::MAX as u64 / 1000 {
            return Err(ConfigError::Invalid(
                "scheduler.window_slack_secs is out of range".into(),
            ));
        }
        if self.max_concurrent_dispatches == 0 {
            return Err(ConfigError::Invalid(
                "scheduler.max_concurrent_dispatches must be >= 1".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayKind {
    /// Dry run: log every notification instead of sending it.
    Log,
    Fcm,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// No default: a gateway has to be chosen before anything is sent.
    pub kind: Option<GatewayKind>,
    pub project_id: Option<String>,
    pub endpoint: String,
    pub access_token: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            kind: None,
            project_id: None,
            endpoint: DEFAULT_FCM_ENDPOINT.to_string(),
            access_token: None,
        }
    }
}

impl GatewayConfig {
    /// The gateway to build. `dry_run` forces the log gateway.
    pub fn resolve_kind(&self, dry_run: bool) -> Result<GatewayKind, ConfigError> {
        if dry_run {
            return Ok(GatewayKind::Log);
        }
        self.kind.ok_or_else(|| {
            ConfigError::Invalid(
                "no push gateway configured: set gateway.kind = \"fcm\" \
                 (or \"log\" / --dry-run to only log notifications)"
                    .into(),
            )
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.kind == Some(GatewayKind::Fcm) {
            if self.project_id.as_deref().is_none_or(|p| p.trim().is_empty()) {
                return Err(ConfigError::Invalid(
                    "gateway.project_id is required for kind = \"fcm\"".into(),
                ));
            }
            if self.access_token.as_deref().is_none_or(|t| t.trim().is_empty()) {
                return Err(ConfigError::Invalid(format!(
                    "gateway.access_token (or {FCM_ACCESS_TOKEN_ENV}) is required for kind = \"fcm\""
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub database_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("nudge.db"),
        }
    }
}

impl NudgeConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Read a config file. Does not apply env overrides or validate.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(token) = lookup(FCM_ACCESS_TOKEN_ENV).filter(|t| !t.trim().is_empty()) {
            self.gateway.access_token = Some(token);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scheduler.validate()?;
        self.gateway.validate()
    }
}
