//! Dispatch outcome: the result of attempting one occurrence.
//!
//! Ephemeral. It drives the status transition and is reported in tick
//! statistics, but it is never persisted on its own.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DispatchOutcome {
    /// The provider accepted the notification.
    Sent,

    /// The owner has no device token. No delivery attempt was made.
    SkippedNoToken,

    /// The owner is inactive or gone. No delivery attempt was made.
    SkippedInactiveUser,

    /// Network, timeout or provider-side error. Worth trying again.
    FailedTransient,

    /// The token is unregistered/invalid or the input can never be delivered.
    FailedPermanent,
}

impl DispatchOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            DispatchOutcome::Sent => "sent",
            DispatchOutcome::SkippedNoToken => "skipped-no-token",
            DispatchOutcome::SkippedInactiveUser => "skipped-inactive-user",
            DispatchOutcome::FailedTransient => "failed-transient",
            DispatchOutcome::FailedPermanent => "failed-permanent",
        }
    }

    /// Did this outcome involve a call to the push gateway?
    pub fn attempted_delivery(self) -> bool {
        !matches!(
            self,
            DispatchOutcome::SkippedNoToken | DispatchOutcome::SkippedInactiveUser
        )
    }
}

impl fmt::Display for DispatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_as_kebab_case() {
        let s = serde_json::to_string(&DispatchOutcome::SkippedInactiveUser).unwrap();
        assert_eq!(s, "\"skipped-inactive-user\"");
        assert_eq!(DispatchOutcome::FailedTransient.to_string(), "failed-transient");
    }

    #[test]
    fn skips_do_not_count_as_delivery_attempts() {
        assert!(!DispatchOutcome::SkippedNoToken.attempted_delivery());
        assert!(!DispatchOutcome::SkippedInactiveUser.attempted_delivery());
        assert!(DispatchOutcome::FailedPermanent.attempted_delivery());
        assert!(DispatchOutcome::Sent.attempted_delivery());
    }
}
