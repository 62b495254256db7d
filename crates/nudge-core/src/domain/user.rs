//! The slice of a user account the scheduler reads.

use serde::{Deserialize, Serialize};

use super::ids::UserId;

/// Read-only view of a user: activity flag and push device token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub is_active: bool,
    pub device_token: Option<String>,
}

impl UserProfile {
    /// The device token, treating a blank string as absent.
    pub fn token(&self) -> Option<&str> {
        self.device_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}
