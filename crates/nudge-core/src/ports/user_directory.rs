//! UserDirectory port - user の有効フラグと device token を引く

use async_trait::async_trait;

use crate::domain::{StoreError, UserId, UserProfile};

/// Read access to user accounts.
///
/// Token registration and removal happen elsewhere; the scheduler only reads.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// `None` when the user does not exist (deleted accounts included).
    async fn get(&self, user_id: UserId) -> Result<Option<UserProfile>, StoreError>;
}
