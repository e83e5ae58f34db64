//! API key bound to a user.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::UserId;

uuid_id! {
    /// Unique identifier for an API key.
    ApiKeyId
}

/// A hashed API key. The raw key is shown to the user once and never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: ApiKeyId,
    pub key_hash: String,
    pub user_id: UserId,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl ApiKey {
    /// Creates a new active key for `user_id` from its hash.
    pub fn new(key_hash: String, user_id: UserId) -> Self {
        Self {
            id: ApiKeyId::new(),
            key_hash,
            user_id,
            is_active: true,
            created_at: Utc::now(),
            last_used_at: None,
        }
    }
}
