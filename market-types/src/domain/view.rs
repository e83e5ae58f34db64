//! Ad view events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AdId, UserId};

/// One recorded view of an ad. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdView {
    pub ad_id: AdId,
    pub viewer_id: Option<UserId>,
    pub viewed_at: DateTime<Utc>,
}

impl AdView {
    pub fn now(ad_id: AdId, viewer_id: Option<UserId>) -> Self {
        Self {
            ad_id,
            viewer_id,
            viewed_at: Utc::now(),
        }
    }
}
