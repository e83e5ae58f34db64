//! Buyer-seller conversations about an ad.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{Ad, AdId, UserId};
use crate::error::DomainError;

uuid_id! {
    /// Unique identifier for a Conversation.
    ConversationId
}

/// A thread opened by a prospective buyer with the seller of an ad.
///
/// The seller is always the ad's seller; stores re-check that ownership when
/// persisting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Conversation {
    pub id: ConversationId,
    pub ad_id: AdId,
    pub buyer_id: UserId,
    pub seller_id: UserId,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    /// Opens a conversation between `buyer` and the seller of `ad`.
    pub fn open(ad: &Ad, buyer: UserId) -> Result<Self, DomainError> {
        if ad.is_seller(buyer) {
            return Err(DomainError::ValidationError(
                "Sellers cannot open a conversation about their own ad".into(),
            ));
        }
        Ok(Self {
            id: ConversationId::new(),
            ad_id: ad.id,
            buyer_id: buyer,
            seller_id: ad.seller_id,
            created_at: Utc::now(),
        })
    }

    pub fn involves(&self, user: UserId) -> bool {
        self.buyer_id == user || self.seller_id == user
    }
}
