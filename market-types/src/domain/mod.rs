//! Domain models for the marketplace.

/// Declares a UUID-backed identifier newtype.
macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            serde::Serialize,
            serde::Deserialize,
            utoipa::ToSchema,
        )]
        #[serde(transparent)]
        pub struct $name(uuid::Uuid);

        impl $name {
            /// Creates a new random identifier.
            pub fn new() -> Self {
                Self(uuid::Uuid::new_v4())
            }

            pub fn from_uuid(uuid: uuid::Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &uuid::Uuid {
                &self.0
            }

            pub fn into_uuid(self) -> uuid::Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(uuid::Uuid::parse_str(s)?))
            }
        }
    };
}

pub mod ad;
pub mod api_key;
pub mod catalog;
pub mod conversation;
pub mod statistics;
pub mod user;
pub mod view;

pub use ad::{
    Ad, AdChanges, AdDetails, AdDraft, AdEdit, AdFilter, AdId, EDIT_ATTEMPT_CAP, EditOutcome, NewAd,
    PriceBasis,
};
pub use api_key::{ApiKey, ApiKeyId};
pub use catalog::{
    CarBrand, CarBrandId, CarModel, CarModelId, MissingMakeRequest, MissingMakeRequestId,
};
pub use conversation::{Conversation, ConversationId};
pub use statistics::{StatisticsBundle, ViewCounts};
pub use user::{Principal, User, UserId};
pub use view::AdView;
