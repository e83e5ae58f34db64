//! Port traits (interfaces for adapters).
//!
//! These are the contracts that adapters must implement.
//! The application layer depends on these traits, not concrete implementations.

mod content;
mod repository;

pub use content::ContentFilter;
pub use repository::{
    AdRepository, AdViewRepository, CatalogRepository, ConversationRepository, CurrencyRepository,
    MarketRepository, UserRepository,
};
