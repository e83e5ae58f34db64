//! # Market Types
//!
//! Domain types and port traits for the car-ads marketplace.
//! This crate has no IO dependencies: data structures, business rules
//! and trait definitions only.
//!
//! ## Architecture
//!
//! This crate is the **innermost core** of the hexagonal architecture:
//! - `domain/` - Pure domain types (Ad, User, catalog, conversations, views, statistics)
//! - `ports/` - Trait definitions that adapters must implement
//! - `dto/` - Data Transfer Objects for API boundaries
//! - `error/` - Domain and application error types

pub mod domain;
pub mod dto;
pub mod error;
pub mod ports;

// Re-export commonly used types
pub use domain::{
    Ad, AdChanges, AdDetails, AdDraft, AdEdit, AdFilter, AdId, AdView, ApiKey, ApiKeyId, CarBrand,
    CarBrandId, CarModel, CarModelId, Conversation, ConversationId, EDIT_ATTEMPT_CAP, EditOutcome,
    MissingMakeRequest, MissingMakeRequestId, NewAd, PriceBasis, Principal, StatisticsBundle, User,
    UserId, ViewCounts,
};
pub use dto::*;
pub use error::{AppError, DomainError, RepoError, StatisticsUnavailable};
pub use exchange_rates::{ConversionError, Currency, CurrencyCode, ExchangeRate, PriceBasket};
pub use ports::{
    AdRepository, AdViewRepository, CatalogRepository, ContentFilter, ConversationRepository,
    CurrencyRepository, MarketRepository, UserRepository,
};
