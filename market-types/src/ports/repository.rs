//! Repository port traits.
//!
//! These are the primary ports of the hexagonal architecture. The Postgres and
//! SQLite adapters implement all of them; the service only needs
//! [`MarketRepository`].

use chrono::{DateTime, NaiveDate, Utc};
use exchange_rates::{Currency, CurrencyCode, ExchangeRate, PriceBasket};
use rust_decimal::Decimal;

use crate::domain::{
    Ad, AdEdit, AdFilter, AdId, AdView, CarBrand, CarBrandId, CarModel, CarModelId, Conversation,
    EditOutcome, MissingMakeRequest, NewAd, User, UserId,
};
use crate::error::RepoError;

/// Currency ledger storage.
#[async_trait::async_trait]
pub trait CurrencyRepository: Send + Sync + 'static {
    /// Lists every known currency.
    async fn list_currencies(&self) -> Result<Vec<Currency>, RepoError>;

    /// Inserts a currency or renames an existing one.
    async fn upsert_currency(&self, currency: Currency) -> Result<Currency, RepoError>;

    /// All rate rows with `effective_date <= as_of`.
    async fn rates_as_of(&self, as_of: NaiveDate) -> Result<Vec<ExchangeRate>, RepoError>;

    /// Appends a rate row. The store assigns `seq`.
    async fn record_rate(
        &self,
        currency: CurrencyCode,
        rate: Decimal,
        effective_date: NaiveDate,
    ) -> Result<ExchangeRate, RepoError>;
}

/// Ad storage.
///
/// Writes that touch more than one row MUST be atomic.
#[async_trait::async_trait]
pub trait AdRepository: Send + Sync + 'static {
    // ─────────────────────────────────────────────────────────────────────────────
    // Writes (atomic)
    // ─────────────────────────────────────────────────────────────────────────────

    /// Inserts the ad and its price basket in one transaction.
    async fn create_ad(&self, ad: NewAd, prices: PriceBasket) -> Result<Ad, RepoError>;

    /// Check-and-increment of the edit counter.
    ///
    /// If `edit_attempts < edit.cap` the changes are applied, the counter is
    /// incremented, and the basket replaced when `edit.repriced` is set.
    /// Otherwise the ad is deactivated and `LimitExceeded` returned. Two
    /// concurrent calls at `cap - 1` yield exactly one `Applied`.
    async fn apply_edit(&self, id: AdId, edit: AdEdit) -> Result<EditOutcome, RepoError>;

    /// Sets `is_active = false`. Idempotent.
    async fn deactivate_ad(&self, id: AdId) -> Result<Ad, RepoError>;

    // ─────────────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────────────

    async fn get_ad(&self, id: AdId) -> Result<Option<Ad>, RepoError>;

    /// Active ads, newest first.
    async fn list_ads(&self, filter: AdFilter) -> Result<Vec<Ad>, RepoError>;

    /// One price per active ad, expressed in `currency`: the ad's own price
    /// when it is listed in `currency`, otherwise its basket entry. Ads with
    /// neither are skipped. `region` restricts to sellers in that region.
    async fn active_prices(
        &self,
        currency: CurrencyCode,
        region: Option<&str>,
    ) -> Result<Vec<Decimal>, RepoError>;
}

/// View event storage. Append-only.
#[async_trait::async_trait]
pub trait AdViewRepository: Send + Sync + 'static {
    async fn record_view(&self, view: AdView) -> Result<(), RepoError>;

    /// Timestamps of every view of `ad_id`.
    async fn view_timestamps(&self, ad_id: AdId) -> Result<Vec<DateTime<Utc>>, RepoError>;
}

/// User and API key storage.
#[async_trait::async_trait]
pub trait UserRepository: Send + Sync + 'static {
    /// Stores the user and issues an API key. Returns the raw key, which is
    /// not recoverable afterwards.
    async fn create_user(&self, user: User) -> Result<(User, String), RepoError>;

    async fn get_user(&self, id: UserId) -> Result<Option<User>, RepoError>;

    /// Resolves an active API key hash to its user and touches `last_used_at`.
    async fn find_user_by_api_key_hash(&self, key_hash: &str) -> Result<Option<User>, RepoError>;
}

/// Car brand / model taxonomy storage.
#[async_trait::async_trait]
pub trait CatalogRepository: Send + Sync + 'static {
    async fn create_brand(&self, brand: CarBrand) -> Result<CarBrand, RepoError>;

    async fn list_brands(&self) -> Result<Vec<CarBrand>, RepoError>;

    /// Fails with `NotFound` when the brand does not exist.
    async fn create_model(&self, model: CarModel) -> Result<CarModel, RepoError>;

    async fn list_models(&self, brand_id: Option<CarBrandId>) -> Result<Vec<CarModel>, RepoError>;

    async fn get_model(&self, id: CarModelId) -> Result<Option<CarModel>, RepoError>;

    /// Fails with `NotFound` when the seller does not exist.
    async fn create_missing_make_request(
        &self,
        request: MissingMakeRequest,
    ) -> Result<MissingMakeRequest, RepoError>;

    /// Requests filed by `seller_id`, newest first.
    async fn list_missing_make_requests(
        &self,
        seller_id: UserId,
    ) -> Result<Vec<MissingMakeRequest>, RepoError>;
}

/// Buyer-seller conversation storage.
#[async_trait::async_trait]
pub trait ConversationRepository: Send + Sync + 'static {
    /// Stores the conversation only if `seller_id` is the seller of `ad_id`;
    /// otherwise fails with `NotFound`. A second conversation by the same
    /// buyer about the same ad fails with `Conflict`.
    async fn create_conversation(
        &self,
        conversation: Conversation,
    ) -> Result<Conversation, RepoError>;

    /// Conversations where `user` is the buyer or the seller, newest first.
    async fn list_conversations(&self, user: UserId) -> Result<Vec<Conversation>, RepoError>;
}

/// Everything the marketplace service needs from storage.
pub trait MarketRepository:
    CurrencyRepository
    + AdRepository
    + AdViewRepository
    + UserRepository
    + CatalogRepository
    + ConversationRepository
{
}

impl<T> MarketRepository for T where
    T: CurrencyRepository
        + AdRepository
        + AdViewRepository
        + UserRepository
        + CatalogRepository
        + ConversationRepository
{
}
