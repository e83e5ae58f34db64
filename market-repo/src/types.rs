//! Shared database types with feature-gated fields for SQLite and PostgreSQL.

use std::collections::HashMap;

use sqlx::FromRow;

use exchange_rates::{Currency, CurrencyCode, ExchangeRate, PriceBasket};
use market_types::{
    Ad, AdId, CarBrand, CarBrandId, CarModel, CarModelId, Conversation, ConversationId,
    MissingMakeRequest, MissingMakeRequestId, RepoError, User, UserId,
};

// ─────────────────────────────────────────────────────────────────────────────
// Feature-gated imports
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(not(feature = "sqlite"))]
use chrono::{DateTime, NaiveDate, Utc};
#[cfg(not(feature = "sqlite"))]
use rust_decimal::Decimal;
#[cfg(not(feature = "sqlite"))]
use uuid::Uuid;

// ─────────────────────────────────────────────────────────────────────────────
// Database row structs (derive FromRow for automatic mapping)
// ─────────────────────────────────────────────────────────────────────────────

/// User row from database.
#[derive(FromRow)]
pub struct DbUser {
    #[cfg(not(feature = "sqlite"))]
    pub id: Uuid,
    #[cfg(feature = "sqlite")]
    pub id: String,

    pub email: String,

    #[cfg(not(feature = "sqlite"))]
    pub is_premium: bool,
    #[cfg(feature = "sqlite")]
    pub is_premium: i64,

    pub region: Option<String>,

    #[cfg(not(feature = "sqlite"))]
    pub created_at: DateTime<Utc>,
    #[cfg(feature = "sqlite")]
    pub created_at: String,
}

/// Currency row from database.
#[derive(FromRow)]
pub struct DbCurrency {
    pub code: String,
    pub name: String,
}

/// Exchange rate row; `seq` is the autoincrement id.
#[derive(FromRow)]
pub struct DbExchangeRate {
    pub seq: i64,
    pub currency: String,

    #[cfg(not(feature = "sqlite"))]
    pub rate: Decimal,
    #[cfg(feature = "sqlite")]
    pub rate: String,

    #[cfg(not(feature = "sqlite"))]
    pub effective_date: NaiveDate,
    #[cfg(feature = "sqlite")]
    pub effective_date: String,
}

/// Car brand row.
#[derive(FromRow)]
pub struct DbCarBrand {
    #[cfg(not(feature = "sqlite"))]
    pub id: Uuid,
    #[cfg(feature = "sqlite")]
    pub id: String,

    pub name: String,
}

/// Car model row.
#[derive(FromRow)]
pub struct DbCarModel {
    #[cfg(not(feature = "sqlite"))]
    pub id: Uuid,
    #[cfg(feature = "sqlite")]
    pub id: String,

    #[cfg(not(feature = "sqlite"))]
    pub brand_id: Uuid,
    #[cfg(feature = "sqlite")]
    pub brand_id: String,

    pub name: String,
}

/// Ad row (without its price basket).
#[derive(FromRow)]
pub struct DbAd {
    #[cfg(not(feature = "sqlite"))]
    pub id: Uuid,
    #[cfg(feature = "sqlite")]
    pub id: String,

    pub title: String,
    pub description: String,

    #[cfg(not(feature = "sqlite"))]
    pub price: Decimal,
    #[cfg(feature = "sqlite")]
    pub price: String,

    pub currency: String,

    #[cfg(not(feature = "sqlite"))]
    pub car_model_id: Uuid,
    #[cfg(feature = "sqlite")]
    pub car_model_id: String,

    #[cfg(not(feature = "sqlite"))]
    pub seller_id: Uuid,
    #[cfg(feature = "sqlite")]
    pub seller_id: String,

    #[cfg(not(feature = "sqlite"))]
    pub is_active: bool,
    #[cfg(feature = "sqlite")]
    pub is_active: i64,

    #[cfg(not(feature = "sqlite"))]
    pub edit_attempts: i32,
    #[cfg(feature = "sqlite")]
    pub edit_attempts: i64,

    #[cfg(not(feature = "sqlite"))]
    pub created_at: DateTime<Utc>,
    #[cfg(feature = "sqlite")]
    pub created_at: String,

    #[cfg(not(feature = "sqlite"))]
    pub updated_at: DateTime<Utc>,
    #[cfg(feature = "sqlite")]
    pub updated_at: String,
}

/// One basket entry.
#[derive(FromRow)]
pub struct DbAdPrice {
    #[cfg(not(feature = "sqlite"))]
    pub ad_id: Uuid,
    #[cfg(feature = "sqlite")]
    pub ad_id: String,

    pub currency: String,

    #[cfg(not(feature = "sqlite"))]
    pub price: Decimal,
    #[cfg(feature = "sqlite")]
    pub price: String,
}

/// Price in the requested currency for one active ad; `None` when the ad has
/// neither a matching listing currency nor a basket entry.
#[derive(FromRow)]
pub struct DbComparablePrice {
    #[cfg(not(feature = "sqlite"))]
    pub price: Option<Decimal>,
    #[cfg(feature = "sqlite")]
    pub price: Option<String>,
}

/// View timestamp.
#[derive(FromRow)]
pub struct DbViewedAt {
    #[cfg(not(feature = "sqlite"))]
    pub viewed_at: DateTime<Utc>,
    #[cfg(feature = "sqlite")]
    pub viewed_at: String,
}

/// Conversation row.
#[derive(FromRow)]
pub struct DbConversation {
    #[cfg(not(feature = "sqlite"))]
    pub id: Uuid,
    #[cfg(feature = "sqlite")]
    pub id: String,

    #[cfg(not(feature = "sqlite"))]
    pub ad_id: Uuid,
    #[cfg(feature = "sqlite")]
    pub ad_id: String,

    #[cfg(not(feature = "sqlite"))]
    pub buyer_id: Uuid,
    #[cfg(feature = "sqlite")]
    pub buyer_id: String,

    #[cfg(not(feature = "sqlite"))]
    pub seller_id: Uuid,
    #[cfg(feature = "sqlite")]
    pub seller_id: String,

    #[cfg(not(feature = "sqlite"))]
    pub created_at: DateTime<Utc>,
    #[cfg(feature = "sqlite")]
    pub created_at: String,
}

/// Missing car make request row.
#[derive(FromRow)]
pub struct DbMissingMakeRequest {
    #[cfg(not(feature = "sqlite"))]
    pub id: Uuid,
    #[cfg(feature = "sqlite")]
    pub id: String,

    pub car_make: String,

    #[cfg(not(feature = "sqlite"))]
    pub seller_id: Uuid,
    #[cfg(feature = "sqlite")]
    pub seller_id: String,

    #[cfg(not(feature = "sqlite"))]
    pub created_at: DateTime<Utc>,
    #[cfg(feature = "sqlite")]
    pub created_at: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Parsing helpers
// ─────────────────────────────────────────────────────────────────────────────

pub fn parse_code(s: &str) -> Result<CurrencyCode, RepoError> {
    s.parse()
        .map_err(|_| RepoError::Database(format!("Invalid currency code in store: {}", s)))
}

/// Groups basket rows by ad.
pub fn group_prices(rows: Vec<DbAdPrice>) -> Result<HashMap<AdId, PriceBasket>, RepoError> {
    let mut baskets: HashMap<AdId, PriceBasket> = HashMap::new();
    for row in rows {
        let (ad_id, currency, price) = row.into_parts()?;
        baskets.entry(ad_id).or_default().insert(currency, price);
    }
    Ok(baskets)
}

/// Maps constraint violations to their domain meaning.
pub fn map_write_error(e: sqlx::Error) -> RepoError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            return RepoError::Conflict(db.message().to_string());
        }
        if db.is_foreign_key_violation() {
            return RepoError::NotFound;
        }
    }
    RepoError::Database(e.to_string())
}

/// A repriced edit lost the race against another price or currency change.
pub fn stale_price_conflict() -> RepoError {
    RepoError::Conflict("Ad price changed by a concurrent edit, retry the edit".into())
}

#[cfg(feature = "sqlite")]
pub use sqlite_text::*;

/// SQLite stores UUIDs, decimals, dates and timestamps as TEXT.
#[cfg(feature = "sqlite")]
mod sqlite_text {
    use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
    use market_types::RepoError;
    use rust_decimal::Decimal;
    use std::str::FromStr;
    use uuid::Uuid;

    pub fn parse_uuid(s: &str) -> Result<Uuid, RepoError> {
        Uuid::parse_str(s).map_err(|e| RepoError::Database(e.to_string()))
    }

    pub fn parse_decimal(s: &str) -> Result<Decimal, RepoError> {
        Decimal::from_str(s).map_err(|e| RepoError::Database(e.to_string()))
    }

    pub fn parse_date(s: &str) -> Result<NaiveDate, RepoError> {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| RepoError::Database(e.to_string()))
    }

    pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, RepoError> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| RepoError::Database(e.to_string()))
    }

    /// Fixed-width RFC 3339 so TEXT ordering matches time ordering.
    pub fn format_timestamp(dt: DateTime<Utc>) -> String {
        dt.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    pub fn format_date(date: NaiveDate) -> String {
        date.format("%Y-%m-%d").to_string()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Domain conversion (feature-gated implementations)
// ─────────────────────────────────────────────────────────────────────────────

impl DbUser {
    /// Convert database row to domain User.
    pub fn into_domain(self) -> Result<User, RepoError> {
        #[cfg(not(feature = "sqlite"))]
        let (id, is_premium, created_at) = (self.id, self.is_premium, self.created_at);

        #[cfg(feature = "sqlite")]
        let (id, is_premium, created_at) = (
            parse_uuid(&self.id)?,
            self.is_premium != 0,
            parse_timestamp(&self.created_at)?,
        );

        Ok(User {
            id: UserId::from_uuid(id),
            email: self.email,
            is_premium,
            region: self.region,
            created_at,
        })
    }
}

impl DbCurrency {
    pub fn into_domain(self) -> Result<Currency, RepoError> {
        Ok(Currency::new(parse_code(&self.code)?, self.name))
    }
}

impl DbExchangeRate {
    pub fn into_domain(self) -> Result<ExchangeRate, RepoError> {
        #[cfg(not(feature = "sqlite"))]
        let (rate, effective_date) = (self.rate, self.effective_date);

        #[cfg(feature = "sqlite")]
        let (rate, effective_date) = (
            parse_decimal(&self.rate)?,
            parse_date(&self.effective_date)?,
        );

        Ok(ExchangeRate::new(
            parse_code(&self.currency)?,
            rate,
            effective_date,
            self.seq,
        ))
    }
}

impl DbCarBrand {
    pub fn into_domain(self) -> Result<CarBrand, RepoError> {
        #[cfg(not(feature = "sqlite"))]
        let id = self.id;
        #[cfg(feature = "sqlite")]
        let id = parse_uuid(&self.id)?;

        Ok(CarBrand {
            id: CarBrandId::from_uuid(id),
            name: self.name,
        })
    }
}

impl DbCarModel {
    pub fn into_domain(self) -> Result<CarModel, RepoError> {
        #[cfg(not(feature = "sqlite"))]
        let (id, brand_id) = (self.id, self.brand_id);
        #[cfg(feature = "sqlite")]
        let (id, brand_id) = (parse_uuid(&self.id)?, parse_uuid(&self.brand_id)?);

        Ok(CarModel {
            id: CarModelId::from_uuid(id),
            brand_id: CarBrandId::from_uuid(brand_id),
            name: self.name,
        })
    }
}

impl DbConversation {
    pub fn into_domain(self) -> Result<Conversation, RepoError> {
        #[cfg(not(feature = "sqlite"))]
        let (id, ad_id, buyer_id, seller_id, created_at) = (
            self.id,
            self.ad_id,
            self.buyer_id,
            self.seller_id,
            self.created_at,
        );
        #[cfg(feature = "sqlite")]
        let (id, ad_id, buyer_id, seller_id, created_at) = (
            parse_uuid(&self.id)?,
            parse_uuid(&self.ad_id)?,
            parse_uuid(&self.buyer_id)?,
            parse_uuid(&self.seller_id)?,
            parse_timestamp(&self.created_at)?,
        );

        Ok(Conversation {
            id: ConversationId::from_uuid(id),
            ad_id: AdId::from_uuid(ad_id),
            buyer_id: UserId::from_uuid(buyer_id),
            seller_id: UserId::from_uuid(seller_id),
            created_at,
        })
    }
}

impl DbMissingMakeRequest {
    pub fn into_domain(self) -> Result<MissingMakeRequest, RepoError> {
        #[cfg(not(feature = "sqlite"))]
        let (id, seller_id, created_at) = (self.id, self.seller_id, self.created_at);
        #[cfg(feature = "sqlite")]
        let (id, seller_id, created_at) = (
            parse_uuid(&self.id)?,
            parse_uuid(&self.seller_id)?,
            parse_timestamp(&self.created_at)?,
        );

        Ok(MissingMakeRequest {
            id: MissingMakeRequestId::from_uuid(id),
            car_make: self.car_make,
            seller_id: UserId::from_uuid(seller_id),
            created_at,
        })
    }
}

impl DbAdPrice {
    /// Returns `(ad_id, currency, price)`.
    pub fn into_parts(self) -> Result<(AdId, CurrencyCode, rust_decimal::Decimal), RepoError> {
        #[cfg(not(feature = "sqlite"))]
        let (ad_id, price) = (self.ad_id, self.price);
        #[cfg(feature = "sqlite")]
        let (ad_id, price) = (parse_uuid(&self.ad_id)?, parse_decimal(&self.price)?);

        Ok((AdId::from_uuid(ad_id), parse_code(&self.currency)?, price))
    }
}

impl DbComparablePrice {
    pub fn into_price(self) -> Result<Option<rust_decimal::Decimal>, RepoError> {
        #[cfg(not(feature = "sqlite"))]
        return Ok(self.price);

        #[cfg(feature = "sqlite")]
        self.price.as_deref().map(parse_decimal).transpose()
    }
}

impl DbViewedAt {
    pub fn into_domain(self) -> Result<chrono::DateTime<chrono::Utc>, RepoError> {
        #[cfg(not(feature = "sqlite"))]
        return Ok(self.viewed_at);

        #[cfg(feature = "sqlite")]
        parse_timestamp(&self.viewed_at)
    }
}

impl DbAd {
    pub fn ad_id(&self) -> Result<AdId, RepoError> {
        #[cfg(not(feature = "sqlite"))]
        return Ok(AdId::from_uuid(self.id));

        #[cfg(feature = "sqlite")]
        parse_uuid(&self.id).map(AdId::from_uuid)
    }

    /// Convert database row plus its basket to a domain Ad.
    pub fn into_domain(self, prices: PriceBasket) -> Result<Ad, RepoError> {
        let currency = parse_code(&self.currency)?;
        let edit_attempts = u32::try_from(self.edit_attempts)
            .map_err(|e| RepoError::Database(e.to_string()))?;

        #[cfg(not(feature = "sqlite"))]
        let (id, price, car_model_id, seller_id, is_active, created_at, updated_at) = (
            self.id,
            self.price,
            self.car_model_id,
            self.seller_id,
            self.is_active,
            self.created_at,
            self.updated_at,
        );

        #[cfg(feature = "sqlite")]
        let (id, price, car_model_id, seller_id, is_active, created_at, updated_at) = (
            parse_uuid(&self.id)?,
            parse_decimal(&self.price)?,
            parse_uuid(&self.car_model_id)?,
            parse_uuid(&self.seller_id)?,
            self.is_active != 0,
            parse_timestamp(&self.created_at)?,
            parse_timestamp(&self.updated_at)?,
        );

        Ok(Ad {
            id: AdId::from_uuid(id),
            title: self.title,
            description: self.description,
            price,
            currency,
            car_model_id: CarModelId::from_uuid(car_model_id),
            seller_id: UserId::from_uuid(seller_id),
            is_active,
            edit_attempts,
            prices,
            created_at,
            updated_at,
        })
    }
}
