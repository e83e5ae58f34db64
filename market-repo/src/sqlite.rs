//! SQLite repository adapter.
#![allow(clippy::collapsible_if)]

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{SqliteConnection, SqlitePool};
use std::str::FromStr;
use uuid::Uuid;

use exchange_rates::{ConversionError, Currency, CurrencyCode, ExchangeRate, PriceBasket};
use market_types::{
    Ad, AdEdit, AdFilter, AdId, AdRepository, AdView, AdViewRepository, ApiKey, CarBrand, CarBrandId,
    CarModel, CarModelId, CatalogRepository, Conversation, ConversationRepository,
    CurrencyRepository, DomainError, EditOutcome, MissingMakeRequest, NewAd, RepoError, User,
    UserId, UserRepository,
};

use crate::security::{generate_api_key, hash_api_key};
use crate::types::{
    DbAd, DbAdPrice, DbCarBrand, DbCarModel, DbComparablePrice, DbConversation, DbCurrency,
    DbExchangeRate, DbMissingMakeRequest, DbUser, DbViewedAt, format_date, format_timestamp, group_prices, map_write_error, parse_timestamp,
    stale_price_conflict,
};

// ─────────────────────────────────────────────────────────────────────────────
// SQLite Repository
// ─────────────────────────────────────────────────────────────────────────────

/// SQLite repository implementation. Writers are serialized by SQLite itself.
pub struct SqliteRepo {
    pool: SqlitePool,
}

impl SqliteRepo {
    /// Creates a new SQLite repository with automatic migration.
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        // Ensure on-disk SQLite target directory exists (no-op for in-memory).
        if let Some(path) = database_url.strip_prefix("sqlite://") {
            let path = path.split('?').next().unwrap_or(path);
            if path != ":memory:" {
                let p = std::path::Path::new(path);
                if let Some(parent) = p.parent() {
                    if !parent.as_os_str().is_empty() {
                        tokio::fs::create_dir_all(parent).await?;
                    }
                }
            }
        }

        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePool::connect_with(options).await?;

        let repo = Self { pool };
        repo.create_schema().await?;
        Ok(repo)
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Creates the database schema.
    pub async fn create_schema(&self) -> Result<(), RepoError> {
        let ddl = include_str!("../migrations/0001_create_market_tables.sql");
        sqlx::query(ddl)
            .execute(&self.pool)
            .await
            .map_err(|e| RepoError::Database(e.to_string()))?;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Ad loading helpers (usable inside a transaction)
// ─────────────────────────────────────────────────────────────────────────────

async fn load_ad(conn: &mut SqliteConnection, id: &str) -> Result<Option<Ad>, RepoError> {
    let row: Option<DbAd> = sqlx::query_as(
        r#"SELECT id, title, description, price, currency, car_model_id, seller_id, is_active, edit_attempts, created_at, updated_at
           FROM ads WHERE id = ?"#,
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| RepoError::Database(e.to_string()))?;

    let Some(row) = row else {
        return Ok(None);
    };

    let prices: Vec<DbAdPrice> =
        sqlx::query_as(r#"SELECT ad_id, currency, price FROM ad_prices WHERE ad_id = ?"#)
            .bind(id)
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| RepoError::Database(e.to_string()))?;

    let basket = group_prices(prices)?.into_values().next().unwrap_or_default();
    row.into_domain(basket).map(Some)
}

async fn insert_prices(
    conn: &mut SqliteConnection,
    ad_id: &str,
    prices: &PriceBasket,
) -> Result<(), RepoError> {
    for (currency, price) in prices {
        sqlx::query(r#"INSERT INTO ad_prices (ad_id, currency, price) VALUES (?, ?, ?)"#)
            .bind(ad_id)
            .bind(currency.as_str())
            .bind(price.to_string())
            .execute(&mut *conn)
            .await
            .map_err(map_write_error)?;
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Currency ledger
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl CurrencyRepository for SqliteRepo {
    async fn list_currencies(&self) -> Result<Vec<Currency>, RepoError> {
        let rows: Vec<DbCurrency> =
            sqlx::query_as(r#"SELECT code, name FROM currencies ORDER BY code"#)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| RepoError::Database(e.to_string()))?;

        rows.into_iter().map(DbCurrency::into_domain).collect()
    }

    async fn upsert_currency(&self, currency: Currency) -> Result<Currency, RepoError> {
        sqlx::query(
            r#"INSERT INTO currencies (code, name) VALUES (?, ?)
               ON CONFLICT(code) DO UPDATE SET name = excluded.name"#,
        )
        .bind(currency.code.as_str())
        .bind(&currency.name)
        .execute(&self.pool)
        .await
        .map_err(map_write_error)?;

        Ok(currency)
    }

    async fn rates_as_of(&self, as_of: NaiveDate) -> Result<Vec<ExchangeRate>, RepoError> {
        let rows: Vec<DbExchangeRate> = sqlx::query_as(
            r#"SELECT id AS seq, currency, rate, effective_date
               FROM exchange_rates WHERE effective_date <= ? ORDER BY id"#,
        )
        .bind(format_date(as_of))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        rows.into_iter().map(DbExchangeRate::into_domain).collect()
    }

    async fn record_rate(
        &self,
        currency: CurrencyCode,
        rate: Decimal,
        effective_date: NaiveDate,
    ) -> Result<ExchangeRate, RepoError> {
        ExchangeRate::validate(currency, rate).map_err(DomainError::from)?;

        let result = sqlx::query(
            r#"INSERT INTO exchange_rates (currency, rate, effective_date) VALUES (?, ?, ?)"#,
        )
        .bind(currency.as_str())
        .bind(rate.to_string())
        .bind(format_date(effective_date))
        .execute(&self.pool)
        .await
        .map_err(|e| match map_write_error(e) {
            RepoError::NotFound => {
                DomainError::from(ConversionError::UnknownCurrency(currency)).into()
            }
            other => other,
        })?;

        Ok(ExchangeRate::new(
            currency,
            rate,
            effective_date,
            result.last_insert_rowid(),
        ))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Ads
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl AdRepository for SqliteRepo {
    async fn create_ad(&self, ad: NewAd, prices: PriceBasket) -> Result<Ad, RepoError> {
        let id = Uuid::new_v4().to_string();
        let now = format_timestamp(Utc::now());

        let mut db_tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepoError::Transaction(e.to_string()))?;

        sqlx::query(
            r#"INSERT INTO ads (id, title, description, price, currency, car_model_id, seller_id, is_active, edit_attempts, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?)"#,
        )
        .bind(&id)
        .bind(&ad.draft.title)
        .bind(&ad.draft.description)
        .bind(ad.draft.price.to_string())
        .bind(ad.draft.currency.as_str())
        .bind(ad.draft.car_model_id.to_string())
        .bind(ad.seller_id.to_string())
        .bind(ad.is_active)
        .bind(&now)
        .bind(&now)
        .execute(&mut *db_tx)
        .await
        .map_err(map_write_error)?;

        insert_prices(&mut db_tx, &id, &prices).await?;

        let created = load_ad(&mut db_tx, &id).await?.ok_or(RepoError::NotFound)?;

        db_tx
            .commit()
            .await
            .map_err(|e| RepoError::Transaction(e.to_string()))?;

        Ok(created)
    }

    async fn apply_edit(&self, id: AdId, edit: AdEdit) -> Result<EditOutcome, RepoError> {
        let id_str = id.to_string();
        let now = format_timestamp(Utc::now());
        let changes = &edit.changes;

        let mut db_tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepoError::Transaction(e.to_string()))?;

        let basis_price = edit.priced_against.map(|b| b.price.to_string());
        let basis_currency = edit.priced_against.map(|b| b.currency.to_string());

        // Check-and-increment: only matches while the counter is below the cap
        // and, for a repriced edit, while price and currency are still the ones
        // the basket was computed from.
        let result = sqlx::query(
            r#"UPDATE ads SET
                   title = COALESCE(?, title),
                   description = COALESCE(?, description),
                   price = COALESCE(?, price),
                   currency = COALESCE(?, currency),
                   car_model_id = COALESCE(?, car_model_id),
                   is_active = is_active AND ?,
                   edit_attempts = edit_attempts + 1,
                   updated_at = ?
               WHERE id = ? AND edit_attempts < ?
                 AND (? IS NULL OR (price = ? AND currency = ?))"#,
        )
        .bind(&changes.title)
        .bind(&changes.description)
        .bind(changes.price.map(|p| p.to_string()))
        .bind(changes.currency.map(|c| c.to_string()))
        .bind(changes.car_model_id.map(|m| m.to_string()))
        .bind(!edit.flagged)
        .bind(&now)
        .bind(&id_str)
        .bind(i64::from(edit.cap))
        .bind(&basis_price)
        .bind(&basis_price)
        .bind(&basis_currency)
        .execute(&mut *db_tx)
        .await
        .map_err(map_write_error)?;

        if result.rows_affected() == 0 {
            let current = load_ad(&mut db_tx, &id_str).await?.ok_or(RepoError::NotFound)?;
            if !current.edits_exhausted(edit.cap) {
                return Err(stale_price_conflict());
            }

            sqlx::query(r#"UPDATE ads SET is_active = 0, updated_at = ? WHERE id = ?"#)
                .bind(&now)
                .bind(&id_str)
                .execute(&mut *db_tx)
                .await
                .map_err(|e| RepoError::Database(e.to_string()))?;

            let ad = load_ad(&mut db_tx, &id_str).await?.ok_or(RepoError::NotFound)?;
            db_tx
                .commit()
                .await
                .map_err(|e| RepoError::Transaction(e.to_string()))?;
            return Ok(EditOutcome::LimitExceeded(ad));
        }

        if let Some(basket) = &edit.repriced {
            sqlx::query(r#"DELETE FROM ad_prices WHERE ad_id = ?"#)
                .bind(&id_str)
                .execute(&mut *db_tx)
                .await
                .map_err(|e| RepoError::Database(e.to_string()))?;
            insert_prices(&mut db_tx, &id_str, basket).await?;
        }

        let ad = load_ad(&mut db_tx, &id_str).await?.ok_or(RepoError::NotFound)?;

        db_tx
            .commit()
            .await
            .map_err(|e| RepoError::Transaction(e.to_string()))?;

        Ok(EditOutcome::Applied(ad))
    }

    async fn deactivate_ad(&self, id: AdId) -> Result<Ad, RepoError> {
        let id_str = id.to_string();
        let now = format_timestamp(Utc::now());

        let result = sqlx::query(
            r#"UPDATE ads SET is_active = 0, updated_at = ? WHERE id = ? AND is_active = 1"#,
        )
        .bind(&now)
        .bind(&id_str)
        .execute(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            tracing::debug!(ad_id = %id, "Ad already inactive or missing");
        }

        self.get_ad(id).await?.ok_or(RepoError::NotFound)
    }

    async fn get_ad(&self, id: AdId) -> Result<Option<Ad>, RepoError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| RepoError::Database(e.to_string()))?;

        load_ad(&mut conn, &id.to_string()).await
    }

    async fn list_ads(&self, filter: AdFilter) -> Result<Vec<Ad>, RepoError> {
        let brand = filter.brand_id.map(|b| b.to_string());

        let rows: Vec<DbAd> = sqlx::query_as(
            r#"SELECT a.id, a.title, a.description, a.price, a.currency, a.car_model_id, a.seller_id, a.is_active, a.edit_attempts, a.created_at, a.updated_at
               FROM ads a JOIN car_models m ON m.id = a.car_model_id
               WHERE a.is_active = 1 AND (? IS NULL OR m.brand_id = ?)
               ORDER BY a.created_at DESC"#,
        )
        .bind(&brand)
        .bind(&brand)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        let prices: Vec<DbAdPrice> = sqlx::query_as(
            r#"SELECT p.ad_id, p.currency, p.price
               FROM ad_prices p
               JOIN ads a ON a.id = p.ad_id
               JOIN car_models m ON m.id = a.car_model_id
               WHERE a.is_active = 1 AND (? IS NULL OR m.brand_id = ?)"#,
        )
        .bind(&brand)
        .bind(&brand)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        let mut baskets = group_prices(prices)?;
        rows.into_iter()
            .map(|row| {
                let basket = baskets.remove(&row.ad_id()?).unwrap_or_default();
                row.into_domain(basket)
            })
            .collect()
    }

    async fn active_prices(
        &self,
        currency: CurrencyCode,
        region: Option<&str>,
    ) -> Result<Vec<Decimal>, RepoError> {
        let rows: Vec<DbComparablePrice> = sqlx::query_as(
            r#"SELECT CASE WHEN a.currency = ? THEN a.price ELSE p.price END AS price
               FROM ads a
               JOIN users u ON u.id = a.seller_id
               LEFT JOIN ad_prices p ON p.ad_id = a.id AND p.currency = ?
               WHERE a.is_active = 1 AND (? IS NULL OR u.region = ?)"#,
        )
        .bind(currency.as_str())
        .bind(currency.as_str())
        .bind(region)
        .bind(region)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        let prices = rows
            .into_iter()
            .map(DbComparablePrice::into_price)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(prices.into_iter().flatten().collect())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Views
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl AdViewRepository for SqliteRepo {
    async fn record_view(&self, view: AdView) -> Result<(), RepoError> {
        sqlx::query(r#"INSERT INTO ad_views (ad_id, viewer_id, viewed_at) VALUES (?, ?, ?)"#)
            .bind(view.ad_id.to_string())
            .bind(view.viewer_id.map(|v| v.to_string()))
            .bind(format_timestamp(view.viewed_at))
            .execute(&self.pool)
            .await
            .map_err(map_write_error)?;
        Ok(())
    }

    async fn view_timestamps(&self, ad_id: AdId) -> Result<Vec<DateTime<Utc>>, RepoError> {
        let rows: Vec<DbViewedAt> = sqlx::query_as(
            r#"SELECT viewed_at FROM ad_views WHERE ad_id = ? ORDER BY viewed_at"#,
        )
        .bind(ad_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        rows.into_iter().map(DbViewedAt::into_domain).collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Users & API keys
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl UserRepository for SqliteRepo {
    async fn create_user(&self, mut user: User) -> Result<(User, String), RepoError> {
        let raw_key = generate_api_key();
        let api_key = ApiKey::new(hash_api_key(&raw_key), user.id);
        let created_at = format_timestamp(user.created_at);
        // Reflect the stored precision.
        user.created_at = parse_timestamp(&created_at)?;

        let mut db_tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepoError::Transaction(e.to_string()))?;

        sqlx::query(
            r#"INSERT INTO users (id, email, is_premium, region, created_at) VALUES (?, ?, ?, ?, ?)"#,
        )
        .bind(user.id.to_string())
        .bind(&user.email)
        .bind(user.is_premium)
        .bind(&user.region)
        .bind(&created_at)
        .execute(&mut *db_tx)
        .await
        .map_err(map_write_error)?;

        sqlx::query(
            r#"INSERT INTO api_keys (id, user_id, key_hash, is_active, created_at) VALUES (?, ?, ?, ?, ?)"#,
        )
        .bind(api_key.id.to_string())
        .bind(api_key.user_id.to_string())
        .bind(&api_key.key_hash)
        .bind(api_key.is_active)
        .bind(format_timestamp(api_key.created_at))
        .execute(&mut *db_tx)
        .await
        .map_err(map_write_error)?;

        db_tx
            .commit()
            .await
            .map_err(|e| RepoError::Transaction(e.to_string()))?;

        Ok((user, raw_key))
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>, RepoError> {
        let row: Option<DbUser> = sqlx::query_as(
            r#"SELECT id, email, is_premium, region, created_at FROM users WHERE id = ?"#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        row.map(DbUser::into_domain).transpose()
    }

    async fn find_user_by_api_key_hash(&self, key_hash: &str) -> Result<Option<User>, RepoError> {
        let row: Option<DbUser> = sqlx::query_as(
            r#"SELECT u.id, u.email, u.is_premium, u.region, u.created_at
               FROM api_keys k JOIN users u ON u.id = k.user_id
               WHERE k.key_hash = ? AND k.is_active = 1"#,
        )
        .bind(key_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        if row.is_some() {
            sqlx::query(r#"UPDATE api_keys SET last_used_at = ? WHERE key_hash = ?"#)
                .bind(format_timestamp(Utc::now()))
                .bind(key_hash)
                .execute(&self.pool)
                .await
                .map_err(|e| RepoError::Database(e.to_string()))?;
        }

        row.map(DbUser::into_domain).transpose()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Catalog
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl CatalogRepository for SqliteRepo {
    async fn create_brand(&self, brand: CarBrand) -> Result<CarBrand, RepoError> {
        sqlx::query(r#"INSERT INTO car_brands (id, name) VALUES (?, ?)"#)
            .bind(brand.id.to_string())
            .bind(&brand.name)
            .execute(&self.pool)
            .await
            .map_err(map_write_error)?;
        Ok(brand)
    }

    async fn list_brands(&self) -> Result<Vec<CarBrand>, RepoError> {
        let rows: Vec<DbCarBrand> =
            sqlx::query_as(r#"SELECT id, name FROM car_brands ORDER BY name"#)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| RepoError::Database(e.to_string()))?;

        rows.into_iter().map(DbCarBrand::into_domain).collect()
    }

    async fn create_model(&self, model: CarModel) -> Result<CarModel, RepoError> {
        sqlx::query(r#"INSERT INTO car_models (id, brand_id, name) VALUES (?, ?, ?)"#)
            .bind(model.id.to_string())
            .bind(model.brand_id.to_string())
            .bind(&model.name)
            .execute(&self.pool)
            .await
            .map_err(map_write_error)?;
        Ok(model)
    }

    async fn list_models(&self, brand_id: Option<CarBrandId>) -> Result<Vec<CarModel>, RepoError> {
        let brand = brand_id.map(|b| b.to_string());

        let rows: Vec<DbCarModel> = sqlx::query_as(
            r#"SELECT id, brand_id, name FROM car_models
               WHERE (? IS NULL OR brand_id = ?) ORDER BY name"#,
        )
        .bind(&brand)
        .bind(&brand)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        rows.into_iter().map(DbCarModel::into_domain).collect()
    }

    async fn get_model(&self, id: CarModelId) -> Result<Option<CarModel>, RepoError> {
        let row: Option<DbCarModel> =
            sqlx::query_as(r#"SELECT id, brand_id, name FROM car_models WHERE id = ?"#)
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| RepoError::Database(e.to_string()))?;

        row.map(DbCarModel::into_domain).transpose()
    }

    async fn create_missing_make_request(
        &self,
        request: MissingMakeRequest,
    ) -> Result<MissingMakeRequest, RepoError> {
        let created_at = format_timestamp(request.created_at);

        sqlx::query(
            r#"INSERT INTO missing_make_requests (id, car_make, seller_id, created_at) VALUES (?, ?, ?, ?)"#,
        )
        .bind(request.id.to_string())
        .bind(&request.car_make)
        .bind(request.seller_id.to_string())
        .bind(&created_at)
        .execute(&self.pool)
        .await
        .map_err(map_write_error)?;

        Ok(MissingMakeRequest {
            created_at: parse_timestamp(&created_at)?,
            ..request
        })
    }

    async fn list_missing_make_requests(
        &self,
        seller_id: UserId,
    ) -> Result<Vec<MissingMakeRequest>, RepoError> {
        let rows: Vec<DbMissingMakeRequest> = sqlx::query_as(
            r#"SELECT id, car_make, seller_id, created_at FROM missing_make_requests
               WHERE seller_id = ? ORDER BY created_at DESC"#,
        )
        .bind(seller_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        rows.into_iter().map(DbMissingMakeRequest::into_domain).collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Conversations
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl ConversationRepository for SqliteRepo {
    async fn create_conversation(
        &self,
        conversation: Conversation,
    ) -> Result<Conversation, RepoError> {
        let created_at = format_timestamp(conversation.created_at);

        // Inserts nothing unless the ad belongs to the named seller.
        let result = sqlx::query(
            r#"INSERT INTO conversations (id, ad_id, buyer_id, seller_id, created_at)
               SELECT ?, a.id, ?, a.seller_id, ? FROM ads a WHERE a.id = ? AND a.seller_id = ?"#,
        )
        .bind(conversation.id.to_string())
        .bind(conversation.buyer_id.to_string())
        .bind(&created_at)
        .bind(conversation.ad_id.to_string())
        .bind(conversation.seller_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(map_write_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }

        Ok(Conversation {
            created_at: parse_timestamp(&created_at)?,
            ..conversation
        })
    }

    async fn list_conversations(&self, user: UserId) -> Result<Vec<Conversation>, RepoError> {
        let user = user.to_string();
        let rows: Vec<DbConversation> = sqlx::query_as(
            r#"SELECT id, ad_id, buyer_id, seller_id, created_at FROM conversations
               WHERE buyer_id = ? OR seller_id = ? ORDER BY created_at DESC"#,
        )
        .bind(&user)
        .bind(&user)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        rows.into_iter().map(DbConversation::into_domain).collect()
    }
}
