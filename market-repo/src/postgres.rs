//! PostgreSQL repository adapter.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SubsecRound, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
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
    DbExchangeRate, DbMissingMakeRequest, DbUser, DbViewedAt, group_prices, map_write_error, stale_price_conflict,
};

// ─────────────────────────────────────────────────────────────────────────────
// PostgreSQL Repository
// ─────────────────────────────────────────────────────────────────────────────

/// PostgreSQL repository. The edit counter relies on the row lock taken by
/// `UPDATE`; a blocked writer re-evaluates its predicate after the first
/// commits.
pub struct PostgresRepo {
    pool: PgPool,
}

/// Executes SQL statements from a migration file, splitting by semicolons.
async fn execute_migration(pool: &PgPool, sql: &str, name: &str) -> Result<(), anyhow::Error> {
    for statement in sql.split(';') {
        let stmt = statement.trim();
        if !stmt.is_empty() {
            sqlx::query(stmt)
                .execute(pool)
                .await
                .map_err(|e| anyhow::anyhow!("Migration {} failed: {}", name, e))?;
        }
    }
    Ok(())
}

/// Runs all database migrations.
async fn run_migrations(pool: &PgPool) -> Result<(), anyhow::Error> {
    execute_migration(
        pool,
        include_str!("../migrations/0001_create_market_tables_pg.sql"),
        "0001",
    )
    .await
}

impl PostgresRepo {
    /// Creates a new PostgreSQL repository with automatic migration.
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Ad loading helpers (usable inside a transaction)
// ─────────────────────────────────────────────────────────────────────────────

async fn load_ad(conn: &mut PgConnection, id: Uuid) -> Result<Option<Ad>, RepoError> {
    let row: Option<DbAd> = sqlx::query_as(
        r#"SELECT id, title, description, price, currency, car_model_id, seller_id, is_active, edit_attempts, created_at, updated_at
           FROM ads WHERE id = $1"#,
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| RepoError::Database(e.to_string()))?;

    let Some(row) = row else {
        return Ok(None);
    };

    let prices: Vec<DbAdPrice> =
        sqlx::query_as(r#"SELECT ad_id, currency, price FROM ad_prices WHERE ad_id = $1"#)
            .bind(id)
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| RepoError::Database(e.to_string()))?;

    let basket = group_prices(prices)?.into_values().next().unwrap_or_default();
    row.into_domain(basket).map(Some)
}

async fn insert_prices(
    conn: &mut PgConnection,
    ad_id: Uuid,
    prices: &PriceBasket,
) -> Result<(), RepoError> {
    for (currency, price) in prices {
        sqlx::query(r#"INSERT INTO ad_prices (ad_id, currency, price) VALUES ($1, $2, $3)"#)
            .bind(ad_id)
            .bind(currency.as_str())
            .bind(*price)
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
impl CurrencyRepository for PostgresRepo {
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
            r#"INSERT INTO currencies (code, name) VALUES ($1, $2)
               ON CONFLICT (code) DO UPDATE SET name = EXCLUDED.name"#,
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
               FROM exchange_rates WHERE effective_date <= $1 ORDER BY id"#,
        )
        .bind(as_of)
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

        let (seq,): (i64,) = sqlx::query_as(
            r#"INSERT INTO exchange_rates (currency, rate, effective_date) VALUES ($1, $2, $3)
               RETURNING id"#,
        )
        .bind(currency.as_str())
        .bind(rate)
        .bind(effective_date)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match map_write_error(e) {
            RepoError::NotFound => {
                DomainError::from(ConversionError::UnknownCurrency(currency)).into()
            }
            other => other,
        })?;

        Ok(ExchangeRate::new(currency, rate, effective_date, seq))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Ads
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl AdRepository for PostgresRepo {
    async fn create_ad(&self, ad: NewAd, prices: PriceBasket) -> Result<Ad, RepoError> {
        let id = Uuid::new_v4();
        let now = Utc::now();

        let mut db_tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepoError::Transaction(e.to_string()))?;

        sqlx::query(
            r#"INSERT INTO ads (id, title, description, price, currency, car_model_id, seller_id, is_active, edit_attempts, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 0, $9, $9)"#,
        )
        .bind(id)
        .bind(&ad.draft.title)
        .bind(&ad.draft.description)
        .bind(ad.draft.price)
        .bind(ad.draft.currency.as_str())
        .bind(ad.draft.car_model_id.into_uuid())
        .bind(ad.seller_id.into_uuid())
        .bind(ad.is_active)
        .bind(now)
        .execute(&mut *db_tx)
        .await
        .map_err(map_write_error)?;

        insert_prices(&mut db_tx, id, &prices).await?;

        let created = load_ad(&mut db_tx, id).await?.ok_or(RepoError::NotFound)?;

        db_tx
            .commit()
            .await
            .map_err(|e| RepoError::Transaction(e.to_string()))?;

        Ok(created)
    }

    async fn apply_edit(&self, id: AdId, edit: AdEdit) -> Result<EditOutcome, RepoError> {
        let id = id.into_uuid();
        let now = Utc::now();
        let changes = &edit.changes;
        let cap = i32::try_from(edit.cap).map_err(|e| RepoError::Database(e.to_string()))?;

        let mut db_tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepoError::Transaction(e.to_string()))?;

        // Check-and-increment: only matches while the counter is below the cap
        // and, for a repriced edit, while price and currency are still the ones
        // the basket was computed from.
        let result = sqlx::query(
            r#"UPDATE ads SET
                   title = COALESCE($1, title),
                   description = COALESCE($2, description),
                   price = COALESCE($3, price),
                   currency = COALESCE($4, currency),
                   car_model_id = COALESCE($5, car_model_id),
                   is_active = is_active AND $6,
                   edit_attempts = edit_attempts + 1,
                   updated_at = $7
               WHERE id = $8 AND edit_attempts < $9
                 AND ($10::NUMERIC IS NULL OR (price = $10 AND currency = $11))"#,
        )
        .bind(&changes.title)
        .bind(&changes.description)
        .bind(changes.price)
        .bind(changes.currency.map(|c| c.to_string()))
        .bind(changes.car_model_id.map(CarModelId::into_uuid))
        .bind(!edit.flagged)
        .bind(now)
        .bind(id)
        .bind(cap)
        .bind(edit.priced_against.map(|b| b.price))
        .bind(edit.priced_against.map(|b| b.currency.to_string()))
        .execute(&mut *db_tx)
        .await
        .map_err(map_write_error)?;

        if result.rows_affected() == 0 {
            let current = load_ad(&mut db_tx, id).await?.ok_or(RepoError::NotFound)?;
            if !current.edits_exhausted(edit.cap) {
                return Err(stale_price_conflict());
            }

            sqlx::query(r#"UPDATE ads SET is_active = FALSE, updated_at = $1 WHERE id = $2"#)
                .bind(now)
                .bind(id)
                .execute(&mut *db_tx)
                .await
                .map_err(|e| RepoError::Database(e.to_string()))?;

            let ad = load_ad(&mut db_tx, id).await?.ok_or(RepoError::NotFound)?;
            db_tx
                .commit()
                .await
                .map_err(|e| RepoError::Transaction(e.to_string()))?;
            return Ok(EditOutcome::LimitExceeded(ad));
        }

        if let Some(basket) = &edit.repriced {
            sqlx::query(r#"DELETE FROM ad_prices WHERE ad_id = $1"#)
                .bind(id)
                .execute(&mut *db_tx)
                .await
                .map_err(|e| RepoError::Database(e.to_string()))?;
            insert_prices(&mut db_tx, id, basket).await?;
        }

        let ad = load_ad(&mut db_tx, id).await?.ok_or(RepoError::NotFound)?;

        db_tx
            .commit()
            .await
            .map_err(|e| RepoError::Transaction(e.to_string()))?;

        Ok(EditOutcome::Applied(ad))
    }

    async fn deactivate_ad(&self, id: AdId) -> Result<Ad, RepoError> {
        let result = sqlx::query(
            r#"UPDATE ads SET is_active = FALSE, updated_at = $1 WHERE id = $2 AND is_active"#,
        )
        .bind(Utc::now())
        .bind(id.into_uuid())
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

        load_ad(&mut conn, id.into_uuid()).await
    }

    async fn list_ads(&self, filter: AdFilter) -> Result<Vec<Ad>, RepoError> {
        let brand = filter.brand_id.map(CarBrandId::into_uuid);

        let rows: Vec<DbAd> = sqlx::query_as(
            r#"SELECT a.id, a.title, a.description, a.price, a.currency, a.car_model_id, a.seller_id, a.is_active, a.edit_attempts, a.created_at, a.updated_at
               FROM ads a JOIN car_models m ON m.id = a.car_model_id
               WHERE a.is_active AND ($1::UUID IS NULL OR m.brand_id = $1)
               ORDER BY a.created_at DESC"#,
        )
        .bind(brand)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        let prices: Vec<DbAdPrice> = sqlx::query_as(
            r#"SELECT p.ad_id, p.currency, p.price
               FROM ad_prices p
               JOIN ads a ON a.id = p.ad_id
               JOIN car_models m ON m.id = a.car_model_id
               WHERE a.is_active AND ($1::UUID IS NULL OR m.brand_id = $1)"#,
        )
        .bind(brand)
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
            r#"SELECT CASE WHEN a.currency = $1 THEN a.price ELSE p.price END AS price
               FROM ads a
               JOIN users u ON u.id = a.seller_id
               LEFT JOIN ad_prices p ON p.ad_id = a.id AND p.currency = $1
               WHERE a.is_active AND ($2::TEXT IS NULL OR u.region = $2)"#,
        )
        .bind(currency.as_str())
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
impl AdViewRepository for PostgresRepo {
    async fn record_view(&self, view: AdView) -> Result<(), RepoError> {
        sqlx::query(r#"INSERT INTO ad_views (ad_id, viewer_id, viewed_at) VALUES ($1, $2, $3)"#)
            .bind(view.ad_id.into_uuid())
            .bind(view.viewer_id.map(UserId::into_uuid))
            .bind(view.viewed_at)
            .execute(&self.pool)
            .await
            .map_err(map_write_error)?;
        Ok(())
    }

    async fn view_timestamps(&self, ad_id: AdId) -> Result<Vec<DateTime<Utc>>, RepoError> {
        let rows: Vec<DbViewedAt> = sqlx::query_as(
            r#"SELECT viewed_at FROM ad_views WHERE ad_id = $1 ORDER BY viewed_at"#,
        )
        .bind(ad_id.into_uuid())
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
impl UserRepository for PostgresRepo {
    async fn create_user(&self, mut user: User) -> Result<(User, String), RepoError> {
        let raw_key = generate_api_key();
        let api_key = ApiKey::new(hash_api_key(&raw_key), user.id);
        // TIMESTAMPTZ keeps microseconds.
        user.created_at = user.created_at.trunc_subsecs(6);

        let mut db_tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepoError::Transaction(e.to_string()))?;

        sqlx::query(
            r#"INSERT INTO users (id, email, is_premium, region, created_at) VALUES ($1, $2, $3, $4, $5)"#,
        )
        .bind(user.id.into_uuid())
        .bind(&user.email)
        .bind(user.is_premium)
        .bind(&user.region)
        .bind(user.created_at)
        .execute(&mut *db_tx)
        .await
        .map_err(map_write_error)?;

        sqlx::query(
            r#"INSERT INTO api_keys (id, user_id, key_hash, is_active, created_at) VALUES ($1, $2, $3, $4, $5)"#,
        )
        .bind(api_key.id.into_uuid())
        .bind(api_key.user_id.into_uuid())
        .bind(&api_key.key_hash)
        .bind(api_key.is_active)
        .bind(api_key.created_at)
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
            r#"SELECT id, email, is_premium, region, created_at FROM users WHERE id = $1"#,
        )
        .bind(id.into_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        row.map(DbUser::into_domain).transpose()
    }

    async fn find_user_by_api_key_hash(&self, key_hash: &str) -> Result<Option<User>, RepoError> {
        let row: Option<DbUser> = sqlx::query_as(
            r#"SELECT u.id, u.email, u.is_premium, u.region, u.created_at
               FROM api_keys k JOIN users u ON u.id = k.user_id
               WHERE k.key_hash = $1 AND k.is_active = TRUE"#,
        )
        .bind(key_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        if row.is_some() {
            sqlx::query(r#"UPDATE api_keys SET last_used_at = NOW() WHERE key_hash = $1"#)
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
impl CatalogRepository for PostgresRepo {
    async fn create_brand(&self, brand: CarBrand) -> Result<CarBrand, RepoError> {
        sqlx::query(r#"INSERT INTO car_brands (id, name) VALUES ($1, $2)"#)
            .bind(brand.id.into_uuid())
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
        sqlx::query(r#"INSERT INTO car_models (id, brand_id, name) VALUES ($1, $2, $3)"#)
            .bind(model.id.into_uuid())
            .bind(model.brand_id.into_uuid())
            .bind(&model.name)
            .execute(&self.pool)
            .await
            .map_err(map_write_error)?;
        Ok(model)
    }

    async fn list_models(&self, brand_id: Option<CarBrandId>) -> Result<Vec<CarModel>, RepoError> {
        let rows: Vec<DbCarModel> = sqlx::query_as(
            r#"SELECT id, brand_id, name FROM car_models
               WHERE ($1::UUID IS NULL OR brand_id = $1) ORDER BY name"#,
        )
        .bind(brand_id.map(CarBrandId::into_uuid))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        rows.into_iter().map(DbCarModel::into_domain).collect()
    }

    async fn get_model(&self, id: CarModelId) -> Result<Option<CarModel>, RepoError> {
        let row: Option<DbCarModel> =
            sqlx::query_as(r#"SELECT id, brand_id, name FROM car_models WHERE id = $1"#)
                .bind(id.into_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| RepoError::Database(e.to_string()))?;

        row.map(DbCarModel::into_domain).transpose()
    }

    async fn create_missing_make_request(
        &self,
        mut request: MissingMakeRequest,
    ) -> Result<MissingMakeRequest, RepoError> {
        request.created_at = request.created_at.trunc_subsecs(6);

        sqlx::query(
            r#"INSERT INTO missing_make_requests (id, car_make, seller_id, created_at) VALUES ($1, $2, $3, $4)"#,
        )
        .bind(request.id.into_uuid())
        .bind(&request.car_make)
        .bind(request.seller_id.into_uuid())
        .bind(request.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_write_error)?;

        Ok(request)
    }

    async fn list_missing_make_requests(
        &self,
        seller_id: UserId,
    ) -> Result<Vec<MissingMakeRequest>, RepoError> {
        let rows: Vec<DbMissingMakeRequest> = sqlx::query_as(
            r#"SELECT id, car_make, seller_id, created_at FROM missing_make_requests
               WHERE seller_id = $1 ORDER BY created_at DESC"#,
        )
        .bind(seller_id.into_uuid())
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
impl ConversationRepository for PostgresRepo {
    async fn create_conversation(
        &self,
        mut conversation: Conversation,
    ) -> Result<Conversation, RepoError> {
        conversation.created_at = conversation.created_at.trunc_subsecs(6);

        // Inserts nothing unless the ad belongs to the named seller.
        let result = sqlx::query(
            r#"INSERT INTO conversations (id, ad_id, buyer_id, seller_id, created_at)
               SELECT $1, a.id, $2, a.seller_id, $3 FROM ads a WHERE a.id = $4 AND a.seller_id = $5"#,
        )
        .bind(conversation.id.into_uuid())
        .bind(conversation.buyer_id.into_uuid())
        .bind(conversation.created_at)
        .bind(conversation.ad_id.into_uuid())
        .bind(conversation.seller_id.into_uuid())
        .execute(&self.pool)
        .await
        .map_err(map_write_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }

        Ok(conversation)
    }

    async fn list_conversations(&self, user: UserId) -> Result<Vec<Conversation>, RepoError> {
        let rows: Vec<DbConversation> = sqlx::query_as(
            r#"SELECT id, ad_id, buyer_id, seller_id, created_at FROM conversations
               WHERE buyer_id = $1 OR seller_id = $1 ORDER BY created_at DESC"#,
        )
        .bind(user.into_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        rows.into_iter().map(DbConversation::into_domain).collect()
    }
}
