//! Ad domain model.

use chrono::{DateTime, Utc};
use exchange_rates::{CurrencyCode, PRICE_SCALE, PriceBasket};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{CarBrandId, CarModelId, StatisticsBundle, UserId};
use crate::error::DomainError;

uuid_id! {
    /// Unique identifier for an Ad.
    AdId
}

/// Number of successful edits an ad accepts before the next one deactivates it.
pub const EDIT_ATTEMPT_CAP: u32 = 3;

/// Exclusive upper bound on listed prices (fits `NUMERIC(10, 2)`).
const MAX_PRICE: Decimal = Decimal::from_parts(100_000_000, 0, 0, false, 0);

/// A car-sale advertisement together with its converted price basket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ad {
    pub id: AdId,
    pub title: String,
    pub description: String,
    pub price: Decimal,
    pub currency: CurrencyCode,
    pub car_model_id: CarModelId,
    pub seller_id: UserId,
    pub is_active: bool,
    pub edit_attempts: u32,
    /// Snapshot of `price` in every other currency known at pricing time.
    pub prices: PriceBasket,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Ad {
    /// Text handed to the content filter.
    pub fn content_text(&self) -> String {
        format!("{} {}", self.title, self.description)
    }

    /// Returns a copy with `changes` applied. Counters and flags are untouched.
    pub fn with_changes(&self, changes: &AdChanges) -> Ad {
        let mut next = self.clone();
        if let Some(title) = &changes.title {
            next.title = title.clone();
        }
        if let Some(description) = &changes.description {
            next.description = description.clone();
        }
        if let Some(price) = changes.price {
            next.price = price;
        }
        if let Some(currency) = changes.currency {
            next.currency = currency;
        }
        if let Some(model) = changes.car_model_id {
            next.car_model_id = model;
        }
        next
    }

    pub fn is_seller(&self, user: UserId) -> bool {
        self.seller_id == user
    }

    pub fn edits_exhausted(&self, cap: u32) -> bool {
        self.edit_attempts >= cap
    }

    pub fn price_basis(&self) -> PriceBasis {
        PriceBasis {
            price: self.price,
            currency: self.currency,
        }
    }
}

/// Stored price and currency a replacement basket was computed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceBasis {
    pub price: Decimal,
    pub currency: CurrencyCode,
}

/// Seller-supplied input for a new ad.
#[derive(Debug, Clone, PartialEq)]
pub struct AdDraft {
    pub title: String,
    pub description: String,
    pub price: Decimal,
    pub currency: CurrencyCode,
    pub car_model_id: CarModelId,
}

impl AdDraft {
    /// Validates the draft.
    ///
    /// # Validation
    /// - Title and description cannot be blank
    /// - Price must be positive, below 10^8, with at most two decimals
    pub fn validate(&self) -> Result<(), DomainError> {
        validate_text("title", &self.title)?;
        validate_text("description", &self.description)?;
        validate_price(self.price)
    }

    pub fn content_text(&self) -> String {
        format!("{} {}", self.title, self.description)
    }
}

/// Partial update of an ad. `None` leaves the field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub currency: Option<CurrencyCode>,
    pub car_model_id: Option<CarModelId>,
}

impl AdChanges {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.price.is_none()
            && self.currency.is_none()
            && self.car_model_id.is_none()
    }

    /// True when the price basket has to be rebuilt.
    pub fn touches_price(&self) -> bool {
        self.price.is_some() || self.currency.is_some()
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.is_empty() {
            return Err(DomainError::EmptyChanges);
        }
        if let Some(title) = &self.title {
            validate_text("title", title)?;
        }
        if let Some(description) = &self.description {
            validate_text("description", description)?;
        }
        if let Some(price) = self.price {
            validate_price(price)?;
        }
        Ok(())
    }
}

/// Everything a store needs to insert an ad.
#[derive(Debug, Clone)]
pub struct NewAd {
    pub draft: AdDraft,
    pub seller_id: UserId,
    pub is_active: bool,
}

/// A validated, priced and filtered edit ready for the store's
/// check-and-increment.
#[derive(Debug, Clone)]
pub struct AdEdit {
    pub changes: AdChanges,
    /// Content filter verdict on the edited text. Flagged edits deactivate.
    pub flagged: bool,
    /// Replacement basket when price or currency changed.
    pub repriced: Option<PriceBasket>,
    /// Set together with `repriced`. The store refuses the edit with
    /// `RepoError::Conflict` when the stored price or currency no longer
    /// match, since the basket would then describe a different price.
    pub priced_against: Option<PriceBasis>,
    pub cap: u32,
}

/// Result of an edit request.
#[derive(Debug, Clone, PartialEq)]
pub enum EditOutcome {
    /// Edit persisted, counter incremented.
    Applied(Ad),
    /// Counter was at the cap: nothing changed except `is_active = false`.
    LimitExceeded(Ad),
}

impl EditOutcome {
    pub fn ad(&self) -> &Ad {
        match self {
            EditOutcome::Applied(ad) | EditOutcome::LimitExceeded(ad) => ad,
        }
    }

    pub fn into_ad(self) -> Ad {
        match self {
            EditOutcome::Applied(ad) | EditOutcome::LimitExceeded(ad) => ad,
        }
    }
}

/// An ad as seen by a particular viewer.
#[derive(Debug, Clone, PartialEq)]
pub struct AdDetails {
    pub ad: Ad,
    /// Present only for premium viewers when statistics could be computed.
    pub statistics: Option<StatisticsBundle>,
}

/// Listing filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdFilter {
    pub brand_id: Option<CarBrandId>,
}

fn validate_text(field: &str, value: &str) -> Result<(), DomainError> {
    if value.trim().is_empty() {
        return Err(DomainError::ValidationError(format!(
            "Ad {field} cannot be empty"
        )));
    }
    Ok(())
}

fn validate_price(price: Decimal) -> Result<(), DomainError> {
    if price <= Decimal::ZERO {
        return Err(DomainError::NonPositivePrice);
    }
    if price.normalize().scale() > PRICE_SCALE {
        return Err(DomainError::TooManyDecimals);
    }
    if price >= MAX_PRICE {
        return Err(DomainError::PriceTooLarge);
    }
    Ok(())
}
