//! Data Transfer Objects (DTOs) for requests and responses.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use exchange_rates::CurrencyCode;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::domain::{
    Ad, AdChanges, AdDetails, AdDraft, AdId, CarBrandId, CarModelId, StatisticsBundle, User,
    UserId,
};

// ─────────────────────────────────────────────────────────────────────────────
// User DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// Request to register a new user.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RegisterUserRequest {
    #[schema(example = "olena@example.com")]
    pub email: String,
    /// Premium accounts see ad statistics
    #[serde(default)]
    pub is_premium: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(example = "Kyiv")]
    pub region: Option<String>,
}

/// Public profile of a user.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    pub id: UserId,
    #[schema(example = "olena@example.com")]
    pub email: String,
    pub is_premium: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            is_premium: user.is_premium,
            region: user.region,
            created_at: user.created_at,
        }
    }
}

/// Response after registering. The API key is shown only here.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RegisterUserResponse {
    pub user: UserResponse,
    #[schema(example = "sk_3f9a...")]
    pub api_key: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Currency DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// Query for the effective rate table.
#[derive(Debug, Clone, Default, Serialize, Deserialize, IntoParams)]
pub struct RatesQuery {
    /// Date to evaluate rates at (defaults to today, UTC)
    pub as_of: Option<NaiveDate>,
}

/// Effective rate of one currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RateResponse {
    pub currency: CurrencyCode,
    #[schema(example = "US Dollar")]
    pub name: String,
    /// Absent when the currency has no rate on or before `as_of`
    #[schema(value_type = Option<String>, example = "37.0")]
    pub rate: Option<Decimal>,
    pub effective_date: Option<NaiveDate>,
}

/// Query for a price conversion preview.
#[derive(Debug, Clone, Serialize, Deserialize, IntoParams)]
pub struct ConvertQuery {
    #[param(value_type = String, example = "1000")]
    pub amount: Decimal,
    #[param(value_type = String, example = "USD")]
    pub from: CurrencyCode,
    pub as_of: Option<NaiveDate>,
}

/// Conversion preview: `amount` in every other known currency.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ConvertResponse {
    #[schema(value_type = String, example = "1000")]
    pub amount: Decimal,
    pub currency: CurrencyCode,
    #[schema(value_type = HashMap<String, String>)]
    pub prices: BTreeMap<CurrencyCode, Decimal>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Catalog DTOs
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateBrandRequest {
    #[schema(example = "Toyota")]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateModelRequest {
    pub brand_id: CarBrandId,
    #[schema(example = "Corolla")]
    pub name: String,
}

/// Optional brand filter, shared by model and ad listings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, IntoParams)]
pub struct BrandQuery {
    pub brand_id: Option<CarBrandId>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Ad DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// Request to publish a new ad.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateAdRequest {
    #[schema(example = "Toyota Corolla 2018")]
    pub title: String,
    #[schema(example = "Single owner, 82 000 km")]
    pub description: String,
    /// Listed price, at most two decimals
    #[schema(value_type = String, example = "14500.00")]
    pub price: Decimal,
    pub currency: CurrencyCode,
    pub car_model_id: CarModelId,
}

impl From<CreateAdRequest> for AdDraft {
    fn from(req: CreateAdRequest) -> Self {
        Self {
            title: req.title,
            description: req.description,
            price: req.price,
            currency: req.currency,
            car_model_id: req.car_model_id,
        }
    }
}

/// Partial ad update. Omitted fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdateAdRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>, example = "13900.00")]
    pub price: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<CurrencyCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub car_model_id: Option<CarModelId>,
}

impl From<UpdateAdRequest> for AdChanges {
    fn from(req: UpdateAdRequest) -> Self {
        Self {
            title: req.title,
            description: req.description,
            price: req.price,
            currency: req.currency,
            car_model_id: req.car_model_id,
        }
    }
}

/// An ad with its converted prices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AdResponse {
    pub id: AdId,
    pub title: String,
    pub description: String,
    #[schema(value_type = String, example = "14500.00")]
    pub price: Decimal,
    pub currency: CurrencyCode,
    pub car_model_id: CarModelId,
    pub seller_id: UserId,
    pub is_active: bool,
    pub edit_attempts: u32,
    /// Price in every other currency, fixed at pricing time
    #[schema(value_type = HashMap<String, String>)]
    pub prices: BTreeMap<CurrencyCode, Decimal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Ad> for AdResponse {
    fn from(ad: Ad) -> Self {
        Self {
            id: ad.id,
            title: ad.title,
            description: ad.description,
            price: ad.price,
            currency: ad.currency,
            car_model_id: ad.car_model_id,
            seller_id: ad.seller_id,
            is_active: ad.is_active,
            edit_attempts: ad.edit_attempts,
            prices: ad.prices,
            created_at: ad.created_at,
            updated_at: ad.updated_at,
        }
    }
}

/// Ad fields plus statistics for premium viewers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AdDetailsResponse {
    #[serde(flatten)]
    pub ad: AdResponse,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statistics: Option<StatisticsBundle>,
}

impl From<AdDetails> for AdDetailsResponse {
    fn from(details: AdDetails) -> Self {
        Self {
            ad: details.ad.into(),
            statistics: details.statistics,
        }
    }
}

/// Result of an update. `detail` is set when the edit was refused.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdateAdResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(example = "edit limit exceeded")]
    pub detail: Option<String>,
    pub ad: AdResponse,
}

// ─────────────────────────────────────────────────────────────────────────────
// Conversation and catalog request DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// Request to start a conversation with the seller of an ad.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OpenConversationRequest {
    pub ad_id: AdId,
}

/// Request to add a car make that is not in the catalog yet.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateMissingMakeRequest {
    #[schema(example = "Lada")]
    pub car_make: String,
}
