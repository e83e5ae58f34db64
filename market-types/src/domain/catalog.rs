//! Car brand / model taxonomy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::UserId;
use crate::error::DomainError;

uuid_id! {
    /// Unique identifier for a CarBrand.
    CarBrandId
}

uuid_id! {
    /// Unique identifier for a CarModel.
    CarModelId
}

uuid_id! {
    /// Unique identifier for a MissingMakeRequest.
    MissingMakeRequestId
}

/// Longest make name a seller may ask for.
const MAX_MAKE_NAME: usize = 255;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CarBrand {
    pub id: CarBrandId,
    #[schema(example = "Toyota")]
    pub name: String,
}

impl CarBrand {
    pub fn new(name: String) -> Result<Self, DomainError> {
        Ok(Self {
            id: CarBrandId::new(),
            name: catalog_name("brand", name)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CarModel {
    pub id: CarModelId,
    pub brand_id: CarBrandId,
    #[schema(example = "Corolla")]
    pub name: String,
}

impl CarModel {
    pub fn new(brand_id: CarBrandId, name: String) -> Result<Self, DomainError> {
        Ok(Self {
            id: CarModelId::new(),
            brand_id,
            name: catalog_name("model", name)?,
        })
    }
}

/// A seller asking for a car make the catalog does not list yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct MissingMakeRequest {
    pub id: MissingMakeRequestId,
    #[schema(example = "Lada")]
    pub car_make: String,
    pub seller_id: UserId,
    pub created_at: DateTime<Utc>,
}

impl MissingMakeRequest {
    pub fn new(car_make: String, seller_id: UserId) -> Result<Self, DomainError> {
        let car_make = catalog_name("make", car_make)?;
        if car_make.chars().count() > MAX_MAKE_NAME {
            return Err(DomainError::ValidationError(format!(
                "Car make name is longer than {MAX_MAKE_NAME} characters"
            )));
        }
        Ok(Self {
            id: MissingMakeRequestId::new(),
            car_make,
            seller_id,
            created_at: Utc::now(),
        })
    }

    /// True when `brand` already covers the requested make, ignoring case.
    pub fn is_covered_by(&self, brand: &CarBrand) -> bool {
        brand.name.to_lowercase() == self.car_make.to_lowercase()
    }
}

fn catalog_name(kind: &str, name: String) -> Result<String, DomainError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(DomainError::ValidationError(format!(
            "Car {kind} name cannot be empty"
        )));
    }
    Ok(trimmed.to_string())
}
