//! User profile and resolved request principal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

uuid_id! {
    /// Unique identifier for a User.
    UserId
}

/// A registered marketplace user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    /// Premium accounts see ad statistics.
    pub is_premium: bool,
    /// Region used for regional price averages.
    pub region: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Creates a new user.
    ///
    /// # Validation
    /// - Email must contain `@` with text on both sides
    /// - A supplied region cannot be blank
    pub fn new(email: String, is_premium: bool, region: Option<String>) -> Result<Self, DomainError> {
        let email = email.trim().to_lowercase();
        match email.split_once('@') {
            Some((local, domain)) if !local.is_empty() && !domain.is_empty() => {}
            _ => {
                return Err(DomainError::ValidationError(format!(
                    "Invalid email address: {email}"
                )));
            }
        }

        let region = match region {
            Some(r) if r.trim().is_empty() => {
                return Err(DomainError::ValidationError("Region cannot be empty".into()));
            }
            Some(r) => Some(r.trim().to_string()),
            None => None,
        };

        Ok(Self {
            id: UserId::new(),
            email,
            is_premium,
            region,
            created_at: Utc::now(),
        })
    }
}

/// The authenticated caller of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: UserId,
    pub is_premium: bool,
    pub region: Option<String>,
}

impl From<&User> for Principal {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.id,
            is_premium: user.is_premium,
            region: user.region.clone(),
        }
    }
}
