//! Error types for the marketplace.

use exchange_rates::ConversionError;

use crate::domain::CarModelId;

/// Domain-level errors (business rule violations).
#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    #[error("Price must be positive")]
    NonPositivePrice,

    #[error("Price may have at most 2 decimal places")]
    TooManyDecimals,

    #[error("Price must be below 100000000")]
    PriceTooLarge,

    #[error("No changes supplied")]
    EmptyChanges,

    #[error("Car model not found: {0}")]
    CarModelNotFound(CarModelId),

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Repository-level errors (data access failures).
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Entity not found")]
    NotFound,

    #[error("Conflict: {0}")]
    Conflict(String),
}

/// Why statistics could not be produced. Never surfaces past ad retrieval.
#[derive(Debug, thiserror::Error)]
pub enum StatisticsUnavailable {
    #[error("statistics store failure: {0}")]
    Store(#[from] RepoError),

    #[error("statistics store timed out")]
    TimedOut,
}

/// Application-level errors (for HTTP responses).
///
/// Maps cleanly to HTTP status codes.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Store operation timed out")]
    Timeout,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<RepoError> for AppError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::Domain(e) => e.into(),
            RepoError::NotFound => AppError::NotFound("Resource not found".into()),
            RepoError::Database(e) => AppError::Internal(e),
            RepoError::Transaction(e) => AppError::Internal(e),
            RepoError::Conflict(e) => AppError::Conflict(e),
        }
    }
}

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::CarModelNotFound(id) => {
                AppError::NotFound(format!("Car model not found: {}", id))
            }
            DomainError::ValidationError(msg) => AppError::BadRequest(msg),
            e => AppError::BadRequest(e.to_string()),
        }
    }
}

impl From<ConversionError> for AppError {
    fn from(err: ConversionError) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exchange_rates::EUR;

    #[test]
    fn test_repo_errors_map_to_app_errors() {
        assert!(matches!(AppError::from(RepoError::NotFound), AppError::NotFound(_)));
        assert!(matches!(
            AppError::from(RepoError::Conflict("email taken".into())),
            AppError::Conflict(_)
        ));
        assert!(matches!(
            AppError::from(RepoError::Database("boom".into())),
            AppError::Internal(_)
        ));
        assert!(matches!(
            AppError::from(RepoError::Domain(DomainError::CarModelNotFound(CarModelId::new()))),
            AppError::NotFound(_)
        ));
    }

    #[test]
    fn test_conversion_errors_are_bad_requests() {
        let err = AppError::from(DomainError::from(ConversionError::UnknownCurrency(EUR)));
        assert!(matches!(err, AppError::BadRequest(msg) if msg.contains("EUR")));
    }
}
