//! Marketplace Application Service
//!
//! Orchestrates domain operations through the repository ports.
//! Contains NO infrastructure logic - pure business orchestration.
//!
//! The impl is split by concern:
//! - `ledger` - currencies, rates and price conversion
//! - `lifecycle` - users, catalog and the ad create/edit/retrieve flow
//! - `statistics` - premium view and price statistics
//! - `conversations` - buyer-seller threads and missing-make requests

mod conversations;
mod ledger;
mod lifecycle;
mod statistics;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use market_types::{AppError, ContentFilter, MarketRepository, RepoError};

/// Tunables of the service layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Upper bound on every single store call.
    pub store_timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            store_timeout: Duration::from_millis(5000),
        }
    }
}

/// Application service for the marketplace.
///
/// Generic over `R: MarketRepository` - the adapter is injected at compile time.
/// The content filter is a runtime collaborator so deployments can swap it
/// without recompiling.
pub struct MarketService<R: MarketRepository> {
    repo: R,
    filter: Arc<dyn ContentFilter>,
    config: ServiceConfig,
}

impl<R: MarketRepository> MarketService<R> {
    /// Creates a service with the default configuration.
    pub fn new(repo: R, filter: Arc<dyn ContentFilter>) -> Self {
        Self::with_config(repo, filter, ServiceConfig::default())
    }

    pub fn with_config(repo: R, filter: Arc<dyn ContentFilter>, config: ServiceConfig) -> Self {
        Self {
            repo,
            filter,
            config,
        }
    }

    /// Returns a reference to the underlying repository.
    pub fn repo(&self) -> &R {
        &self.repo
    }

    pub fn config(&self) -> ServiceConfig {
        self.config
    }

    /// Runs one store call under the configured timeout.
    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, RepoError>>,
    ) -> Result<T, AppError> {
        match tokio::time::timeout(self.config.store_timeout, call).await {
            Ok(result) => result.map_err(Into::into),
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.config.store_timeout.as_millis() as u64,
                    "store call timed out"
                );
                Err(AppError::Timeout)
            }
        }
    }
}
