//! Premium statistics.

use std::future::Future;

use chrono::{DateTime, Utc};

use market_types::domain::statistics::average;
use market_types::{Ad, MarketRepository, RepoError, StatisticsBundle, StatisticsUnavailable, ViewCounts};

use super::MarketService;

impl<R: MarketRepository> MarketService<R> {
    /// View counts and price averages for `ad` as of `as_of`.
    ///
    /// Averages are in the ad's own currency over active ads. The regional
    /// one is absent when the seller has no region.
    pub async fn compute_statistics(
        &self,
        ad: &Ad,
        as_of: DateTime<Utc>,
    ) -> Result<StatisticsBundle, StatisticsUnavailable> {
        let views = self.soft_bounded(self.repo.view_timestamps(ad.id)).await?;
        let counts = ViewCounts::tally(&views, as_of);

        let region = self
            .soft_bounded(self.repo.get_user(ad.seller_id))
            .await?
            .and_then(|seller| seller.region);

        let regional = match region.as_deref() {
            Some(region) => {
                let prices = self
                    .soft_bounded(self.repo.active_prices(ad.currency, Some(region)))
                    .await?;
                average(&prices)
            }
            None => None,
        };

        let national = self
            .soft_bounded(self.repo.active_prices(ad.currency, None))
            .await?;

        Ok(StatisticsBundle::new(
            counts,
            ad.currency,
            regional,
            average(&national),
        ))
    }

    async fn soft_bounded<T>(
        &self,
        call: impl Future<Output = Result<T, RepoError>>,
    ) -> Result<T, StatisticsUnavailable> {
        tokio::time::timeout(self.config.store_timeout, call)
            .await
            .map_err(|_| StatisticsUnavailable::TimedOut)?
            .map_err(StatisticsUnavailable::Store)
    }
}
