//! Premium statistics: view windows and price averages.

use chrono::{DateTime, Duration, Utc};
use exchange_rates::{CurrencyCode, round_price};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Width of the "week" window, in days.
pub const WEEK_DAYS: i64 = 7;
/// Width of the "month" window, in days.
pub const MONTH_DAYS: i64 = 30;

/// View counts over the fixed windows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ViewCounts {
    pub total: u64,
    pub today: u64,
    pub week: u64,
    pub month: u64,
}

impl ViewCounts {
    /// Buckets view timestamps relative to `as_of`.
    ///
    /// `today` compares UTC calendar dates; `week` and `month` are the closed
    /// intervals `[as_of - 7d, as_of]` and `[as_of - 30d, as_of]`.
    pub fn tally(views: &[DateTime<Utc>], as_of: DateTime<Utc>) -> Self {
        let today = as_of.date_naive();
        let week_start = as_of - Duration::days(WEEK_DAYS);
        let month_start = as_of - Duration::days(MONTH_DAYS);

        views.iter().fold(Self::default(), |mut acc, &at| {
            acc.total += 1;
            if at.date_naive() == today {
                acc.today += 1;
            }
            if at >= week_start && at <= as_of {
                acc.week += 1;
            }
            if at >= month_start && at <= as_of {
                acc.month += 1;
            }
            acc
        })
    }
}

/// Mean of `prices`, rounded half-up to two decimals. `None` when empty.
pub fn average(prices: &[Decimal]) -> Option<Decimal> {
    if prices.is_empty() {
        return None;
    }
    let sum = prices
        .iter()
        .try_fold(Decimal::ZERO, |acc, p| acc.checked_add(*p))?;
    sum.checked_div(Decimal::from(prices.len() as u64))
        .map(round_price)
}

/// Extended statistics shown to premium viewers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct StatisticsBundle {
    #[schema(example = 42)]
    pub views_total: u64,
    pub views_today: u64,
    pub views_week: u64,
    pub views_month: u64,
    /// Average price among active ads from the seller's region
    #[schema(value_type = Option<String>, example = "18250.00")]
    pub average_price_region: Option<Decimal>,
    /// Average price among all active ads
    #[schema(value_type = Option<String>, example = "17400.50")]
    pub average_price_ukraine: Option<Decimal>,
    /// Currency both averages are denominated in
    pub currency: CurrencyCode,
}

impl StatisticsBundle {
    pub fn new(
        views: ViewCounts,
        currency: CurrencyCode,
        average_price_region: Option<Decimal>,
        average_price_ukraine: Option<Decimal>,
    ) -> Self {
        Self {
            views_total: views.total,
            views_today: views.today,
            views_week: views.week,
            views_month: views.month,
            average_price_region,
            average_price_ukraine,
            currency,
        }
    }
}
