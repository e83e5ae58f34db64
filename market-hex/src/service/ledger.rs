//! Currency ledger and price conversion.

use chrono::{NaiveDate, Utc};
use exchange_rates::{RateSheet, reference_rates};
use rust_decimal::Decimal;

use market_types::{
    AppError, ConvertQuery, ConvertResponse, Currency, CurrencyCode, ExchangeRate,
    MarketRepository, PriceBasket, RateResponse,
};

use super::MarketService;

impl<R: MarketRepository> MarketService<R> {
    /// Loads a snapshot of every currency and every rate in effect up to `as_of`.
    pub(crate) async fn rate_sheet(&self, as_of: NaiveDate) -> Result<RateSheet, AppError> {
        let currencies = self.bounded(self.repo.list_currencies()).await?;
        let rates = self.bounded(self.repo.rates_as_of(as_of)).await?;
        Ok(RateSheet::new(currencies, rates)?)
    }

    /// Lists all known currencies.
    pub async fn list_currencies(&self) -> Result<Vec<Currency>, AppError> {
        self.bounded(self.repo.list_currencies()).await
    }

    /// Rate of `code` against the base unit on `as_of`.
    pub async fn rate_of(&self, code: CurrencyCode, as_of: NaiveDate) -> Result<Decimal, AppError> {
        let sheet = self.rate_sheet(as_of).await?;
        Ok(sheet.rate_of(code, as_of)?)
    }

    /// Effective rate per currency on `as_of` (today when `None`).
    ///
    /// Currencies with no rate yet are listed without one.
    #[tracing::instrument(skip(self))]
    pub async fn current_rates(
        &self,
        as_of: Option<NaiveDate>,
    ) -> Result<Vec<RateResponse>, AppError> {
        let as_of = as_of.unwrap_or_else(today);
        let sheet = self.rate_sheet(as_of).await?;

        Ok(sheet
            .currencies()
            .map(|currency| {
                let effective = sheet.effective_rate(currency.code, as_of);
                RateResponse {
                    currency: currency.code,
                    name: currency.name.clone(),
                    rate: effective.map(|r| r.rate),
                    effective_date: effective.map(|r| r.effective_date),
                }
            })
            .collect())
    }

    /// Converts `amount` of `source` into every other currency.
    pub async fn convert_to_all(
        &self,
        amount: Decimal,
        source: CurrencyCode,
        as_of: NaiveDate,
    ) -> Result<PriceBasket, AppError> {
        let sheet = self.rate_sheet(as_of).await?;
        Ok(sheet.convert_to_all(amount, source, as_of)?)
    }

    /// Converts `amount` between a single pair of currencies.
    pub async fn convert(
        &self,
        amount: Decimal,
        from: CurrencyCode,
        to: CurrencyCode,
        as_of: NaiveDate,
    ) -> Result<Decimal, AppError> {
        let sheet = self.rate_sheet(as_of).await?;
        Ok(sheet.convert(amount, from, to, as_of)?)
    }

    /// Price basket preview for the conversion endpoint.
    #[tracing::instrument(skip(self), fields(amount = %query.amount, from = %query.from))]
    pub async fn preview_conversion(&self, query: ConvertQuery) -> Result<ConvertResponse, AppError> {
        let as_of = query.as_of.unwrap_or_else(today);
        let prices = self.convert_to_all(query.amount, query.from, as_of).await?;
        Ok(ConvertResponse {
            amount: query.amount,
            currency: query.from,
            prices,
        })
    }

    /// Adds a currency or renames an existing one.
    pub async fn upsert_currency(&self, currency: Currency) -> Result<Currency, AppError> {
        self.bounded(self.repo.upsert_currency(currency)).await
    }

    /// Appends a rate row effective from `effective_date`.
    #[tracing::instrument(skip(self))]
    pub async fn record_rate(
        &self,
        currency: CurrencyCode,
        rate: Decimal,
        effective_date: NaiveDate,
    ) -> Result<ExchangeRate, AppError> {
        ExchangeRate::validate(currency, rate)?;
        self.bounded(self.repo.record_rate(currency, rate, effective_date))
            .await
    }

    /// Installs the USD / EUR / UAH reference table when the ledger is empty.
    ///
    /// Returns `false` when currencies already exist.
    pub async fn seed_reference_rates(&self, effective_date: NaiveDate) -> Result<bool, AppError> {
        if !self.list_currencies().await?.is_empty() {
            return Ok(false);
        }

        for (currency, rate) in reference_rates() {
            let code = currency.code;
            self.upsert_currency(currency).await?;
            self.record_rate(code, rate, effective_date).await?;
        }

        tracing::info!(%effective_date, "seeded reference exchange rates");
        Ok(true)
    }
}

pub(crate) fn today() -> NaiveDate {
    Utc::now().date_naive()
}
