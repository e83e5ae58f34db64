//! Currency Ledger and Price Conversion Engine
//!
//! Currencies are runtime reference data identified by a three-letter
//! [`CurrencyCode`]. Every currency carries a history of dated rates against
//! an implicit base unit. A [`RateSheet`] is an immutable snapshot of that
//! history: it answers "what was the rate of X on day D" and converts an
//! amount into every other known currency.
//!
//! All arithmetic is fixed-point ([`rust_decimal::Decimal`]); converted
//! prices are rounded half-up to two decimal places.
//!
//! # Example
//! ```
//! use chrono::NaiveDate;
//! use exchange_rates::{Currency, ExchangeRate, RateSheet, EUR, UAH, USD};
//! use rust_decimal::Decimal;
//!
//! let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
//! let sheet = RateSheet::new(
//!     [
//!         Currency::new(USD, "US Dollar"),
//!         Currency::new(EUR, "Euro"),
//!         Currency::new(UAH, "Ukrainian Hryvnia"),
//!     ],
//!     [
//!         ExchangeRate::new(USD, Decimal::new(10, 1), day, 1),
//!         ExchangeRate::new(EUR, Decimal::new(9, 1), day, 2),
//!         ExchangeRate::new(UAH, Decimal::new(370, 1), day, 3),
//!     ],
//! )
//! .unwrap();
//!
//! let basket = sheet.convert_to_all(Decimal::new(1000, 0), USD, day).unwrap();
//! assert_eq!(basket[&EUR].to_string(), "900.00");
//! assert_eq!(basket[&UAH].to_string(), "37000.00");
//! assert!(!basket.contains_key(&USD));
//! ```

use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Number of fractional digits kept on every price.
pub const PRICE_SCALE: u32 = 2;

/// Converted prices keyed by target currency.
pub type PriceBasket = BTreeMap<CurrencyCode, Decimal>;

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Failures of rate lookup and conversion. All of them are fatal to the
/// operation that asked for a conversion.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConversionError {
    #[error("Unknown currency: {0}")]
    UnknownCurrency(CurrencyCode),

    #[error("No exchange rate for {currency} on or before {as_of}")]
    NoRateAvailable {
        currency: CurrencyCode,
        as_of: NaiveDate,
    },

    #[error("Amount must be positive, got {0}")]
    InvalidAmount(Decimal),

    #[error("Exchange rate for {currency} must be positive, got {rate}")]
    InvalidRate { currency: CurrencyCode, rate: Decimal },

    #[error("Invalid currency code: {0:?}")]
    InvalidCurrencyCode(String),

    #[error("Arithmetic overflow while converting {0}")]
    Overflow(Decimal),
}

// ─────────────────────────────────────────────────────────────────────────────
// Currency codes
// ─────────────────────────────────────────────────────────────────────────────

/// A three-letter, upper-case ISO-style currency code.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CurrencyCode([u8; 3]);

pub const USD: CurrencyCode = CurrencyCode(*b"USD");
pub const EUR: CurrencyCode = CurrencyCode(*b"EUR");
pub const UAH: CurrencyCode = CurrencyCode(*b"UAH");

impl CurrencyCode {
    /// Parses and normalizes a code; accepts any case, rejects anything that
    /// is not exactly three ASCII letters.
    pub fn new(code: &str) -> Result<Self, ConversionError> {
        let trimmed = code.trim();
        let bytes = trimmed.as_bytes();
        if bytes.len() != 3 || !bytes.iter().all(u8::is_ascii_alphabetic) {
            return Err(ConversionError::InvalidCurrencyCode(code.to_string()));
        }
        Ok(Self([
            bytes[0].to_ascii_uppercase(),
            bytes[1].to_ascii_uppercase(),
            bytes[2].to_ascii_uppercase(),
        ]))
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("???")
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CurrencyCode({})", self.as_str())
    }
}

impl FromStr for CurrencyCode {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl Serialize for CurrencyCode {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for CurrencyCode {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(d)?;
        Self::new(&raw).map_err(serde::de::Error::custom)
    }
}

impl utoipa::PartialSchema for CurrencyCode {
    fn schema() -> utoipa::openapi::RefOr<utoipa::openapi::schema::Schema> {
        use utoipa::openapi::schema::{ObjectBuilder, Schema, Type};

        utoipa::openapi::RefOr::T(Schema::Object(
            ObjectBuilder::new()
                .schema_type(Type::String)
                .min_length(Some(3))
                .max_length(Some(3))
                .description(Some("Three-letter currency code, e.g. USD"))
                .build(),
        ))
    }
}

impl ToSchema for CurrencyCode {
    fn name() -> Cow<'static, str> {
        Cow::Borrowed("CurrencyCode")
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Reference data
// ─────────────────────────────────────────────────────────────────────────────

/// A known currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Currency {
    pub code: CurrencyCode,
    #[schema(example = "US Dollar")]
    pub name: String,
}

impl Currency {
    pub fn new(code: CurrencyCode, name: impl Into<String>) -> Self {
        Self {
            code,
            name: name.into(),
        }
    }
}

/// The rate of one unit of `currency` against the base unit, effective from
/// `effective_date`. `seq` is the store's insertion order and breaks ties
/// between rows recorded for the same day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ExchangeRate {
    pub currency: CurrencyCode,
    #[schema(value_type = String, example = "37.0")]
    pub rate: Decimal,
    pub effective_date: NaiveDate,
    pub seq: i64,
}

impl ExchangeRate {
    pub fn new(currency: CurrencyCode, rate: Decimal, effective_date: NaiveDate, seq: i64) -> Self {
        Self {
            currency,
            rate,
            effective_date,
            seq,
        }
    }

    /// Rejects non-positive rates.
    pub fn validate(currency: CurrencyCode, rate: Decimal) -> Result<(), ConversionError> {
        if rate <= Decimal::ZERO {
            return Err(ConversionError::InvalidRate { currency, rate });
        }
        Ok(())
    }
}

/// Development seed: USD as the base, plus EUR and UAH.
pub fn reference_rates() -> Vec<(Currency, Decimal)> {
    vec![
        (Currency::new(USD, "US Dollar"), Decimal::new(10, 1)),
        (Currency::new(EUR, "Euro"), Decimal::new(9, 1)),
        (Currency::new(UAH, "Ukrainian Hryvnia"), Decimal::new(370, 1)),
    ]
}

// ─────────────────────────────────────────────────────────────────────────────
// Rounding
// ─────────────────────────────────────────────────────────────────────────────

/// Rounds half-up (away from zero) to [`PRICE_SCALE`] digits and pins the
/// scale so `900` renders as `900.00`.
pub fn round_price(value: Decimal) -> Decimal {
    let mut rounded = value.round_dp_with_strategy(PRICE_SCALE, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(PRICE_SCALE);
    rounded
}

// ─────────────────────────────────────────────────────────────────────────────
// Rate sheet
// ─────────────────────────────────────────────────────────────────────────────

/// Immutable snapshot of the ledger: known currencies plus their rate
/// history. Safe to share between readers.
#[derive(Debug, Clone, Default)]
pub struct RateSheet {
    currencies: BTreeMap<CurrencyCode, Currency>,
    rates: HashMap<CurrencyCode, Vec<ExchangeRate>>,
}

impl RateSheet {
    /// Builds a sheet. Fails if any rate is not strictly positive.
    pub fn new(
        currencies: impl IntoIterator<Item = Currency>,
        rates: impl IntoIterator<Item = ExchangeRate>,
    ) -> Result<Self, ConversionError> {
        let currencies: BTreeMap<_, _> = currencies.into_iter().map(|c| (c.code, c)).collect();

        let mut by_currency: HashMap<CurrencyCode, Vec<ExchangeRate>> = HashMap::new();
        for rate in rates {
            ExchangeRate::validate(rate.currency, rate.rate)?;
            by_currency.entry(rate.currency).or_default().push(rate);
        }

        Ok(Self {
            currencies,
            rates: by_currency,
        })
    }

    /// Known currencies in code order.
    pub fn currencies(&self) -> impl Iterator<Item = &Currency> {
        self.currencies.values()
    }

    pub fn contains(&self, code: CurrencyCode) -> bool {
        self.currencies.contains_key(&code)
    }

    /// The row in effect on `as_of`: latest `effective_date <= as_of`, ties
    /// broken by the highest `seq`.
    pub fn effective_rate(&self, code: CurrencyCode, as_of: NaiveDate) -> Option<&ExchangeRate> {
        self.rates
            .get(&code)?
            .iter()
            .filter(|r| r.effective_date <= as_of)
            .max_by_key(|r| (r.effective_date, r.seq))
    }

    /// Rate of `code` as of `as_of`.
    pub fn rate_of(&self, code: CurrencyCode, as_of: NaiveDate) -> Result<Decimal, ConversionError> {
        if !self.contains(code) {
            return Err(ConversionError::UnknownCurrency(code));
        }
        self.effective_rate(code, as_of)
            .map(|r| r.rate)
            .ok_or(ConversionError::NoRateAvailable {
                currency: code,
                as_of,
            })
    }

    /// Converts `amount` of `from` into `to`, rounded to [`PRICE_SCALE`].
    pub fn convert(
        &self,
        amount: Decimal,
        from: CurrencyCode,
        to: CurrencyCode,
        as_of: NaiveDate,
    ) -> Result<Decimal, ConversionError> {
        let base = self.to_base(amount, from, as_of)?;
        let target_rate = self.rate_of(to, as_of)?;
        base.checked_mul(target_rate)
            .map(round_price)
            .ok_or(ConversionError::Overflow(amount))
    }

    /// Converts `amount` of `source` into every other known currency.
    ///
    /// The source currency is not part of the result. Any currency without
    /// a usable rate fails the whole conversion: a partial basket is never
    /// returned.
    pub fn convert_to_all(
        &self,
        amount: Decimal,
        source: CurrencyCode,
        as_of: NaiveDate,
    ) -> Result<PriceBasket, ConversionError> {
        let base = self.to_base(amount, source, as_of)?;

        self.currencies
            .keys()
            .filter(|code| **code != source)
            .map(|&target| {
                let rate = self.rate_of(target, as_of)?;
                let converted = base
                    .checked_mul(rate)
                    .ok_or(ConversionError::Overflow(amount))?;
                Ok((target, round_price(converted)))
            })
            .collect()
    }

    fn to_base(
        &self,
        amount: Decimal,
        source: CurrencyCode,
        as_of: NaiveDate,
    ) -> Result<Decimal, ConversionError> {
        if amount <= Decimal::ZERO {
            return Err(ConversionError::InvalidAmount(amount));
        }
        let source_rate = self.rate_of(source, as_of)?;
        amount
            .checked_div(source_rate)
            .ok_or(ConversionError::Overflow(amount))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
