//! Configuration loading from environment.

use std::env;
use std::time::Duration;

use anyhow::Context;

/// Application configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    /// Bound on each store call made by the service
    pub store_timeout: Duration,
    pub rate_limit_per_minute: u32,
    /// Words that make the content filter flag an ad
    pub blocked_words: Vec<String>,
    /// Install the USD / EUR / UAH reference rates into an empty ledger
    pub seed_reference_rates: bool,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let port = lookup("PORT")
            .unwrap_or_else(|| "3000".to_string())
            .parse()
            .context("PORT must be a port number")?;

        let database_url = lookup("DATABASE_URL")
            .ok_or_else(|| anyhow::anyhow!("DATABASE_URL environment variable is required"))?;

        let store_timeout_ms: u64 = lookup("STORE_TIMEOUT_MS")
            .unwrap_or_else(|| "5000".to_string())
            .parse()
            .context("STORE_TIMEOUT_MS must be a number of milliseconds")?;
        if store_timeout_ms == 0 {
            anyhow::bail!("STORE_TIMEOUT_MS must be positive");
        }

        let rate_limit_per_minute = lookup("RATE_LIMIT_PER_MINUTE")
            .unwrap_or_else(|| market_hex::inbound::DEFAULT_REQUESTS_PER_MINUTE.to_string())
            .parse()
            .context("RATE_LIMIT_PER_MINUTE must be a number")?;

        let blocked_words = lookup("BLOCKED_WORDS")
            .map(|list| {
                list.split(',')
                    .map(|w| w.trim().to_string())
                    .filter(|w| !w.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let seed_reference_rates = match lookup("SEED_REFERENCE_RATES").as_deref() {
            None => true,
            Some("1" | "true" | "yes") => true,
            Some("0" | "false" | "no") => false,
            Some(other) => anyhow::bail!("SEED_REFERENCE_RATES must be true or false, got {other}"),
        };

        Ok(Self {
            port,
            database_url,
            store_timeout: Duration::from_millis(store_timeout_ms),
            rate_limit_per_minute,
            blocked_words,
            seed_reference_rates,
        })
    }
}
