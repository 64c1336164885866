//! Configuration loading from environment.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use exchange_rates::{CurrencyCode, RateTable};

use wallet_hex::ServiceConfig;
use wallet_repo::SweeperConfig;

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub operation_timeout: Duration,
    /// Where committed records are POSTed; records are only logged when unset
    pub publish_url: Option<String>,
    pub publish_timeout: Duration,
    pub sweep_interval: Duration,
    pub wallet_retention: Duration,
    /// RUR-denominated rate overrides
    pub rate_overrides: Vec<(CurrencyCode, f64)>,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Loads configuration through `lookup`, which returns the raw value of a variable.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let port = parse_or(&lookup, "PORT", 3000)?;

        let database_url = lookup("DATABASE_URL")
            .ok_or_else(|| anyhow::anyhow!("DATABASE_URL environment variable is required"))?;

        let operation_timeout =
            Duration::from_millis(parse_or(&lookup, "OPERATION_TIMEOUT_MS", 5000)?);
        let publish_timeout =
            Duration::from_millis(parse_or(&lookup, "PUBLISH_TIMEOUT_MS", 2000)?);
        let publish_url = lookup("PUBLISH_URL").filter(|url| !url.trim().is_empty());

        let sweep_interval =
            Duration::from_secs(parse_or(&lookup, "SWEEP_INTERVAL_SECS", 3600)?);
        let retention_days: u64 = parse_or(&lookup, "WALLET_RETENTION_DAYS", 365)?;
        let wallet_retention = retention_days
            .checked_mul(SECS_PER_DAY)
            .map(Duration::from_secs)
            .ok_or_else(|| {
                anyhow::anyhow!("WALLET_RETENTION_DAYS is too large: {}", retention_days)
            })?;

        let mut rate_overrides = Vec::new();
        for &currency in CurrencyCode::all() {
            if currency == CurrencyCode::RUR {
                continue;
            }
            let key = format!("RATE_{}", currency.code());
            if let Some(raw) = lookup(&key) {
                let rate: f64 = raw
                    .trim()
                    .parse()
                    .with_context(|| format!("{} must be a number, got {:?}", key, raw))?;
                rate_overrides.push((currency, rate));
            }
        }

        Ok(Self {
            port,
            database_url,
            operation_timeout,
            publish_url,
            publish_timeout,
            sweep_interval,
            wallet_retention,
            rate_overrides,
        })
    }

    /// Reference rates with the configured overrides applied.
    pub fn rate_table(&self) -> anyhow::Result<RateTable> {
        self.rate_overrides
            .iter()
            .try_fold(RateTable::reference(), |table, &(currency, rate)| {
                table.with_rate(currency, rate)
            })
            .context("Invalid exchange rate configuration")
    }

    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            operation_timeout: self.operation_timeout,
            publish_timeout: self.publish_timeout,
        }
    }

    pub fn sweeper_config(&self) -> SweeperConfig {
        SweeperConfig {
            interval: self.sweep_interval,
            retention: self.wallet_retention,
        }
    }
}

fn parse_or<T>(lookup: impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {}: {:?}", key, raw)),
        None => Ok(default),
    }
}
