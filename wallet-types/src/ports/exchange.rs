//! Currency converter port.
//!
//! Implementations can be a static rate table, an HTTP feed client, or a mock.

use crate::domain::Currency;

/// Error type for conversion.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ExchangeError {
    #[error("Unsupported currency: {0}")]
    UnsupportedCurrency(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Rate not available for {0} -> {1}")]
    RateNotAvailable(Currency, Currency),
}

/// Converts amounts between allow-listed currencies.
#[async_trait::async_trait]
pub trait CurrencyConverter: Send + Sync {
    /// Converts `amount` (minor units of `from`) into minor units of `to`.
    async fn convert(&self, amount: i64, from: Currency, to: Currency)
    -> Result<i64, ExchangeError>;
}
