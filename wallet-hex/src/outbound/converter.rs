//! Currency converter backed by a fixed rate table.

use async_trait::async_trait;
use exchange_rates::RateTable;

use wallet_types::{Currency, CurrencyConverter, ExchangeError};

/// Converts with rates loaded once at startup.
#[derive(Debug, Clone, Default)]
pub struct RateTableConverter {
    table: RateTable,
}

impl RateTableConverter {
    pub fn new(table: RateTable) -> Self {
        Self { table }
    }
}

#[async_trait]
impl CurrencyConverter for RateTableConverter {
    async fn convert(
        &self,
        amount: i64,
        from: Currency,
        to: Currency,
    ) -> Result<i64, ExchangeError> {
        self.table
            .convert(amount, from, to)
            .ok_or(ExchangeError::RateNotAvailable(from, to))
    }
}
