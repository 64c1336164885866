//! Type-safe monetary value with embedded currency.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::DomainError;

/// Currencies a wallet may hold. The allow-list lives in `exchange-rates`.
pub use exchange_rates::CurrencyCode as Currency;

/// Type-safe money representation with embedded currency.
///
/// Amount is stored in the smallest unit of the currency (kopecks, fen, etc.)
/// and is never negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    amount: i64,
    currency: Currency,
}

impl Money {
    /// Creates a new Money value.
    pub fn new(amount: i64, currency: Currency) -> Result<Self, DomainError> {
        if amount < 0 {
            return Err(DomainError::NegativeAmount);
        }
        Ok(Self { amount, currency })
    }

    /// Creates a positive Money value, as required for every requested flow.
    pub fn positive(amount: i64, currency: Currency) -> Result<Self, DomainError> {
        if amount <= 0 {
            return Err(DomainError::NonPositiveAmount(amount));
        }
        Ok(Self { amount, currency })
    }

    /// Creates a zero-value Money for the given currency.
    pub fn zero(currency: Currency) -> Self {
        Self {
            amount: 0,
            currency,
        }
    }

    /// Returns the amount in smallest currency unit.
    pub fn amount(&self) -> i64 {
        self.amount
    }

    /// Returns the currency.
    pub fn currency(&self) -> Currency {
        self.currency
    }

    /// Applies a signed delta; fails if the result would be negative or overflow.
    pub fn checked_adjust(&self, delta: i64) -> Result<Money, DomainError> {
        let amount = self
            .amount
            .checked_add(delta)
            .ok_or(DomainError::AmountOverflow)?;
        if amount < 0 {
            return Err(DomainError::InsufficientFunds {
                available: self.amount,
                requested: delta.saturating_neg(),
            });
        }
        Ok(Money {
            amount,
            currency: self.currency,
        })
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let per_major = self.currency.minor_units_per_major();
        let major = self.amount / per_major;
        let minor = self.amount % per_major;
        write!(f, "{}{}.{:02}", self.currency.symbol(), major, minor)
    }
}
