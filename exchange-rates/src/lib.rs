//! Allow-listed Wallet Currencies and Exchange Rate Table
//!
//! Currencies are declared once with the `define_currencies!` macro, which
//! generates the runtime `CurrencyCode` enum together with its metadata
//! (symbol, minor units, reference rate) and parsing.
//!
//! Rates are denominated in RUR: a rate of `12.0` for CHY means one yuan is
//! worth twelve roubles. A [`RateTable`] is built once at startup and handed
//! to whatever needs to convert; there is no process-wide rate state.
//!
//! # Adding a New Currency
//! Add a line to the `define_currencies!` invocation:
//! ```ignore
//! define_currencies! {
//!     // ... existing currencies ...
//!     KZT => ("KZT", "₸", 100, 0.19),
//! }
//! ```
//!
//! # Example
//! ```
//! use exchange_rates::{CurrencyCode, RateTable};
//!
//! let table = RateTable::reference();
//!
//! // 1000.00 CHY expressed in kopecks
//! let converted = table.convert(100_000, CurrencyCode::CHY, CurrencyCode::RUR);
//! assert_eq!(converted, Some(1_200_000));
//! ```

use std::collections::HashMap;

/// Errors raised while building a rate table.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RateError {
    #[error("Invalid rate {rate} for {currency}: rates must be finite and positive")]
    InvalidRate { currency: CurrencyCode, rate: f64 },

    #[error("The RUR rate is fixed at 1.0")]
    BaseCurrencyFixed,
}

// ─────────────────────────────────────────────────────────────────────────────
// THE MACRO: Defines the CurrencyCode enum and its metadata
// ─────────────────────────────────────────────────────────────────────────────

/// Macro to define the currency allow-list.
///
/// # Syntax
/// ```ignore
/// define_currencies! {
///     Name => ("CODE", "SYMBOL", minor_per_major, reference_rur_rate),
/// }
/// ```
#[macro_export]
macro_rules! define_currencies {
    (
        $(
            $name:ident => ($code:literal, $symbol:literal, $minor_per_major:expr, $rur_rate:expr)
        ),* $(,)?
    ) => {
        /// Currencies a wallet may be denominated in.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        #[serde(rename_all = "UPPERCASE")]
        pub enum CurrencyCode {
            $($name),*
        }

        impl CurrencyCode {
            pub fn code(&self) -> &'static str {
                match self {
                    $(CurrencyCode::$name => $code),*
                }
            }

            pub fn symbol(&self) -> &'static str {
                match self {
                    $(CurrencyCode::$name => $symbol),*
                }
            }

            /// Number of minor units in one major unit (kopecks per rouble, etc.).
            pub fn minor_units_per_major(&self) -> i64 {
                match self {
                    $(CurrencyCode::$name => $minor_per_major),*
                }
            }

            /// Reference value of one unit in RUR, used when no override is configured.
            pub fn reference_rur_rate(&self) -> f64 {
                match self {
                    $(CurrencyCode::$name => $rur_rate),*
                }
            }

            pub fn all() -> &'static [CurrencyCode] {
                &[$(CurrencyCode::$name),*]
            }
        }

        impl std::fmt::Display for CurrencyCode {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.code())
            }
        }

        impl std::str::FromStr for CurrencyCode {
            type Err = String;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_uppercase().as_str() {
                    $($code => Ok(CurrencyCode::$name),)*
                    _ => Err(format!("Currency not allowed: {}", s)),
                }
            }
        }
    };
}

// ─────────────────────────────────────────────────────────────────────────────
// CURRENCY DEFINITIONS
// ─────────────────────────────────────────────────────────────────────────────

define_currencies! {
    RUR => ("RUR", "₽", 100, 1.0),
    CHY => ("CHY", "¥", 100, 12.0),
    AED => ("AED", "AED ", 100, 24.0),
    INR => ("INR", "₹", 100, 2.0),
}

// ─────────────────────────────────────────────────────────────────────────────
// Rate Table
// ─────────────────────────────────────────────────────────────────────────────

/// RUR-denominated exchange rates for every allow-listed currency.
#[derive(Debug, Clone, PartialEq)]
pub struct RateTable {
    rur_rates: HashMap<CurrencyCode, f64>,
}

impl RateTable {
    /// Table populated with the reference rates from the currency definitions.
    pub fn reference() -> Self {
        Self {
            rur_rates: CurrencyCode::all()
                .iter()
                .map(|&c| (c, c.reference_rur_rate()))
                .collect(),
        }
    }

    /// Overrides the RUR value of one currency.
    pub fn with_rate(mut self, currency: CurrencyCode, rate: f64) -> Result<Self, RateError> {
        if currency == CurrencyCode::RUR {
            return Err(RateError::BaseCurrencyFixed);
        }
        if !rate.is_finite() || rate <= 0.0 {
            return Err(RateError::InvalidRate { currency, rate });
        }
        self.rur_rates.insert(currency, rate);
        Ok(self)
    }

    /// How many units of `to` one unit of `from` buys.
    pub fn rate(&self, from: CurrencyCode, to: CurrencyCode) -> Option<f64> {
        if from == to {
            return Some(1.0);
        }
        let from_rate = self.rur_rates.get(&from)?;
        let to_rate = self.rur_rates.get(&to)?;
        Some(from_rate / to_rate)
    }

    /// Converts an amount in minor units, rounding half away from zero.
    ///
    /// Returns `None` when a rate is missing or the result does not fit in `i64`.
    pub fn convert(&self, amount: i64, from: CurrencyCode, to: CurrencyCode) -> Option<i64> {
        if from == to {
            return Some(amount);
        }
        let from_rate = self.rur_rates.get(&from)?;
        let to_rate = self.rur_rates.get(&to)?;

        // Going to RUR is a single multiplication; everything else crosses through RUR.
        let converted = if to == CurrencyCode::RUR {
            amount as f64 * from_rate
        } else {
            amount as f64 * from_rate / to_rate
        };

        let rounded = converted.round();
        if !rounded.is_finite() || rounded.abs() >= i64::MAX as f64 {
            return None;
        }
        Some(rounded as i64)
    }
}

impl Default for RateTable {
    fn default() -> Self {
        Self::reference()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
