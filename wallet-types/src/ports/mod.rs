//! Port traits (interfaces for adapters).
//!
//! The wallet service depends on these traits, never on a concrete store,
//! converter or publisher.

mod exchange;
mod ledger;
mod publisher;

pub use exchange::{CurrencyConverter, ExchangeError};
pub use ledger::{BoxFuture, LedgerStore, WalletUpdate, run_in_transaction};
pub use publisher::{PublishError, TransactionPublisher};
