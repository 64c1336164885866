//! Outbound adapters: implementations of the converter and publisher ports.

mod converter;
mod publisher;

pub use converter::RateTableConverter;
pub use publisher::{HttpTransactionPublisher, LogPublisher};
