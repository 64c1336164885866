//! Transaction event publisher port.

use crate::domain::Transaction;

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Delivery failed: {0}")]
    Delivery(String),

    #[error("Rejected by receiver with status {0}")]
    Rejected(u16),
}

/// Best-effort notification of committed history records.
///
/// Callers never roll back or fail an operation because of a publish error.
#[async_trait::async_trait]
pub trait TransactionPublisher: Send + Sync {
    async fn publish(&self, record: &Transaction) -> Result<(), PublishError>;
}
