//! Transaction publishers.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, instrument};

use wallet_types::{PublishError, Transaction, TransactionPublisher};

/// POSTs each committed record as JSON to a configured URL.
pub struct HttpTransactionPublisher {
    client: reqwest::Client,
    target_url: String,
}

impl HttpTransactionPublisher {
    pub fn new(target_url: String, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, target_url })
    }
}

#[async_trait]
impl TransactionPublisher for HttpTransactionPublisher {
    #[instrument(skip(self, record), fields(transaction_id = %record.id))]
    async fn publish(&self, record: &Transaction) -> Result<(), PublishError> {
        let resp = self
            .client
            .post(&self.target_url)
            .json(record)
            .send()
            .await
            .map_err(|e| PublishError::Delivery(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(PublishError::Rejected(resp.status().as_u16()));
        }
        Ok(())
    }
}

/// Writes records to the log. Used when no publish URL is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogPublisher;

#[async_trait]
impl TransactionPublisher for LogPublisher {
    async fn publish(&self, record: &Transaction) -> Result<(), PublishError> {
        info!(
            transaction_id = %record.id,
            operation = %record.operation,
            label = %record.label,
            wallet_id = %record.wallet_id,
            amount = record.amount.amount(),
            currency = %record.amount.currency(),
            "Transaction event"
        );
        Ok(())
    }
}
