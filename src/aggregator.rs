mod http_client;

pub use http_client::{GoCardlessClient, DEFAULT_BASE_URL};

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{AccountMetadata, AccountTransactions, NewRequisition, Requisition};

#[derive(Debug, Error)]
pub enum AggregatorError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{endpoint} responded with status {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("Unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Operations of the open-banking aggregator this crate relies on
#[async_trait]
pub trait Aggregator: Send + Sync {
    /// Start a new consent flow
    async fn create_requisition(
        &self,
        request: &NewRequisition,
    ) -> Result<Requisition, AggregatorError>;

    /// Get the current state of a requisition
    async fn requisition(&self, id: &str) -> Result<Requisition, AggregatorError>;

    /// Get the metadata, including the authorization status, of an account
    async fn account_metadata(&self, account_id: &str)
        -> Result<AccountMetadata, AggregatorError>;

    /// Get the booked and pending transactions of an account
    async fn account_transactions(
        &self,
        account_id: &str,
    ) -> Result<AccountTransactions, AggregatorError>;
}
