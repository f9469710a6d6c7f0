use std::sync::Arc;

use tracing::{error, instrument, warn};

use crate::{
    aggregator::{Aggregator, AggregatorError},
    models::AccountMetadata,
    requisition::RequisitionManager,
};

/// Detects accounts whose authorization decayed and renews the requisition
#[derive(Clone)]
pub struct AccountHealthMonitor {
    aggregator: Arc<dyn Aggregator>,
    requisitions: Arc<RequisitionManager>,
}

impl AccountHealthMonitor {
    pub fn new(aggregator: Arc<dyn Aggregator>, requisitions: Arc<RequisitionManager>) -> Self {
        Self {
            aggregator,
            requisitions,
        }
    }

    /// Fetch the metadata of an account, renewing the requisition when the
    /// account is expired or suspended.
    ///
    /// The metadata fetched before the renewal is returned; it is not
    /// fetched again.
    #[instrument(name = "Checking Account Health", skip(self))]
    pub async fn check(&self, account_id: &str) -> Result<AccountMetadata, AggregatorError> {
        let metadata = self.aggregator.account_metadata(account_id).await?;

        if metadata.status.is_decayed() {
            warn!(
                "Account: {account_id} is {}. Going to recreate the requisition...",
                metadata.status
            );
            if let Err(e) = self.requisitions.recreate().await {
                error!("Failed to recreate requisition: {e}");
            }
        }
        Ok(metadata)
    }
}
