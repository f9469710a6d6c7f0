use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::{
    aggregator::{Aggregator, AggregatorError},
    health::AccountHealthMonitor,
    mapper::{MapError, Mapper},
    models::{Account, AccountTransactions, RawTransaction, Transaction, TransactionState},
    payee::PayeeStrip,
    requisition::{RequisitionError, RequisitionManager},
};

/// Failure of a bulk read, tagged with the stage that failed
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("failed to authorize: {0}")]
    Authorize(#[source] RequisitionError),

    #[error("failed to get account metadata for {account}: {source}")]
    Metadata {
        account: String,
        #[source]
        source: AggregatorError,
    },

    #[error("failed to get transactions for {account}: {source}")]
    Transactions {
        account: String,
        #[source]
        source: AggregatorError,
    },

    #[error("failed to convert transaction of {account}: {source}")]
    Map {
        account: String,
        #[source]
        source: MapError,
    },
}

/// Reads the transactions of every account of the requisition
pub struct IngestionPipeline {
    aggregator: Arc<dyn Aggregator>,
    requisitions: Arc<RequisitionManager>,
    health: AccountHealthMonitor,
    mapper: Arc<dyn Mapper>,
    strip: PayeeStrip,
    debug: bool,
}

impl IngestionPipeline {
    pub fn new(
        aggregator: Arc<dyn Aggregator>,
        requisitions: Arc<RequisitionManager>,
        mapper: Arc<dyn Mapper>,
    ) -> Self {
        Self {
            health: AccountHealthMonitor::new(aggregator.clone(), requisitions.clone()),
            aggregator,
            requisitions,
            mapper,
            strip: PayeeStrip::default(),
            debug: false,
        }
    }

    /// Set the patterns removed from every payee
    pub fn with_strip(mut self, strip: PayeeStrip) -> Self {
        self.strip = strip;
        self
    }

    /// Log the raw aggregator responses
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Read all transactions.
    ///
    /// Accounts are processed in requisition order; within an account booked
    /// transactions come before pending ones. Any failure aborts the whole
    /// read, no partial result is returned.
    #[instrument(name = "Reading Transactions", skip(self))]
    pub async fn bulk(&self) -> Result<Vec<Transaction>, IngestError> {
        let requisition = self
            .requisitions
            .get_requisition()
            .await
            .map_err(IngestError::Authorize)?;

        info!("Found {} accounts", requisition.accounts.len());
        let mut transactions = Vec::new();
        for account_id in &requisition.accounts {
            let metadata =
                self.health
                    .check(account_id)
                    .await
                    .map_err(|source| IngestError::Metadata {
                        account: account_id.clone(),
                        source,
                    })?;

            let account = Account::from(&metadata);
            info!("Reading transactions from account: {}", account.name);

            let fetched = self
                .aggregator
                .account_transactions(&account.id)
                .await
                .map_err(|source| IngestError::Transactions {
                    account: account.id.clone(),
                    source,
                })?;
            if self.debug {
                self.log_raw(&fetched);
            }

            let mapped = self
                .convert(&account, &fetched)
                .map_err(|source| IngestError::Map {
                    account: account.id.clone(),
                    source,
                })?;
            transactions.extend(mapped);
        }
        Ok(transactions)
    }

    fn convert(
        &self,
        account: &Account,
        fetched: &AccountTransactions,
    ) -> Result<Vec<Transaction>, MapError> {
        let batches = &fetched.transactions;
        info!("Fetched {} booked transactions", batches.booked.len());
        info!("Fetched {} pending transactions", batches.pending.len());

        let booked = batches
            .booked
            .iter()
            .map(|raw| self.convert_one(account, raw, TransactionState::Booked));
        let pending = batches
            .pending
            .iter()
            .map(|raw| self.convert_one(account, raw, TransactionState::Pending));
        booked.chain(pending).collect()
    }

    fn convert_one(
        &self,
        account: &Account,
        raw: &RawTransaction,
        state: TransactionState,
    ) -> Result<Transaction, MapError> {
        let mut transaction = self.mapper.map(account, raw, state)?;
        if !self.strip.is_empty() {
            transaction.payee = self.strip.apply(&transaction.payee);
        }
        Ok(transaction)
    }

    fn log_raw(&self, fetched: &AccountTransactions) {
        match serde_json::to_string(fetched) {
            Ok(json) => debug!("Transactions received from aggregator: {json}"),
            Err(e) => {
                warn!("Failed to marshal transactions: {e}");
                debug!("Transactions received from aggregator: {fetched:?}");
            }
        }
    }
}
