
use std::{sync::Arc, time::Duration};

use chrono::Utc;
use thiserror::Error;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, instrument, warn};

use crate::{
    aggregator::{Aggregator, AggregatorError},
    models::{NewRequisition, Requisition, RequisitionStatus},
    notifier::RenewalNotifier,
    storage::{RequisitionStore, StorageError},
};

/// Where the end user lands after completing the consent flow
pub const REQUISITION_REDIRECT: &str =
    "https://raw.githubusercontent.com/Oltier/ynab-sync/main/lambdas/ok.html";

#[derive(Debug, Error)]
pub enum RequisitionError {
    #[error("Failed to read stored requisition: {0}")]
    Load(#[source] StorageError),

    #[error("Failed to create requisition: {0}")]
    Create(#[source] AggregatorError),

    #[error("Failed to get requisition: {0}")]
    Poll(#[source] AggregatorError),

    #[error("Requisition {id} was not linked after {attempts} attempts")]
    PollExhausted { id: String, attempts: u32 },

    #[error("Requisition {id} was not linked within {deadline:?}")]
    DeadlineExceeded { id: String, deadline: Duration },
}

/// How long to wait for the end user to complete the consent flow.
///
/// The default polls every two seconds without any bound, so a run blocks
/// until the consent is given or the process is stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Delay before each status query
    pub interval: Duration,
    /// Give up after this many status queries
    pub max_attempts: Option<u32>,
    /// Give up once this much time has passed since polling started
    pub deadline: Option<Duration>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_attempts: None,
            deadline: None,
        }
    }
}

/// Owns the requisition of one institution: loads it, validates it and
/// renews it when it is missing or no longer linked.
pub struct RequisitionManager {
    aggregator: Arc<dyn Aggregator>,
    store: RequisitionStore,
    notifier: Option<Arc<dyn RenewalNotifier>>,
    institution_id: String,
    poll_policy: PollPolicy,
}

impl RequisitionManager {
    /// Create a new instance of [RequisitionManager] with required parameters
    pub fn new(
        aggregator: Arc<dyn Aggregator>,
        store: RequisitionStore,
        institution_id: impl Into<String>,
    ) -> Self {
        Self {
            aggregator,
            store,
            notifier: None,
            institution_id: institution_id.into(),
            poll_policy: PollPolicy::default(),
        }
    }

    /// Set the notifier fired whenever a new consent flow starts
    pub fn with_notifier(mut self, notifier: impl RenewalNotifier + 'static) -> Self {
        self.notifier = Some(Arc::new(notifier));
        self
    }

    /// Set the bounds of the wait for consent
    pub fn with_poll_policy(mut self, policy: PollPolicy) -> Self {
        self.poll_policy = policy;
        self
    }

    /// Get a linked requisition.
    ///
    /// A stored requisition is returned as is when it is linked. Otherwise a
    /// new one is created and this call waits until the end user linked it.
    ///
    /// # Errors
    /// Returns an error if the store cannot be read, the aggregator cannot be
    /// reached, or the wait for consent hits the configured bounds.
    #[instrument(
        name = "Getting Requisition",
        skip(self),
        fields(institution_id = %self.institution_id, key = %self.store.key())
    )]
    pub async fn get_requisition(&self) -> Result<Requisition, RequisitionError> {
        let Some(document) = self.store.load().await.map_err(RequisitionError::Load)? else {
            info!("Requisition is not found");
            return self.recreate().await;
        };

        let requisition: Requisition = match serde_json::from_slice(&document) {
            Ok(requisition) => requisition,
            Err(e) => {
                warn!("Failed to parse stored requisition: {e}");
                return self.recreate().await;
            }
        };

        match &requisition.status {
            RequisitionStatus::Linked => {
                debug!("Using stored requisition {}", requisition.id);
                Ok(requisition)
            }
            RequisitionStatus::Expired => {
                info!("Requisition {} is expired", requisition.id);
                self.recreate().await
            }
            status => {
                warn!(
                    "Unsupported requisition status {status} for {}",
                    requisition.id
                );
                self.recreate().await
            }
        }
    }

    /// Start a new consent flow and wait until it is linked.
    ///
    /// The linked requisition is persisted; a failure to persist it is logged
    /// and the requisition is still returned.
    #[instrument(
        name = "Creating Requisition",
        skip(self),
        fields(institution_id = %self.institution_id)
    )]
    pub async fn recreate(&self) -> Result<Requisition, RequisitionError> {
        let request = NewRequisition {
            redirect: REQUISITION_REDIRECT.to_string(),
            institution_id: self.institution_id.clone(),
            reference: Utc::now().timestamp().to_string(),
            agreement: String::new(),
        };
        let requisition = self
            .aggregator
            .create_requisition(&request)
            .await
            .map_err(RequisitionError::Create)?;

        self.notify(&requisition).await;
        info!("Initiate requisition by going to: {}", requisition.link);

        let requisition = self.wait_until_linked(requisition).await?;
        self.persist(&requisition).await;

        info!(
            "Requisition {} linked with {} accounts",
            requisition.id,
            requisition.accounts.len()
        );
        Ok(requisition)
    }

    async fn wait_until_linked(
        &self,
        requisition: Requisition,
    ) -> Result<Requisition, RequisitionError> {
        let id = requisition.id.clone();
        match self.poll_policy.deadline {
            Some(deadline) => timeout(deadline, self.poll(requisition))
                .await
                .map_err(|_| RequisitionError::DeadlineExceeded { id, deadline })?,
            None => self.poll(requisition).await,
        }
    }

    async fn poll(&self, mut requisition: Requisition) -> Result<Requisition, RequisitionError> {
        let mut attempts = 0;
        while !requisition.status.is_linked() {
            if let Some(max_attempts) = self.poll_policy.max_attempts {
                if attempts >= max_attempts {
                    return Err(RequisitionError::PollExhausted {
                        id: requisition.id,
                        attempts,
                    });
                }
            }

            sleep(self.poll_policy.interval).await;
            attempts += 1;
            requisition = self
                .aggregator
                .requisition(&requisition.id)
                .await
                .map_err(RequisitionError::Poll)?;
            debug!(
                "Requisition {} has status {} after {attempts} attempts",
                requisition.id, requisition.status
            );
        }
        Ok(requisition)
    }

    async fn persist(&self, requisition: &Requisition) {
        let document = match serde_json::to_vec(requisition) {
            Ok(document) => document,
            Err(e) => {
                error!("Failed to serialize requisition: {e}");
                return;
            }
        };
        if let Err(e) = self.store.save(&document).await {
            error!("Failed to store requisition {}: {e}", requisition.id);
        }
    }

    async fn notify(&self, requisition: &Requisition) {
        if let Some(notifier) = &self.notifier {
            if let Err(e) = notifier
                .notify(&requisition.status, &requisition.link)
                .await
            {
                warn!("Failed to run requisition hook: {e}");
            }
        }
    }
}
