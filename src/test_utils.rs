use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use async_trait::async_trait;

use crate::{
    aggregator::{Aggregator, AggregatorError},
    models::{
        AccountMetadata, AccountStatus, AccountTransactions, Amount, NewRequisition,
        RawTransaction, Requisition, RequisitionStatus, TransactionBatches,
    },
    notifier::{NotifyError, RenewalNotifier},
    storage::{Storage, StorageError},
};

#[derive(Clone, Default)]
pub struct MockStorage {
    data: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    stores: Arc<AtomicUsize>,
    fail_store: Arc<AtomicBool>,
}

impl MockStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(key: &str, value: impl AsRef<[u8]>) -> Self {
        let storage = Self::new();
        storage
            .data
            .lock()
            .unwrap()
            .insert(key.to_string(), value.as_ref().to_vec());
        storage
    }

    /// Make every subsequent store call fail
    pub fn failing_stores(self) -> Self {
        self.fail_store.store(true, Ordering::SeqCst);
        self
    }

    pub fn stores(&self) -> usize {
        self.stores.load(Ordering::SeqCst)
    }

    pub fn value(&self, key: &str) -> Option<Vec<u8>> {
        self.data.lock().unwrap().get(key).cloned()
    }
}

#[async_trait]
impl Storage for MockStorage {
    async fn store(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        self.stores.fetch_add(1, Ordering::SeqCst);
        if self.fail_store.load(Ordering::SeqCst) {
            return Err(StorageError::Io(std::io::Error::other("disk full")));
        }
        self.data
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.data.lock().unwrap().get(key).cloned())
    }
}

/// Scripted aggregator recording every call it receives
#[derive(Default)]
pub struct MockAggregator {
    calls: Mutex<Vec<String>>,
    created: Mutex<Vec<NewRequisition>>,
    polls: Mutex<VecDeque<Result<Requisition, AggregatorError>>>,
    metadata: Mutex<HashMap<String, AccountMetadata>>,
    transactions: Mutex<HashMap<String, AccountTransactions>>,
}

impl MockAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the response of the next get-requisition call
    pub fn poll_returns(self, requisition: Requisition) -> Self {
        self.polls.lock().unwrap().push_back(Ok(requisition));
        self
    }

    pub fn poll_fails(self, error: AggregatorError) -> Self {
        self.polls.lock().unwrap().push_back(Err(error));
        self
    }

    pub fn with_account(
        self,
        metadata: AccountMetadata,
        transactions: AccountTransactions,
    ) -> Self {
        let id = metadata.id.clone();
        self.metadata.lock().unwrap().insert(id.clone(), metadata);
        self.transactions.lock().unwrap().insert(id, transactions);
        self
    }

    /// Account whose metadata is known but whose transactions cannot be fetched
    pub fn with_broken_account(self, metadata: AccountMetadata) -> Self {
        self.metadata
            .lock()
            .unwrap()
            .insert(metadata.id.clone(), metadata);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn created(&self) -> Vec<NewRequisition> {
        self.created.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl Aggregator for MockAggregator {
    async fn create_requisition(
        &self,
        request: &NewRequisition,
    ) -> Result<Requisition, AggregatorError> {
        self.record("create".into());
        let mut created = self.created.lock().unwrap();
        created.push(request.clone());
        let id = format!("req-{}", created.len());
        Ok(Requisition {
            link: format!("https://ob.example.com/psd2/start/{id}"),
            id,
            status: RequisitionStatus::Created,
            reference: request.reference.clone(),
            institution_id: request.institution_id.clone(),
            redirect: request.redirect.clone(),
            agreement: request.agreement.clone(),
            accounts: Vec::new(),
        })
    }

    async fn requisition(&self, id: &str) -> Result<Requisition, AggregatorError> {
        self.record(format!("requisition:{id}"));
        self.polls
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(not_found(format!("requisitions/{id}/"))))
    }

    async fn account_metadata(
        &self,
        account_id: &str,
    ) -> Result<AccountMetadata, AggregatorError> {
        self.record(format!("metadata:{account_id}"));
        self.metadata
            .lock()
            .unwrap()
            .get(account_id)
            .cloned()
            .ok_or_else(|| not_found(format!("accounts/{account_id}/")))
    }

    async fn account_transactions(
        &self,
        account_id: &str,
    ) -> Result<AccountTransactions, AggregatorError> {
        self.record(format!("transactions:{account_id}"));
        self.transactions
            .lock()
            .unwrap()
            .get(account_id)
            .cloned()
            .ok_or_else(|| AggregatorError::Status {
                endpoint: format!("accounts/{account_id}/transactions"),
                status: 500,
                body: "internal error".into(),
            })
    }
}

fn not_found(endpoint: String) -> AggregatorError {
    AggregatorError::Status {
        endpoint,
        status: 404,
        body: "{\"detail\":\"Not found.\"}".into(),
    }
}

/// Notifier remembering every notification, optionally failing them
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    pub received: Arc<Mutex<Vec<(String, String)>>>,
    pub fail: bool,
}

#[async_trait]
impl RenewalNotifier for RecordingNotifier {
    async fn notify(&self, status: &RequisitionStatus, link: &str) -> Result<(), NotifyError> {
        self.received
            .lock()
            .unwrap()
            .push((status.code().to_string(), link.to_string()));
        if self.fail {
            return Err(NotifyError::Exit {
                status: "exit status: 1".into(),
                stderr: "hook failed".into(),
            });
        }
        Ok(())
    }
}

pub fn linked_requisition(id: &str, accounts: &[&str]) -> Requisition {
    Requisition {
        id: id.to_string(),
        status: RequisitionStatus::Linked,
        link: format!("https://ob.example.com/psd2/start/{id}"),
        reference: "1700000000".into(),
        institution_id: "SANDBOXFINANCE_SFIN0000".into(),
        accounts: accounts.iter().map(|a| a.to_string()).collect(),
        ..Default::default()
    }
}

pub fn account(id: &str, status: AccountStatus) -> AccountMetadata {
    AccountMetadata {
        id: id.to_string(),
        iban: format!("IBAN-{id}"),
        status,
        ..Default::default()
    }
}

pub fn raw_transaction(id: &str, date: &str, amount: &str, creditor: &str) -> RawTransaction {
    RawTransaction {
        transaction_id: Some(id.to_string()),
        booking_date: Some(date.to_string()),
        transaction_amount: Amount {
            amount: amount.to_string(),
            currency: "EUR".into(),
        },
        creditor_name: Some(creditor.to_string()),
        ..Default::default()
    }
}

pub fn batches(booked: Vec<RawTransaction>, pending: Vec<RawTransaction>) -> AccountTransactions {
    AccountTransactions {
        transactions: TransactionBatches { booked, pending },
    }
}
