use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Status of a requisition as reported by the aggregator.
///
/// The aggregator encodes statuses as two-letter codes. Codes this crate does
/// not know about are kept verbatim in [`RequisitionStatus::Unknown`] so they
/// survive a round trip through storage, but they are never treated as usable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RequisitionStatus {
    Created,
    GivingConsent,
    UndergoingAuthentication,
    Rejected,
    SelectingAccounts,
    GrantingAccess,
    Linked,
    Suspended,
    Expired,
    Unknown(String),
}

impl RequisitionStatus {
    pub fn code(&self) -> &str {
        match self {
            Self::Created => "CR",
            Self::GivingConsent => "GC",
            Self::UndergoingAuthentication => "UA",
            Self::Rejected => "RJ",
            Self::SelectingAccounts => "SA",
            Self::GrantingAccess => "GA",
            Self::Linked => "LN",
            Self::Suspended => "SU",
            Self::Expired => "EX",
            Self::Unknown(code) => code,
        }
    }

    #[inline]
    pub fn is_linked(&self) -> bool {
        matches!(self, Self::Linked)
    }
}

impl Default for RequisitionStatus {
    fn default() -> Self {
        Self::Unknown(String::new())
    }
}

impl From<String> for RequisitionStatus {
    fn from(code: String) -> Self {
        match code.as_str() {
            "CR" => Self::Created,
            "GC" => Self::GivingConsent,
            "UA" => Self::UndergoingAuthentication,
            "RJ" => Self::Rejected,
            "SA" => Self::SelectingAccounts,
            "GA" => Self::GrantingAccess,
            "LN" => Self::Linked,
            "SU" => Self::Suspended,
            "EX" => Self::Expired,
            _ => Self::Unknown(code),
        }
    }
}

impl From<RequisitionStatus> for String {
    fn from(status: RequisitionStatus) -> Self {
        match status {
            RequisitionStatus::Unknown(code) => code,
            other => other.code().to_string(),
        }
    }
}

impl fmt::Display for RequisitionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A consent grant for one institution, issued by the aggregator
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requisition {
    pub id: String,
    #[serde(default)]
    pub status: RequisitionStatus,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub reference: String,
    #[serde(default)]
    pub institution_id: String,
    #[serde(default)]
    pub redirect: String,
    #[serde(default)]
    pub agreement: String,
    #[serde(default)]
    pub accounts: Vec<String>,
}

/// Body of the create-requisition call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewRequisition {
    pub redirect: String,
    pub institution_id: String,
    pub reference: String,
    pub agreement: String,
}

/// Processing status of a single bank account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AccountStatus {
    Discovered,
    Processing,
    Ready,
    Error,
    Expired,
    Suspended,
    Unknown(String),
}

impl AccountStatus {
    pub fn code(&self) -> &str {
        match self {
            Self::Discovered => "DISCOVERED",
            Self::Processing => "PROCESSING",
            Self::Ready => "READY",
            Self::Error => "ERROR",
            Self::Expired => "EXPIRED",
            Self::Suspended => "SUSPENDED",
            Self::Unknown(code) => code,
        }
    }

    /// Whether the account lost its authorization and needs a new consent
    #[inline]
    pub fn is_decayed(&self) -> bool {
        matches!(self, Self::Expired | Self::Suspended)
    }
}

impl Default for AccountStatus {
    fn default() -> Self {
        Self::Unknown(String::new())
    }
}

impl From<String> for AccountStatus {
    fn from(code: String) -> Self {
        match code.as_str() {
            "DISCOVERED" => Self::Discovered,
            "PROCESSING" => Self::Processing,
            "READY" => Self::Ready,
            "ERROR" => Self::Error,
            "EXPIRED" => Self::Expired,
            "SUSPENDED" => Self::Suspended,
            _ => Self::Unknown(code),
        }
    }
}

impl From<AccountStatus> for String {
    fn from(status: AccountStatus) -> Self {
        match status {
            AccountStatus::Unknown(code) => code,
            other => other.code().to_string(),
        }
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountMetadata {
    pub id: String,
    #[serde(default)]
    pub iban: String,
    #[serde(default)]
    pub status: AccountStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub institution_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_name: Option<String>,
}

/// A bank account transactions are attributed to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub name: String,
    pub iban: String,
}

impl From<&AccountMetadata> for Account {
    // The aggregator exposes no display name, the IBAN doubles as one
    fn from(metadata: &AccountMetadata) -> Self {
        Self {
            id: metadata.id.clone(),
            name: metadata.iban.clone(),
            iban: metadata.iban.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountTransactions {
    pub transactions: TransactionBatches,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionBatches {
    #[serde(default)]
    pub booked: Vec<RawTransaction>,
    #[serde(default)]
    pub pending: Vec<RawTransaction>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Amount {
    pub amount: String,
    #[serde(default)]
    pub currency: String,
}

/// A transaction record as returned by the aggregator
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTransaction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal_transaction_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub booking_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_date: Option<String>,
    pub transaction_amount: Amount,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creditor_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debtor_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remittance_information_unstructured: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remittance_information_unstructured_array: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_information: Option<String>,
}

/// Settlement state of a transaction at fetch time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionState {
    Booked,
    Pending,
}

/// Canonical transaction handed to the budgeting tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub account: Account,
    pub id: String,
    pub date: NaiveDate,
    pub payee: String,
    pub memo: String,
    /// Amount in milliunits (1/1000 of the currency unit)
    pub amount: i64,
    pub state: TransactionState,
}
