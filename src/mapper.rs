use chrono::NaiveDate;
use thiserror::Error;

use crate::{
    models::{Account, RawTransaction, Transaction, TransactionState},
    payee::PayeeSanitizer,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MapError {
    #[error("transaction {0} has neither booking nor value date")]
    MissingDate(String),

    #[error("transaction {id} has an invalid date {value:?}")]
    InvalidDate { id: String, value: String },

    #[error("transaction {id} has an invalid amount {value:?}")]
    InvalidAmount { id: String, value: String },
}

/// Converts aggregator records into canonical transactions
pub trait Mapper: Send + Sync {
    fn map(
        &self,
        account: &Account,
        raw: &RawTransaction,
        state: TransactionState,
    ) -> Result<Transaction, MapError>;
}

/// Mapping used unless a custom [Mapper] is configured
#[derive(Debug, Clone, Default)]
pub struct DefaultMapper {
    sanitizer: PayeeSanitizer,
}

impl DefaultMapper {
    pub fn new(sanitizer: PayeeSanitizer) -> Self {
        Self { sanitizer }
    }
}

impl Mapper for DefaultMapper {
    fn map(
        &self,
        account: &Account,
        raw: &RawTransaction,
        state: TransactionState,
    ) -> Result<Transaction, MapError> {
        // Pending records frequently come without any identifier
        let id = non_empty(&raw.transaction_id)
            .or_else(|| non_empty(&raw.internal_transaction_id))
            .unwrap_or_default()
            .to_string();

        let date = non_empty(&raw.booking_date)
            .or_else(|| non_empty(&raw.value_date))
            .ok_or_else(|| MapError::MissingDate(id.clone()))?;
        let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|_| MapError::InvalidDate {
            id: id.clone(),
            value: date.to_string(),
        })?;

        let amount = parse_milliunits(&raw.transaction_amount.amount).ok_or_else(|| {
            MapError::InvalidAmount {
                id: id.clone(),
                value: raw.transaction_amount.amount.clone(),
            }
        })?;

        let remittance = remittance(raw);
        let payee = non_empty(&raw.creditor_name)
            .or_else(|| non_empty(&raw.debtor_name))
            .or(remittance.as_deref())
            .or_else(|| non_empty(&raw.additional_information))
            .unwrap_or_default();

        Ok(Transaction {
            account: account.clone(),
            id,
            date,
            payee: self.sanitizer.sanitize(payee),
            memo: remittance.unwrap_or_default(),
            amount,
            state,
        })
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn remittance(raw: &RawTransaction) -> Option<String> {
    if let Some(text) = non_empty(&raw.remittance_information_unstructured) {
        return Some(text.to_string());
    }
    let joined = raw
        .remittance_information_unstructured_array
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    (!joined.is_empty()).then_some(joined)
}

/// Parse a decimal amount such as `-20.85` into milliunits (`-20850`).
///
/// Digits beyond the third decimal are truncated.
pub fn parse_milliunits(amount: &str) -> Option<i64> {
    let amount = amount.trim();
    let (negative, digits) = match amount.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, amount.strip_prefix('+').unwrap_or(amount)),
    };

    let (whole, fraction) = digits.split_once('.').unwrap_or((digits, ""));
    if whole.is_empty() && fraction.is_empty() {
        return None;
    }
    if !whole.chars().chain(fraction.chars()).all(|c| c.is_ascii_digit()) {
        return None;
    }

    let whole: i64 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let fraction: i64 = format!("{:0<3}", &fraction[..fraction.len().min(3)])
        .parse()
        .ok()?;

    let value = whole.checked_mul(1000)?.checked_add(fraction)?;
    Some(if negative { -value } else { value })
}
