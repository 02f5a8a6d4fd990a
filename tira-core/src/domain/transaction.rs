//! Transaction domain types
//!
//! A transaction is a tracked, idempotent confirmation handshake for one
//! distributed state change. Backends send a [`Transaction`] envelope with
//! every confirmation call, the coordinator keeps a [`TransactionRecord`]
//! per transaction id in its ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status carried by a transaction envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionStatus {
    #[serde(rename = "SUCCESS")]
    Success,
    #[serde(rename = "FAILED")]
    Failed,
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionStatus::Success => write!(f, "SUCCESS"),
            TransactionStatus::Failed => write!(f, "FAILED"),
        }
    }
}

/// Transaction envelope exchanged on every confirmation call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_id: String,
    pub status: TransactionStatus,
    pub message: String,
}

impl Transaction {
    pub fn success(transaction_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            status: TransactionStatus::Success,
            message: message.into(),
        }
    }

    pub fn failed(transaction_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            status: TransactionStatus::Failed,
            message: message.into(),
        }
    }

    /// Generates a fresh caller-side transaction id
    pub fn new_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    pub fn is_success(&self) -> bool {
        self.status == TransactionStatus::Success
    }
}

/// Status of a transaction as recorded in the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerStatus {
    /// Confirmed by the backend but not yet completed
    Pending,
    /// Completed successfully
    Success,
    /// The backend reported a failure
    Failed,
}

impl LedgerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerStatus::Pending => "pending",
            LedgerStatus::Success => "success",
            LedgerStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(LedgerStatus::Pending),
            "success" => Some(LedgerStatus::Success),
            "failed" => Some(LedgerStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for LedgerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ledger entry for one transaction id
///
/// Immutable once `completed` is true.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub transaction_id: String,
    pub status: LedgerStatus,
    pub last_message: String,
    pub completed: bool,
    pub last_update: DateTime<Utc>,
}

/// A requested change to a ledger entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionUpdate {
    pub transaction_id: String,
    pub status: LedgerStatus,
    pub last_message: String,
    pub completed: bool,
}

impl TransactionUpdate {
    /// Whether applying this update to `record` would change nothing observable
    pub fn matches(&self, record: &TransactionRecord) -> bool {
        record.transaction_id == self.transaction_id
            && record.status == self.status
            && record.last_message == self.last_message
            && record.completed == self.completed
    }

    /// Builds the record that results from applying this update
    ///
    /// `last_update` only moves when the observable state changes.
    pub fn apply(&self, existing: Option<&TransactionRecord>, now: DateTime<Utc>) -> TransactionRecord {
        match existing {
            Some(record) if self.matches(record) => record.clone(),
            _ => TransactionRecord {
                transaction_id: self.transaction_id.clone(),
                status: self.status,
                last_message: self.last_message.clone(),
                completed: self.completed,
                last_update: now,
            },
        }
    }
}
