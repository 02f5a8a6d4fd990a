//! Repository Module
//!
//! Data access layer for the coordinator. The ledger, the VM transition log,
//! runs and pending evaluations live behind [`LedgerStore`] so the service
//! layer runs unchanged against Postgres or memory.

pub mod memory;
pub mod postgres;

pub use memory::MemoryLedgerStore;
pub use postgres::PgLedgerStore;

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;
use tira_core::domain::run::{Run, RunKey, RunLifecycle};
use tira_core::domain::transaction::{TransactionRecord, TransactionUpdate};
use tira_core::domain::vm::VmTransition;

/// Storage error type
#[derive(Debug, Error)]
pub enum StoreError {
    /// A completed transaction would change
    #[error("Transaction {transaction_id} is completed and cannot be changed")]
    CompletedTransaction { transaction_id: String },

    /// A stored row cannot be mapped back to the domain
    #[error("Stored data is corrupt: {0}")]
    Corrupt(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistent state owned by the coordinator
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Atomically creates or updates a transaction record
    ///
    /// Re-applying the stored status, message and completion is a no-op that
    /// keeps `last_update`. Changing a completed record fails with
    /// [`StoreError::CompletedTransaction`].
    async fn upsert_transaction(&self, update: TransactionUpdate) -> StoreResult<TransactionRecord>;

    async fn find_transaction(&self, transaction_id: &str) -> StoreResult<Option<TransactionRecord>>;

    /// Records the last known state of a VM
    async fn record_vm_transition(&self, transition: VmTransition) -> StoreResult<()>;

    async fn find_vm_transition(&self, vm_id: &str) -> StoreResult<Option<VmTransition>>;

    /// Inserts a run unless its key is taken, returning whether it was inserted
    async fn insert_run(&self, run: &Run) -> StoreResult<bool>;

    async fn find_run(&self, key: &RunKey) -> StoreResult<Option<Run>>;

    /// Moves a run forward in its lifecycle, never backwards
    async fn advance_run(&self, key: &RunKey, to: RunLifecycle) -> StoreResult<Option<Run>>;

    /// Marks an evaluation of `(vm_id, run_id)` as pending
    async fn add_pending_evaluation(&self, vm_id: &str, run_id: &str) -> StoreResult<()>;

    /// Clears a pending evaluation marker, returning whether one existed
    async fn remove_pending_evaluation(&self, vm_id: &str, run_id: &str) -> StoreResult<bool>;

    async fn is_evaluation_pending(&self, vm_id: &str, run_id: &str) -> StoreResult<bool>;

    /// Stores the measures computed for an evaluated run
    async fn store_measures(&self, key: &RunKey, measures: &BTreeMap<String, Value>) -> StoreResult<()>;

    async fn find_measures(&self, key: &RunKey) -> StoreResult<Option<BTreeMap<String, Value>>>;
}
