//! In-memory ledger store
//!
//! Used when no database is configured and in tests. Every transaction id has
//! its own entry lock; the map of entries is only locked to find or insert an
//! entry, so writers of different transactions never wait on each other.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tira_core::domain::run::{Run, RunKey, RunLifecycle};
use tira_core::domain::transaction::{TransactionRecord, TransactionUpdate};
use tira_core::domain::vm::VmTransition;

use super::{LedgerStore, StoreError, StoreResult};

type Entry = Arc<Mutex<Option<TransactionRecord>>>;

#[derive(Default)]
pub struct MemoryLedgerStore {
    transactions: Mutex<HashMap<String, Entry>>,
    vm_transitions: Mutex<HashMap<String, VmTransition>>,
    runs: Mutex<HashMap<RunKey, Run>>,
    pending_evaluations: Mutex<HashSet<(String, String)>>,
    measures: Mutex<HashMap<RunKey, BTreeMap<String, Value>>>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn entry(&self, transaction_id: &str) -> Entry {
        let mut transactions = self.transactions.lock().await;
        transactions
            .entry(transaction_id.to_string())
            .or_default()
            .clone()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn upsert_transaction(&self, update: TransactionUpdate) -> StoreResult<TransactionRecord> {
        let entry = self.entry(&update.transaction_id).await;
        let mut slot = entry.lock().await;

        if let Some(existing) = slot.as_ref() {
            if existing.completed {
                return if update.matches(existing) {
                    Ok(existing.clone())
                } else {
                    Err(StoreError::CompletedTransaction {
                        transaction_id: update.transaction_id,
                    })
                };
            }
        }

        let record = update.apply(slot.as_ref(), Utc::now());
        *slot = Some(record.clone());
        Ok(record)
    }

    async fn find_transaction(&self, transaction_id: &str) -> StoreResult<Option<TransactionRecord>> {
        let entry = {
            let transactions = self.transactions.lock().await;
            transactions.get(transaction_id).cloned()
        };

        match entry {
            Some(entry) => Ok(entry.lock().await.clone()),
            None => Ok(None),
        }
    }

    async fn record_vm_transition(&self, transition: VmTransition) -> StoreResult<()> {
        let mut transitions = self.vm_transitions.lock().await;
        transitions.insert(transition.vm_id.clone(), transition);
        Ok(())
    }

    async fn find_vm_transition(&self, vm_id: &str) -> StoreResult<Option<VmTransition>> {
        Ok(self.vm_transitions.lock().await.get(vm_id).cloned())
    }

    async fn insert_run(&self, run: &Run) -> StoreResult<bool> {
        let mut runs = self.runs.lock().await;
        if runs.contains_key(&run.key) {
            return Ok(false);
        }
        runs.insert(run.key.clone(), run.clone());
        Ok(true)
    }

    async fn find_run(&self, key: &RunKey) -> StoreResult<Option<Run>> {
        Ok(self.runs.lock().await.get(key).cloned())
    }

    async fn advance_run(&self, key: &RunKey, to: RunLifecycle) -> StoreResult<Option<Run>> {
        let mut runs = self.runs.lock().await;
        Ok(runs.get_mut(key).map(|run| {
            run.lifecycle = run.lifecycle.advance(to);
            run.clone()
        }))
    }

    async fn add_pending_evaluation(&self, vm_id: &str, run_id: &str) -> StoreResult<()> {
        let mut pending = self.pending_evaluations.lock().await;
        pending.insert((vm_id.to_string(), run_id.to_string()));
        Ok(())
    }

    async fn remove_pending_evaluation(&self, vm_id: &str, run_id: &str) -> StoreResult<bool> {
        let mut pending = self.pending_evaluations.lock().await;
        Ok(pending.remove(&(vm_id.to_string(), run_id.to_string())))
    }

    async fn is_evaluation_pending(&self, vm_id: &str, run_id: &str) -> StoreResult<bool> {
        let pending = self.pending_evaluations.lock().await;
        Ok(pending.contains(&(vm_id.to_string(), run_id.to_string())))
    }

    async fn store_measures(&self, key: &RunKey, measures: &BTreeMap<String, Value>) -> StoreResult<()> {
        let mut stored = self.measures.lock().await;
        stored.insert(key.clone(), measures.clone());
        Ok(())
    }

    async fn find_measures(&self, key: &RunKey) -> StoreResult<Option<BTreeMap<String, Value>>> {
        Ok(self.measures.lock().await.get(key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tira_core::domain::transaction::LedgerStatus;

    fn update(id: &str, message: &str, completed: bool) -> TransactionUpdate {
        TransactionUpdate {
            transaction_id: id.to_string(),
            status: if completed {
                LedgerStatus::Success
            } else {
                LedgerStatus::Pending
            },
            last_message: message.to_string(),
            completed,
        }
    }

    #[tokio::test]
    async fn test_repeated_upsert_keeps_record() {
        let store = MemoryLedgerStore::new();
        let first = store.upsert_transaction(update("t-1", "a", false)).await.unwrap();
        let second = store.upsert_transaction(update("t-1", "a", false)).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_completed_record_is_immutable() {
        let store = MemoryLedgerStore::new();
        store.upsert_transaction(update("t-1", "done", true)).await.unwrap();

        assert!(store.upsert_transaction(update("t-1", "done", true)).await.is_ok());
        let err = store
            .upsert_transaction(update("t-1", "again", false))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::CompletedTransaction { .. }));

        let stored = store.find_transaction("t-1").await.unwrap().unwrap();
        assert_eq!(stored.last_message, "done");
    }

    #[tokio::test]
    async fn test_concurrent_writers_of_different_ids() {
        let store = Arc::new(MemoryLedgerStore::new());
        let mut handles = Vec::new();
        for i in 0..20 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .upsert_transaction(update(&format!("t-{}", i), "m", false))
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        for i in 0..20 {
            assert!(store.find_transaction(&format!("t-{}", i)).await.unwrap().is_some());
        }
    }

    #[tokio::test]
    async fn test_run_insert_is_conditional() {
        let store = MemoryLedgerStore::new();
        let run = Run {
            key: RunKey::new("d", "v", "r"),
            software_id: None,
            input_run_id: None,
            is_evaluation: false,
            downloadable: false,
            deleted: false,
            lifecycle: RunLifecycle::Created,
            created_at: Utc::now(),
        };
        assert!(store.insert_run(&run).await.unwrap());
        assert!(!store.insert_run(&run).await.unwrap());

        let advanced = store
            .advance_run(&run.key, RunLifecycle::Evaluated)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(advanced.lifecycle, RunLifecycle::Evaluated);
        let late = store
            .advance_run(&run.key, RunLifecycle::Executed)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(late.lifecycle, RunLifecycle::Evaluated);
    }
}
