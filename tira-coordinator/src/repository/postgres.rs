//! Postgres ledger store
//!
//! Handles all database operations of the coordinator. Tables are created by
//! [`crate::db::run_migrations`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use sqlx::types::Json;
use std::collections::BTreeMap;
use tira_core::domain::run::{Run, RunKey, RunLifecycle};
use tira_core::domain::transaction::{LedgerStatus, TransactionRecord, TransactionUpdate};
use tira_core::domain::vm::{VmState, VmTransition};

use super::{LedgerStore, StoreError, StoreResult};

pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn upsert_transaction(&self, update: TransactionUpdate) -> StoreResult<TransactionRecord> {
        // last_update only moves when the stored tuple changes; completed rows never change
        let row = sqlx::query_as::<_, TransactionRow>(
            r#"
            INSERT INTO transaction_log (transaction_id, status, last_message, completed, last_update)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (transaction_id) DO UPDATE SET
                status = EXCLUDED.status,
                last_message = EXCLUDED.last_message,
                completed = EXCLUDED.completed,
                last_update = CASE
                    WHEN transaction_log.status = EXCLUDED.status
                     AND transaction_log.last_message = EXCLUDED.last_message
                     AND transaction_log.completed = EXCLUDED.completed
                    THEN transaction_log.last_update
                    ELSE EXCLUDED.last_update
                END
            WHERE NOT transaction_log.completed
            RETURNING transaction_id, status, last_message, completed, last_update
            "#,
        )
        .bind(&update.transaction_id)
        .bind(update.status.as_str())
        .bind(&update.last_message)
        .bind(update.completed)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = row {
            return row.try_into();
        }

        // The row exists and is completed
        match self.find_transaction(&update.transaction_id).await? {
            Some(existing) if update.matches(&existing) => Ok(existing),
            _ => Err(StoreError::CompletedTransaction {
                transaction_id: update.transaction_id,
            }),
        }
    }

    async fn find_transaction(&self, transaction_id: &str) -> StoreResult<Option<TransactionRecord>> {
        let row = sqlx::query_as::<_, TransactionRow>(
            r#"
            SELECT transaction_id, status, last_message, completed, last_update
            FROM transaction_log
            WHERE transaction_id = $1
            "#,
        )
        .bind(transaction_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn record_vm_transition(&self, transition: VmTransition) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO vm_transition_log (vm_id, vm_state, last_transaction, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (vm_id) DO UPDATE SET
                vm_state = EXCLUDED.vm_state,
                last_transaction = EXCLUDED.last_transaction,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&transition.vm_id)
        .bind(transition.state.as_str())
        .bind(&transition.last_transaction)
        .bind(transition.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_vm_transition(&self, vm_id: &str) -> StoreResult<Option<VmTransition>> {
        let row = sqlx::query_as::<_, VmTransitionRow>(
            r#"
            SELECT vm_id, vm_state, last_transaction, updated_at
            FROM vm_transition_log
            WHERE vm_id = $1
            "#,
        )
        .bind(vm_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn insert_run(&self, run: &Run) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO runs (dataset_id, vm_id, run_id, software_id, input_run_id,
                              is_evaluation, downloadable, deleted, lifecycle, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (dataset_id, vm_id, run_id) DO NOTHING
            "#,
        )
        .bind(&run.key.dataset_id)
        .bind(&run.key.vm_id)
        .bind(&run.key.run_id)
        .bind(&run.software_id)
        .bind(&run.input_run_id)
        .bind(run.is_evaluation)
        .bind(run.downloadable)
        .bind(run.deleted)
        .bind(lifecycle_rank(run.lifecycle))
        .bind(run.created_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_run(&self, key: &RunKey) -> StoreResult<Option<Run>> {
        let row = sqlx::query_as::<_, RunRow>(
            r#"
            SELECT dataset_id, vm_id, run_id, software_id, input_run_id,
                   is_evaluation, downloadable, deleted, lifecycle, created_at
            FROM runs
            WHERE dataset_id = $1 AND vm_id = $2 AND run_id = $3
            "#,
        )
        .bind(&key.dataset_id)
        .bind(&key.vm_id)
        .bind(&key.run_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn advance_run(&self, key: &RunKey, to: RunLifecycle) -> StoreResult<Option<Run>> {
        let row = sqlx::query_as::<_, RunRow>(
            r#"
            UPDATE runs
            SET lifecycle = GREATEST(lifecycle, $4)
            WHERE dataset_id = $1 AND vm_id = $2 AND run_id = $3
            RETURNING dataset_id, vm_id, run_id, software_id, input_run_id,
                      is_evaluation, downloadable, deleted, lifecycle, created_at
            "#,
        )
        .bind(&key.dataset_id)
        .bind(&key.vm_id)
        .bind(&key.run_id)
        .bind(lifecycle_rank(to))
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn add_pending_evaluation(&self, vm_id: &str, run_id: &str) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO evaluation_log (vm_id, run_id, created_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (vm_id, run_id) DO NOTHING
            "#,
        )
        .bind(vm_id)
        .bind(run_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn remove_pending_evaluation(&self, vm_id: &str, run_id: &str) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM evaluation_log WHERE vm_id = $1 AND run_id = $2")
            .bind(vm_id)
            .bind(run_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn is_evaluation_pending(&self, vm_id: &str, run_id: &str) -> StoreResult<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM evaluation_log WHERE vm_id = $1 AND run_id = $2",
        )
        .bind(vm_id)
        .bind(run_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count > 0)
    }

    async fn store_measures(&self, key: &RunKey, measures: &BTreeMap<String, Value>) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE runs
            SET measures = $4
            WHERE dataset_id = $1 AND vm_id = $2 AND run_id = $3
            "#,
        )
        .bind(&key.dataset_id)
        .bind(&key.vm_id)
        .bind(&key.run_id)
        .bind(Json(measures))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_measures(&self, key: &RunKey) -> StoreResult<Option<BTreeMap<String, Value>>> {
        let measures: Option<Option<Json<BTreeMap<String, Value>>>> = sqlx::query_scalar(
            r#"
            SELECT measures
            FROM runs
            WHERE dataset_id = $1 AND vm_id = $2 AND run_id = $3
            "#,
        )
        .bind(&key.dataset_id)
        .bind(&key.vm_id)
        .bind(&key.run_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(measures.flatten().map(|Json(measures)| measures))
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

fn lifecycle_rank(lifecycle: RunLifecycle) -> i16 {
    match lifecycle {
        RunLifecycle::Created => 0,
        RunLifecycle::Executed => 1,
        RunLifecycle::Evaluated => 2,
        RunLifecycle::Reviewed => 3,
    }
}

fn lifecycle_from_rank(rank: i16) -> StoreResult<RunLifecycle> {
    match rank {
        0 => Ok(RunLifecycle::Created),
        1 => Ok(RunLifecycle::Executed),
        2 => Ok(RunLifecycle::Evaluated),
        3 => Ok(RunLifecycle::Reviewed),
        other => Err(StoreError::Corrupt(format!("unknown run lifecycle {}", other))),
    }
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct TransactionRow {
    transaction_id: String,
    status: String,
    last_message: String,
    completed: bool,
    last_update: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for TransactionRecord {
    type Error = StoreError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        let status = LedgerStatus::parse(&row.status).ok_or_else(|| {
            StoreError::Corrupt(format!(
                "unknown status {:?} of transaction {}",
                row.status, row.transaction_id
            ))
        })?;

        Ok(TransactionRecord {
            transaction_id: row.transaction_id,
            status,
            last_message: row.last_message,
            completed: row.completed,
            last_update: row.last_update,
        })
    }
}

#[derive(sqlx::FromRow)]
struct VmTransitionRow {
    vm_id: String,
    vm_state: String,
    last_transaction: String,
    updated_at: DateTime<Utc>,
}

impl TryFrom<VmTransitionRow> for VmTransition {
    type Error = StoreError;

    fn try_from(row: VmTransitionRow) -> Result<Self, Self::Error> {
        let state = VmState::parse(&row.vm_state).ok_or_else(|| {
            StoreError::Corrupt(format!("unknown state {:?} of vm {}", row.vm_state, row.vm_id))
        })?;

        Ok(VmTransition {
            vm_id: row.vm_id,
            state,
            last_transaction: row.last_transaction,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct RunRow {
    dataset_id: String,
    vm_id: String,
    run_id: String,
    software_id: Option<String>,
    input_run_id: Option<String>,
    is_evaluation: bool,
    downloadable: bool,
    deleted: bool,
    lifecycle: i16,
    created_at: DateTime<Utc>,
}

impl TryFrom<RunRow> for Run {
    type Error = StoreError;

    fn try_from(row: RunRow) -> Result<Self, Self::Error> {
        Ok(Run {
            key: RunKey::new(row.dataset_id, row.vm_id, row.run_id),
            software_id: row.software_id,
            input_run_id: row.input_run_id,
            is_evaluation: row.is_evaluation,
            downloadable: row.downloadable,
            deleted: row.deleted,
            lifecycle: lifecycle_from_rank(row.lifecycle)?,
            created_at: row.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_rank_order_matches_domain_order() {
        let all = [
            RunLifecycle::Created,
            RunLifecycle::Executed,
            RunLifecycle::Evaluated,
            RunLifecycle::Reviewed,
        ];
        for pair in all.windows(2) {
            assert!(lifecycle_rank(pair[0]) < lifecycle_rank(pair[1]));
        }
        for lifecycle in all {
            assert_eq!(lifecycle_from_rank(lifecycle_rank(lifecycle)).unwrap(), lifecycle);
        }
        assert!(lifecycle_from_rank(9).is_err());
    }
}
