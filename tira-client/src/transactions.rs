//! Confirmation protocol endpoints

use serde_json::Value;
use std::collections::BTreeMap;
use tira_core::domain::run::RunKey;
use tira_core::domain::transaction::{Transaction, TransactionRecord};
use tira_core::domain::vm::{VmState, VmTransition};
use tira_core::dto::transaction::{ConfirmEvaluationRequest, ConfirmExecutionRequest, SetStateRequest};

use crate::CoordinatorClient;
use crate::error::Result;
use crate::retry::{Backoff, until_acknowledged};

/// Completion message sent after an acknowledged execution confirmation
pub const COMPLETED_EXECUTION: &str = "confirmation: completed execution";

/// Completion message sent after an acknowledged evaluation confirmation
pub const COMPLETED_EVALUATION: &str = "confirmation: completed evaluation";

impl CoordinatorClient {
    // =============================================================================
    // Single Calls
    // =============================================================================

    /// Report the state of a VM
    pub async fn set_state(&self, transaction: Transaction, vm_id: &str, state: VmState) -> Result<Transaction> {
        let url = format!("{}/v1/set_state", self.base_url);
        let req = SetStateRequest {
            transaction,
            vm_id: vm_id.to_string(),
            state,
        };
        let response = self.client.post(&url).json(&req).send().await?;

        self.handle_response(response).await
    }

    /// Confirm that a run was executed
    pub async fn confirm_execution(&self, req: ConfirmExecutionRequest) -> Result<Transaction> {
        let url = format!("{}/v1/confirm_execution", self.base_url);
        let response = self.client.post(&url).json(&req).send().await?;

        self.handle_response(response).await
    }

    /// Confirm that a run was evaluated
    pub async fn confirm_evaluation(&self, req: ConfirmEvaluationRequest) -> Result<Transaction> {
        let url = format!("{}/v1/confirm_evaluation", self.base_url);
        let response = self.client.post(&url).json(&req).send().await?;

        self.handle_response(response).await
    }

    /// Mark a transaction as completed
    pub async fn complete_transaction(&self, transaction: Transaction) -> Result<Transaction> {
        let url = format!("{}/v1/complete_transaction", self.base_url);
        let response = self.client.post(&url).json(&transaction).send().await?;

        self.handle_response(response).await
    }

    // =============================================================================
    // Confirm-Then-Complete Exchanges
    // =============================================================================

    /// Confirm an execution until acknowledged, then complete the transaction
    ///
    /// # Arguments
    /// * `transaction` - Envelope carrying the execution outcome
    /// * `run` - The executed run
    /// * `backoff` - Delay policy between attempts
    pub async fn confirm_execution_until_acknowledged(
        &self,
        transaction: Transaction,
        run: RunKey,
        backoff: &Backoff,
    ) -> Result<Transaction> {
        let transaction_id = transaction.transaction_id.clone();
        let req = ConfirmExecutionRequest { transaction, run };

        until_acknowledged(backoff, "confirm_execution", || {
            self.confirm_execution(req.clone())
        })
        .await?;

        let completion = Transaction::success(transaction_id, COMPLETED_EXECUTION);
        until_acknowledged(backoff, "complete_transaction", || {
            self.complete_transaction(completion.clone())
        })
        .await
    }

    /// Confirm an evaluation until acknowledged, then complete the transaction
    ///
    /// # Arguments
    /// * `transaction` - Envelope carrying the evaluation outcome
    /// * `run` - The evaluated run
    /// * `measures` - Flat measure map of the evaluation, if it succeeded
    /// * `backoff` - Delay policy between attempts
    pub async fn confirm_evaluation_until_acknowledged(
        &self,
        transaction: Transaction,
        run: RunKey,
        measures: Option<BTreeMap<String, Value>>,
        backoff: &Backoff,
    ) -> Result<Transaction> {
        let transaction_id = transaction.transaction_id.clone();
        let req = ConfirmEvaluationRequest {
            transaction,
            run,
            measures,
        };

        until_acknowledged(backoff, "confirm_evaluation", || {
            self.confirm_evaluation(req.clone())
        })
        .await?;

        let completion = Transaction::success(transaction_id, COMPLETED_EVALUATION);
        until_acknowledged(backoff, "complete_transaction", || {
            self.complete_transaction(completion.clone())
        })
        .await
    }

    // =============================================================================
    // Queries
    // =============================================================================

    /// Get the ledger record of a transaction
    pub async fn get_transaction(&self, transaction_id: &str) -> Result<TransactionRecord> {
        let url = format!("{}/v1/transaction/{}", self.base_url, transaction_id);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Get the last recorded state of a VM
    pub async fn get_vm_state(&self, vm_id: &str) -> Result<VmTransition> {
        let url = format!("{}/v1/vm/{}/state", self.base_url, vm_id);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }
}
