//! Coordinator repository
//!
//! Reports VM states and delivers execution and evaluation confirmations.
//! Confirmations go through the retry-until-acknowledged exchanges of the
//! client, so a call returns only once the coordinator recorded it.

use anyhow::{Context, Result};
use async_trait::async_trait;
use tira_client::{Backoff, CoordinatorClient};
use tira_core::domain::run::RunKey;
use tira_core::domain::transaction::Transaction;
use tira_core::domain::vm::VmState;
use tira_eval::Measures;
use tracing::{debug, info};

/// Repository trait for the confirmation protocol
#[async_trait]
pub trait CoordinatorRepository: Send + Sync {
    /// Records the last-known state of a VM
    async fn report_state(&self, vm_id: &str, state: VmState) -> Result<()>;

    /// Confirms that `run` was executed, successfully or not
    ///
    /// # Arguments
    /// * `run` - The executed run
    /// * `success` - Whether the software exited cleanly
    /// * `message` - Human-readable outcome
    async fn confirm_execution(&self, run: &RunKey, success: bool, message: &str) -> Result<()>;

    /// Confirms the evaluation of `run`
    ///
    /// # Arguments
    /// * `run` - The evaluated run
    /// * `success` - Whether the evaluation produced measures
    /// * `message` - Human-readable outcome
    /// * `measures` - Flat measure map, if computed by the runner
    async fn confirm_evaluation(
        &self,
        run: &RunKey,
        success: bool,
        message: &str,
        measures: Option<Measures>,
    ) -> Result<()>;
}

/// HTTP implementation of CoordinatorRepository
pub struct HttpCoordinatorRepository {
    client: CoordinatorClient,
    backoff: Backoff,
}

impl HttpCoordinatorRepository {
    /// Creates a new HTTP coordinator repository
    ///
    /// # Arguments
    /// * `coordinator_url` - Base URL of the coordinator (e.g., "http://localhost:8080")
    /// * `backoff` - Delay policy between confirmation attempts
    pub fn new(coordinator_url: String, backoff: Backoff) -> Self {
        Self {
            client: CoordinatorClient::new(coordinator_url),
            backoff,
        }
    }
}

fn envelope(success: bool, message: &str) -> Transaction {
    if success {
        Transaction::success(Transaction::new_id(), message)
    } else {
        Transaction::failed(Transaction::new_id(), message)
    }
}

#[async_trait]
impl CoordinatorRepository for HttpCoordinatorRepository {
    async fn report_state(&self, vm_id: &str, state: VmState) -> Result<()> {
        let transaction = Transaction::success(Transaction::new_id(), format!("state {}", state.as_str()));
        let answer = self
            .client
            .set_state(transaction, vm_id, state)
            .await
            .with_context(|| format!("Failed to report state {} of {}", state.as_str(), vm_id))?;
        debug!("Coordinator answered set_state with {}", answer.message);
        Ok(())
    }

    async fn confirm_execution(&self, run: &RunKey, success: bool, message: &str) -> Result<()> {
        let answer = self
            .client
            .confirm_execution_until_acknowledged(envelope(success, message), run.clone(), &self.backoff)
            .await
            .with_context(|| format!("Failed to confirm the execution of {}", run))?;
        info!("Execution of {} confirmed: {}", run, answer.message);
        Ok(())
    }

    async fn confirm_evaluation(
        &self,
        run: &RunKey,
        success: bool,
        message: &str,
        measures: Option<Measures>,
    ) -> Result<()> {
        let answer = self
            .client
            .confirm_evaluation_until_acknowledged(
                envelope(success, message),
                run.clone(),
                measures,
                &self.backoff,
            )
            .await
            .with_context(|| format!("Failed to confirm the evaluation of {}", run))?;
        info!("Evaluation of {} confirmed: {}", run, answer.message);
        Ok(())
    }
}

/// Records calls in memory
#[cfg(test)]
#[derive(Debug, Default)]
pub struct RecordingCoordinator {
    pub states: std::sync::Mutex<Vec<(String, VmState)>>,
    pub executions: std::sync::Mutex<Vec<(RunKey, bool)>>,
    pub evaluations: std::sync::Mutex<Vec<(RunKey, bool, Option<Measures>)>>,
}

#[cfg(test)]
#[async_trait]
impl CoordinatorRepository for RecordingCoordinator {
    async fn report_state(&self, vm_id: &str, state: VmState) -> Result<()> {
        self.states.lock().unwrap().push((vm_id.to_string(), state));
        Ok(())
    }

    async fn confirm_execution(&self, run: &RunKey, success: bool, _message: &str) -> Result<()> {
        self.executions.lock().unwrap().push((run.clone(), success));
        Ok(())
    }

    async fn confirm_evaluation(
        &self,
        run: &RunKey,
        success: bool,
        _message: &str,
        measures: Option<Measures>,
    ) -> Result<()> {
        self.evaluations
            .lock()
            .unwrap()
            .push((run.clone(), success, measures));
        Ok(())
    }
}
