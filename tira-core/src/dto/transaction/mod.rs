//! Confirmation protocol DTOs
//!
//! Request bodies of the four coordinator operations. Every request embeds
//! the [`Transaction`] envelope it continues; every response is a
//! [`Transaction`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::domain::run::RunKey;
use crate::domain::transaction::Transaction;
use crate::domain::vm::VmState;

/// SetState request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetStateRequest {
    pub transaction: Transaction,
    pub vm_id: String,
    pub state: VmState,
}

/// ConfirmExecution request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmExecutionRequest {
    pub transaction: Transaction,
    pub run: RunKey,
}

/// ConfirmEvaluation request
///
/// `run` names the evaluation run; `measures` is the optional result document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmEvaluationRequest {
    pub transaction: Transaction,
    pub run: RunKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measures: Option<BTreeMap<String, Value>>,
}

/// CompleteTransaction request
pub type CompleteTransactionRequest = Transaction;
