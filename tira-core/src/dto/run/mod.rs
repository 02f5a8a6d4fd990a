//! Run DTOs for inter-service communication

use serde::{Deserialize, Serialize};

/// Request to create a new run
///
/// The coordinator generates the run id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateRun {
    pub dataset_id: String,
    pub vm_id: String,
    pub software_id: Option<String>,
    pub input_run_id: Option<String>,
    #[serde(default)]
    pub is_evaluation: bool,
}
