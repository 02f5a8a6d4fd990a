//! VM / worker lifecycle state
//!
//! The coordinator only records the last reported state. Any state may follow
//! any other, the backend owns the physical state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Last-known lifecycle state of a VM or worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VmState {
    Running,
    PoweringOff,
    Sandboxing,
    Executing,
    Unsandboxing,
    PoweringOn,
    Busy,
    Failed,
}

impl VmState {
    pub fn as_str(&self) -> &'static str {
        match self {
            VmState::Running => "running",
            VmState::PoweringOff => "powering_off",
            VmState::Sandboxing => "sandboxing",
            VmState::Executing => "executing",
            VmState::Unsandboxing => "unsandboxing",
            VmState::PoweringOn => "powering_on",
            VmState::Busy => "busy",
            VmState::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "running" => Some(VmState::Running),
            "powering_off" => Some(VmState::PoweringOff),
            "sandboxing" => Some(VmState::Sandboxing),
            "executing" => Some(VmState::Executing),
            "unsandboxing" => Some(VmState::Unsandboxing),
            "powering_on" => Some(VmState::PoweringOn),
            "busy" => Some(VmState::Busy),
            "failed" => Some(VmState::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for VmState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Most recent state transition recorded for a VM
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmTransition {
    pub vm_id: String,
    pub state: VmState,
    pub last_transaction: String,
    pub updated_at: DateTime<Utc>,
}
