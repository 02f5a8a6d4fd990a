//! Service layer
//!
//! Services contain the business logic of the runner: executing jobs in the
//! sandbox, evaluating trusted runs in-process, dispatching jobs to a CI
//! system and persisting the results of CI jobs.

mod dispatch;
mod evaluation;
mod execution;
mod persist;

// Re-export traits
pub use dispatch::DispatchService;
pub use execution::ExecutionService;

// Re-export implementations
pub use dispatch::{DispatchOutcome, GitCiDispatchService};
pub use evaluation::{EvaluationReport, evaluate_trusted};
pub use execution::{Job, JobOutcome, SandboxExecutionService};
pub use persist::{PersistOutcome, PersistService};
