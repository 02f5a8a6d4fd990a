//! Scheduler layer for the runner
//!
//! Places jobs on workers of their resource class and drives each job from
//! sandboxing to its confirmation.

pub mod pool;

pub use pool::{ResourceClass, WorkerPool};
