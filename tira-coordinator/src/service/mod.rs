//! Service Module
//!
//! Business logic layer for the coordinator.
//! Services orchestrate between the ledger store and the run directories.

pub mod review;
pub mod run;
pub mod transaction;

// Re-export for convenience
pub use review as review_service;
pub use run as run_service;
pub use transaction as transaction_service;
