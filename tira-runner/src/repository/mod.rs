//! Repository layer
//!
//! Stateless access to the coordinator. Business logic lives in the service
//! and scheduler layers; the trait keeps them testable without a coordinator.

mod coordinator;

pub use coordinator::{CoordinatorRepository, HttpCoordinatorRepository};

#[cfg(test)]
pub use coordinator::RecordingCoordinator;
