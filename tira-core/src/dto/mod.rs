//! Data Transfer Objects for inter-service communication
//!
//! This module contains DTOs used for communication between TIRA services
//! (coordinator, runner, CLI). DTOs are lightweight representations of
//! domain entities optimized for network transfer.

pub mod descriptor;
pub mod run;
pub mod transaction;
