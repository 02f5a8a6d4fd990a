//! Core domain types
//!
//! This module contains the core domain structures used across TIRA services.
//! These types represent the fundamental business entities and are shared between
//! the coordinator (for persistence), the runner (for execution) and the
//! evaluation engine.

pub mod descriptor;
pub mod diagnostics;
pub mod evaluator;
pub mod profiling;
pub mod review;
pub mod run;
pub mod transaction;
pub mod vm;
