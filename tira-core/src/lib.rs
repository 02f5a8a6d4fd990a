//! TIRA Core
//!
//! Core types and abstractions for the TIRA job orchestration system.
//!
//! This crate contains:
//! - Domain types: Core business entities (JobDescriptor, Transaction, Run, Review, etc.)
//! - DTOs: Data transfer objects for inter-service communication, including the
//!   flat `KEY=VALUE` job descriptor file used by the git-CI backend

pub mod domain;
pub mod dto;
