//! Configuration module
//!
//! Handles CLI configuration including the coordinator URL.

/// CLI configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// URL of the coordinator service
    pub coordinator_url: String,
}
