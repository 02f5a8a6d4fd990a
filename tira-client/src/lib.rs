//! TIRA HTTP Client
//!
//! A type-safe HTTP client for the TIRA coordinator API, shared by the runner
//! and the CLI.
//!
//! # Example
//!
//! ```no_run
//! use tira_client::{Backoff, CoordinatorClient};
//! use tira_core::domain::run::RunKey;
//! use tira_core::domain::transaction::Transaction;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = CoordinatorClient::new("http://localhost:8080");
//!     let transaction = Transaction::success(Transaction::new_id(), "execution finished");
//!
//!     // Retries until the coordinator acknowledges, then completes the transaction
//!     client
//!         .confirm_execution_until_acknowledged(
//!             transaction,
//!             RunKey::new("dataset-1", "vm-1", "2024-05-01-12-00-00"),
//!             &Backoff::default(),
//!         )
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod retry;
mod runs;
mod transactions;

// Re-export commonly used types
pub use error::{ClientError, Result};
pub use retry::{Backoff, until_acknowledged};

use reqwest::Client;
use serde::de::DeserializeOwned;

/// HTTP client for the TIRA coordinator API
///
/// Methods are grouped into:
/// - The confirmation protocol (set state, confirm, complete)
/// - Ledger and VM state queries
/// - Runs and reviews
#[derive(Debug, Clone)]
pub struct CoordinatorClient {
    /// Base URL of the coordinator (e.g., "http://localhost:8080")
    base_url: String,
    /// HTTP client instance
    client: Client,
}

impl CoordinatorClient {
    /// Create a new coordinator client
    ///
    /// # Arguments
    /// * `base_url` - The base URL of the coordinator API (e.g., "http://localhost:8080")
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new coordinator client with a custom HTTP client
    ///
    /// # Arguments
    /// * `base_url` - The base URL of the coordinator API
    /// * `client` - A configured reqwest Client
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Get the base URL of the coordinator
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Check the status code and deserialize the JSON body
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), error_message(&error_text)));
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }
}

/// Extracts `error` from a `{"error": "..."}` body, or returns the body as is
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| value.get("error").and_then(|e| e.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = CoordinatorClient::new("http://localhost:8080");
        assert_eq!(client.base_url(), "http://localhost:8080");
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = CoordinatorClient::new("http://localhost:8080/");
        assert_eq!(client.base_url(), "http://localhost:8080");
    }

    #[test]
    fn test_error_message_unwraps_error_body() {
        assert_eq!(error_message(r#"{"error":"Run d/v/r not found"}"#), "Run d/v/r not found");
        assert_eq!(error_message("Bad Gateway"), "Bad Gateway");
    }
}
