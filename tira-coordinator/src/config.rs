//! Coordinator configuration

use std::path::PathBuf;

/// Coordinator configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP server binds to
    pub bind_addr: String,

    /// Postgres connection string, the in-memory store is used without one
    pub database_url: Option<String>,

    /// Upper bound of requests handled at the same time
    pub max_concurrent_requests: usize,

    /// Root of the run directories
    pub runs_dir: PathBuf,
}

impl Config {
    /// Creates configuration from environment variables
    ///
    /// Expected environment variables:
    /// - TIRA_BIND_ADDR (optional, default: 0.0.0.0:8080)
    /// - DATABASE_URL (optional)
    /// - TIRA_MAX_CONCURRENT_REQUESTS (optional, default: 50)
    /// - TIRA_RUNS_DIR (optional, default: ./runs)
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        let bind_addr = std::env::var("TIRA_BIND_ADDR").unwrap_or(defaults.bind_addr);

        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());

        let max_concurrent_requests = match std::env::var("TIRA_MAX_CONCURRENT_REQUESTS") {
            Ok(value) => value.parse::<usize>().map_err(|_| {
                anyhow::anyhow!("TIRA_MAX_CONCURRENT_REQUESTS must be a number, got {:?}", value)
            })?,
            Err(_) => defaults.max_concurrent_requests,
        };

        let runs_dir = std::env::var("TIRA_RUNS_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.runs_dir);

        Ok(Self {
            bind_addr,
            database_url,
            max_concurrent_requests,
            runs_dir,
        })
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.bind_addr.is_empty() {
            anyhow::bail!("bind_addr cannot be empty");
        }

        if self.max_concurrent_requests == 0 {
            anyhow::bail!("max_concurrent_requests must be greater than 0");
        }

        if let Some(url) = &self.database_url {
            if !url.starts_with("postgres://") && !url.starts_with("postgresql://") {
                anyhow::bail!("database_url must start with postgres:// or postgresql://");
            }
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            database_url: None,
            max_concurrent_requests: 50,
            runs_dir: PathBuf::from("./runs"),
        }
    }
}
