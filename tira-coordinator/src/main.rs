//! TIRA Coordinator
//!
//! Records the confirmations of the execution backends in the transaction
//! ledger, tracks the lifecycle of runs and reviews them.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod api;
pub mod config;
pub mod db;
pub mod repository;
pub mod service;

use crate::api::AppState;
use crate::config::Config;
use crate::repository::{LedgerStore, MemoryLedgerStore, PgLedgerStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tira_coordinator=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting TIRA Coordinator...");

    let config = Config::from_env()?;
    config.validate()?;

    let store: Arc<dyn LedgerStore> = match &config.database_url {
        Some(database_url) => {
            tracing::info!("Connecting to database...");

            let pool = db::create_pool(database_url)
                .await
                .context("Failed to create database pool")?;

            tracing::info!("Database connection pool created");

            db::run_migrations(&pool)
                .await
                .context("Failed to run database migrations")?;

            Arc::new(PgLedgerStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, the ledger is kept in memory");
            Arc::new(MemoryLedgerStore::new())
        }
    };

    // Build router with all API endpoints
    let app = api::create_router(
        AppState {
            store,
            runs_dir: config.runs_dir.clone(),
        },
        config.max_concurrent_requests,
    );

    tracing::info!(
        "Listening on {} (runs in {}, at most {} concurrent requests)",
        config.bind_addr,
        config.runs_dir.display(),
        config.max_concurrent_requests
    );

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    axum::serve(listener, app)
        .await
        .context("Failed to start server")?;

    Ok(())
}
