use sqlx::{PgPool, postgres::PgPoolOptions};
use std::time::Duration;

pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    // Transaction ledger
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS transaction_log (
            transaction_id VARCHAR(255) PRIMARY KEY,
            status VARCHAR(20) NOT NULL,
            last_message TEXT NOT NULL,
            completed BOOLEAN NOT NULL DEFAULT FALSE,
            last_update TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Last known state per VM
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS vm_transition_log (
            vm_id VARCHAR(255) PRIMARY KEY,
            vm_state VARCHAR(50) NOT NULL,
            last_transaction VARCHAR(255) NOT NULL REFERENCES transaction_log(transaction_id),
            updated_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS runs (
            dataset_id VARCHAR(255) NOT NULL,
            vm_id VARCHAR(255) NOT NULL,
            run_id VARCHAR(255) NOT NULL,
            software_id VARCHAR(255),
            input_run_id VARCHAR(255),
            is_evaluation BOOLEAN NOT NULL DEFAULT FALSE,
            downloadable BOOLEAN NOT NULL DEFAULT FALSE,
            deleted BOOLEAN NOT NULL DEFAULT FALSE,
            lifecycle SMALLINT NOT NULL DEFAULT 0,
            created_at TIMESTAMPTZ NOT NULL,
            measures JSONB,
            PRIMARY KEY (dataset_id, vm_id, run_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Pending evaluations, removed on confirmation
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS evaluation_log (
            vm_id VARCHAR(255) NOT NULL,
            run_id VARCHAR(255) NOT NULL,
            created_at TIMESTAMPTZ NOT NULL,
            PRIMARY KEY (vm_id, run_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_transaction_log_completed ON transaction_log(completed)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_runs_input_run ON runs(vm_id, input_run_id)")
        .execute(pool)
        .await?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}
