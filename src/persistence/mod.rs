//! Persistence Layer
//!
//! SQLite storage for the movement ledger, reconciliation audit trail,
//! adjustment metadata and sync watermarks, via sqlx.
//!
//! # Database Schema
//!
//! ## stock_movements
//! - id: Integer primary key
//! - sku: Stock keeping unit
//! - product_id / variation_id: Optional catalog ids
//! - movement_date: When the stock changed
//! - quantity: Signed change
//! - movement_type: "initial", "sale", "adjustment" or "purchase"
//! - reason: Adjustment reason, if any
//! - reference_id: Order number or reconciliation id
//! - batch_number, notes: Free-form annotations
//! - created_at: Insertion timestamp
//!
//! ## stock_reconciliations
//! - id, sku, product_id, variation_id
//! - reconciliation_date, expected_quantity, actual_quantity, discrepancy
//! - notes, created_at
//!
//! ## adjustment_metadata
//! - movement_id: Foreign key to stock_movements
//! - manual_sale, loss_percentage
//!
//! ## sync_watermarks
//! - sync_key: e.g. "stock_movements"
//! - last_synced_at: Timestamp of the last successful run

pub mod models;
pub mod movement_repository;
pub mod reconciliation_repository;
pub mod watermark_repository;

use crate::domain::errors::LedgerError;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::ConnectOptions;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

pub use movement_repository::SqliteMovementRepository;
pub use reconciliation_repository::SqliteReconciliationRepository;
pub use watermark_repository::SqliteWatermarkStore;

/// Database connection pool
pub type DbPool = SqlitePool;

/// Database initialization error
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Database connection error: {0}")]
    ConnectionError(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    MigrationError(String),

    #[error("Query error: {0}")]
    QueryError(String),
}

impl From<DatabaseError> for LedgerError {
    fn from(error: DatabaseError) -> Self {
        LedgerError::upstream(error.to_string())
    }
}

/// Initialize the database connection pool with the default pool size
pub async fn init_database(database_url: &str) -> Result<DbPool, DatabaseError> {
    init_database_with(database_url, 5).await
}

/// Initialize the database connection pool
///
/// # Arguments
/// - `database_url`: SQLite URL (e.g., "sqlite://data/stockledger.db" or "sqlite::memory:")
/// - `max_connections`: Pool size; in-memory databases always use one connection
///
/// # Errors
/// Returns error if database connection fails or migrations fail
pub async fn init_database_with(
    database_url: &str,
    max_connections: u32,
) -> Result<DbPool, DatabaseError> {
    info!("Initializing database: {}", database_url);

    // Ensure data directory exists
    if let Some(db_path) = database_url.strip_prefix("sqlite://") {
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    DatabaseError::ConnectionError(sqlx::Error::Configuration(Box::new(e)))
                })?;
            }
        }
    }

    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .log_statements(tracing::log::LevelFilter::Debug);

    // Every connection to ":memory:" is a separate database
    let in_memory = database_url.contains(":memory:");
    let mut pool_options = SqlitePoolOptions::new();
    pool_options = if in_memory {
        pool_options
            .max_connections(1)
            .idle_timeout(None::<Duration>)
            .max_lifetime(None::<Duration>)
    } else {
        pool_options.max_connections(max_connections.max(1))
    };
    let pool = pool_options.connect_with(options).await?;

    run_migrations(&pool).await?;

    info!("✓ Database initialized successfully");

    Ok(pool)
}

/// Run database migrations
async fn run_migrations(pool: &DbPool) -> Result<(), DatabaseError> {
    info!("Running database migrations...");

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS stock_movements (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            sku TEXT NOT NULL,
            product_id INTEGER,
            variation_id INTEGER,
            movement_date DATETIME NOT NULL,
            quantity INTEGER NOT NULL,
            movement_type TEXT NOT NULL
                CHECK(movement_type IN ('initial', 'sale', 'adjustment', 'purchase')),
            reason TEXT
                CHECK(reason IS NULL OR reason IN ('expiry', 'damage', 'theft', 'correction', 'other')),
            reference_id TEXT,
            batch_number TEXT,
            notes TEXT,
            created_at DATETIME NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| {
        DatabaseError::MigrationError(format!("Failed to create stock_movements table: {}", e))
    })?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS stock_reconciliations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            sku TEXT NOT NULL,
            product_id INTEGER,
            variation_id INTEGER,
            reconciliation_date DATETIME NOT NULL,
            expected_quantity INTEGER NOT NULL,
            actual_quantity INTEGER NOT NULL,
            discrepancy INTEGER NOT NULL,
            notes TEXT,
            created_at DATETIME NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| {
        DatabaseError::MigrationError(format!(
            "Failed to create stock_reconciliations table: {}",
            e
        ))
    })?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS adjustment_metadata (
            movement_id INTEGER PRIMARY KEY,
            manual_sale BOOLEAN NOT NULL DEFAULT 0,
            loss_percentage REAL
                CHECK(loss_percentage IS NULL OR (loss_percentage >= 0 AND loss_percentage <= 100)),
            FOREIGN KEY (movement_id) REFERENCES stock_movements(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| {
        DatabaseError::MigrationError(format!(
            "Failed to create adjustment_metadata table: {}",
            e
        ))
    })?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sync_watermarks (
            sync_key TEXT PRIMARY KEY,
            last_synced_at DATETIME NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| {
        DatabaseError::MigrationError(format!("Failed to create sync_watermarks table: {}", e))
    })?;

    // Create indexes for better query performance
    for statement in [
        "CREATE INDEX IF NOT EXISTS idx_movements_sku ON stock_movements(sku)",
        "CREATE INDEX IF NOT EXISTS idx_movements_type ON stock_movements(movement_type)",
        "CREATE INDEX IF NOT EXISTS idx_movements_sale_key ON stock_movements(sku, reference_id, quantity)",
        "CREATE INDEX IF NOT EXISTS idx_reconciliations_sku_date ON stock_reconciliations(sku, reconciliation_date)",
    ] {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(|e| DatabaseError::MigrationError(format!("Failed to create index: {}", e)))?;
    }

    info!("✓ Database migrations completed successfully");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_database_init() {
        let pool = init_database("sqlite::memory:").await;
        assert!(pool.is_ok());
    }

    #[tokio::test]
    async fn test_migrations() {
        let pool = init_database("sqlite::memory:").await.unwrap();

        let result: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name IN \
             ('stock_movements', 'stock_reconciliations', 'adjustment_metadata', 'sync_watermarks')",
        )
        .fetch_one(&pool)
        .await
        .unwrap();

        assert_eq!(result.0, 4);
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let pool = init_database("sqlite::memory:").await.unwrap();
        assert!(run_migrations(&pool).await.is_ok());
    }

    #[test]
    fn test_database_error_maps_to_upstream() {
        let error: LedgerError = DatabaseError::QueryError("disk full".to_string()).into();
        assert!(matches!(error, LedgerError::Upstream(message) if message.contains("disk full")));
    }
}
