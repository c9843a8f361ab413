use super::models::WatermarkRecord;
use super::{DatabaseError, DbPool};
use crate::domain::errors::LedgerResult;
use crate::domain::repositories::SyncWatermarkStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, error};

/// Incremental sync watermarks stored in `sync_watermarks`
pub struct SqliteWatermarkStore {
    pool: DbPool,
}

impl SqliteWatermarkStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SyncWatermarkStore for SqliteWatermarkStore {
    async fn get_last_sync(&self, key: &str) -> LedgerResult<Option<DateTime<Utc>>> {
        let record = sqlx::query_as::<_, WatermarkRecord>(
            "SELECT * FROM sync_watermarks WHERE sync_key = ?1",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to read watermark {}: {}", key, e);
            DatabaseError::QueryError(format!("Failed to read watermark: {}", e))
        })?;

        Ok(record.map(|r| r.last_synced_at))
    }

    async fn set_last_sync(&self, key: &str, timestamp: DateTime<Utc>) -> LedgerResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_watermarks (sync_key, last_synced_at)
            VALUES (?1, ?2)
            ON CONFLICT(sync_key) DO UPDATE SET last_synced_at = excluded.last_synced_at
            "#,
        )
        .bind(key)
        .bind(timestamp)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to write watermark {}: {}", key, e);
            DatabaseError::QueryError(format!("Failed to write watermark: {}", e))
        })?;

        debug!("Watermark {} set to {}", key, timestamp);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::init_database;

    #[tokio::test]
    async fn test_watermark_upsert() {
        let pool = init_database("sqlite::memory:").await.unwrap();
        let store = SqliteWatermarkStore::new(pool);
        assert!(store.get_last_sync("stock_movements").await.unwrap().is_none());

        let first = Utc::now() - chrono::Duration::hours(2);
        store.set_last_sync("stock_movements", first).await.unwrap();
        let second = Utc::now();
        store.set_last_sync("stock_movements", second).await.unwrap();

        let stored = store.get_last_sync("stock_movements").await.unwrap().unwrap();
        assert_eq!(stored.timestamp_micros(), second.timestamp_micros());
    }
}
