//! Movement Repository
//!
//! SQLite-backed movement ledger. Adjustment metadata is written in the
//! same transaction as its movement.

use super::models::{AdjustmentMetadataRecord, MovementRecord};
use super::{DatabaseError, DbPool};
use crate::domain::entities::movement::{
    AdjustmentMetadata, MovementType, MovementUpdate, NewStockMovement, StockMovement,
};
use crate::domain::errors::LedgerResult;
use crate::domain::repositories::MovementRepository;
use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, error};

pub struct SqliteMovementRepository {
    pool: DbPool,
}

impl SqliteMovementRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn into_movements(records: Vec<MovementRecord>) -> LedgerResult<Vec<StockMovement>> {
        records
            .into_iter()
            .map(|record| StockMovement::try_from(record).map_err(Into::into))
            .collect()
    }
}

#[async_trait]
impl MovementRepository for SqliteMovementRepository {
    async fn insert(&self, movement: &NewStockMovement) -> LedgerResult<StockMovement> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(|e| {
            error!("Failed to begin movement transaction: {}", e);
            DatabaseError::QueryError(format!("Failed to begin transaction: {}", e))
        })?;

        let record = sqlx::query_as::<_, MovementRecord>(
            r#"
            INSERT INTO stock_movements (
                sku, product_id, variation_id, movement_date, quantity,
                movement_type, reason, reference_id, batch_number, notes, created_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            RETURNING *
            "#,
        )
        .bind(&movement.sku)
        .bind(movement.product_id)
        .bind(movement.variation_id)
        .bind(movement.movement_date.unwrap_or(now))
        .bind(movement.quantity)
        .bind(movement.movement_type.as_str())
        .bind(movement.reason.map(|r| r.as_str()))
        .bind(&movement.reference_id)
        .bind(&movement.batch_number)
        .bind(&movement.notes)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            error!("Failed to insert movement for {}: {}", movement.sku, e);
            DatabaseError::QueryError(format!("Failed to insert movement: {}", e))
        })?;

        if let Some(metadata) = &movement.metadata {
            sqlx::query(
                "INSERT INTO adjustment_metadata (movement_id, manual_sale, loss_percentage) VALUES (?1, ?2, ?3)",
            )
            .bind(record.id)
            .bind(metadata.manual_sale)
            .bind(metadata.loss_percentage)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                error!("Failed to insert metadata for movement {}: {}", record.id, e);
                DatabaseError::QueryError(format!("Failed to insert adjustment metadata: {}", e))
            })?;
        }

        tx.commit().await.map_err(|e| {
            error!("Failed to commit movement {}: {}", record.id, e);
            DatabaseError::QueryError(format!("Failed to commit movement: {}", e))
        })?;

        debug!("Inserted movement: {} for {}", record.id, record.sku);
        Ok(StockMovement::try_from(record)?)
    }

    async fn find_by_id(&self, id: i64) -> LedgerResult<Option<StockMovement>> {
        let record =
            sqlx::query_as::<_, MovementRecord>("SELECT * FROM stock_movements WHERE id = ?1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| {
                    error!("Failed to get movement {}: {}", id, e);
                    DatabaseError::QueryError(format!("Failed to get movement: {}", e))
                })?;

        Ok(record.map(StockMovement::try_from).transpose()?)
    }

    async fn find_by_sku(&self, sku: &str) -> LedgerResult<Vec<StockMovement>> {
        let records = sqlx::query_as::<_, MovementRecord>(
            "SELECT * FROM stock_movements WHERE sku = ?1 ORDER BY movement_date ASC, id ASC",
        )
        .bind(sku)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to get movements for {}: {}", sku, e);
            DatabaseError::QueryError(format!("Failed to get movements: {}", e))
        })?;

        Self::into_movements(records)
    }

    async fn find_by_type(&self, movement_type: MovementType) -> LedgerResult<Vec<StockMovement>> {
        let records = sqlx::query_as::<_, MovementRecord>(
            "SELECT * FROM stock_movements WHERE movement_type = ?1 ORDER BY movement_date ASC, id ASC",
        )
        .bind(movement_type.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to get {} movements: {}", movement_type, e);
            DatabaseError::QueryError(format!("Failed to get movements: {}", e))
        })?;

        Self::into_movements(records)
    }

    async fn find_all(&self) -> LedgerResult<Vec<StockMovement>> {
        let records = sqlx::query_as::<_, MovementRecord>(
            "SELECT * FROM stock_movements ORDER BY movement_date ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to get movements: {}", e);
            DatabaseError::QueryError(format!("Failed to get movements: {}", e))
        })?;

        Self::into_movements(records)
    }

    async fn find_sale(
        &self,
        sku: &str,
        reference_id: &str,
        quantity: i64,
    ) -> LedgerResult<Option<StockMovement>> {
        let record = sqlx::query_as::<_, MovementRecord>(
            r#"
            SELECT * FROM stock_movements
            WHERE sku = ?1 AND movement_type = 'sale' AND reference_id = ?2 AND quantity = ?3
            ORDER BY id ASC
            LIMIT 1
            "#,
        )
        .bind(sku)
        .bind(reference_id)
        .bind(quantity)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to look up sale {} for {}: {}", reference_id, sku, e);
            DatabaseError::QueryError(format!("Failed to look up sale: {}", e))
        })?;

        Ok(record.map(StockMovement::try_from).transpose()?)
    }

    async fn update_annotations(
        &self,
        id: i64,
        update: &MovementUpdate,
    ) -> LedgerResult<Option<StockMovement>> {
        let record = sqlx::query_as::<_, MovementRecord>(
            r#"
            UPDATE stock_movements
            SET notes = COALESCE(?1, notes),
                reason = COALESCE(?2, reason),
                batch_number = COALESCE(?3, batch_number)
            WHERE id = ?4
            RETURNING *
            "#,
        )
        .bind(&update.notes)
        .bind(update.reason.map(|r| r.as_str()))
        .bind(&update.batch_number)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to update movement {}: {}", id, e);
            DatabaseError::QueryError(format!("Failed to update movement: {}", e))
        })?;

        debug!("Updated movement annotations: {}", id);
        Ok(record.map(StockMovement::try_from).transpose()?)
    }

    async fn delete(&self, id: i64) -> LedgerResult<bool> {
        let rows_affected = sqlx::query("DELETE FROM stock_movements WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to delete movement {}: {}", id, e);
                DatabaseError::QueryError(format!("Failed to delete movement: {}", e))
            })?
            .rows_affected();

        debug!("Deleted movement {} ({} rows)", id, rows_affected);
        Ok(rows_affected > 0)
    }

    async fn find_metadata(&self, movement_id: i64) -> LedgerResult<Option<AdjustmentMetadata>> {
        let record = sqlx::query_as::<_, AdjustmentMetadataRecord>(
            "SELECT * FROM adjustment_metadata WHERE movement_id = ?1",
        )
        .bind(movement_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to get metadata for movement {}: {}", movement_id, e);
            DatabaseError::QueryError(format!("Failed to get adjustment metadata: {}", e))
        })?;

        Ok(record.map(AdjustmentMetadata::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::movement::AdjustmentReason;
    use crate::persistence::init_database;

    async fn repository() -> SqliteMovementRepository {
        let pool = init_database("sqlite::memory:").await.unwrap();
        SqliteMovementRepository::new(pool)
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let repo = repository().await;
        let stored = repo
            .insert(
                &NewStockMovement::new("SKU-1", MovementType::Sale, -3)
                    .with_reference("1001")
                    .with_product(Some(7), None),
            )
            .await
            .unwrap();
        assert!(stored.id > 0);
        assert_eq!(stored.movement_type, MovementType::Sale);

        let found = repo.find_by_id(stored.id).await.unwrap().unwrap();
        assert_eq!(found.sku, "SKU-1");
        assert_eq!(found.quantity, -3);
        assert_eq!(found.product_id, Some(7));
        assert_eq!(found.reference_id.as_deref(), Some("1001"));

        assert!(repo.find_by_id(stored.id + 100).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_find_by_sku_and_type() {
        let repo = repository().await;
        repo.insert(&NewStockMovement::new("A", MovementType::Initial, 10))
            .await
            .unwrap();
        repo.insert(&NewStockMovement::new("A", MovementType::Purchase, 4))
            .await
            .unwrap();
        repo.insert(&NewStockMovement::new("B", MovementType::Purchase, 6))
            .await
            .unwrap();

        assert_eq!(repo.find_by_sku("A").await.unwrap().len(), 2);
        assert_eq!(repo.find_by_type(MovementType::Purchase).await.unwrap().len(), 2);
        assert_eq!(repo.find_all().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_find_sale_matches_full_key() {
        let repo = repository().await;
        repo.insert(&NewStockMovement::new("A", MovementType::Sale, -2).with_reference("500"))
            .await
            .unwrap();

        assert!(repo.find_sale("A", "500", -2).await.unwrap().is_some());
        assert!(repo.find_sale("A", "500", -3).await.unwrap().is_none());
        assert!(repo.find_sale("A", "501", -2).await.unwrap().is_none());
        assert!(repo.find_sale("B", "500", -2).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_annotations_keeps_unset_fields() {
        let repo = repository().await;
        let stored = repo
            .insert(
                &NewStockMovement::adjustment("A", -1, AdjustmentReason::Other).with_batch("B-7"),
            )
            .await
            .unwrap();

        let updated = repo
            .update_annotations(
                stored.id,
                &MovementUpdate {
                    notes: Some("broken on arrival".to_string()),
                    reason: Some(AdjustmentReason::Damage),
                    batch_number: None,
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.notes.as_deref(), Some("broken on arrival"));
        assert_eq!(updated.reason, Some(AdjustmentReason::Damage));
        assert_eq!(updated.batch_number.as_deref(), Some("B-7"));
        assert_eq!(updated.quantity, -1);

        let missing = repo
            .update_annotations(999, &MovementUpdate::default())
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_metadata_round_trip_and_cascade() {
        let repo = repository().await;
        let stored = repo
            .insert(
                &NewStockMovement::adjustment("A", -4, AdjustmentReason::Expiry).with_metadata(
                    AdjustmentMetadata {
                        manual_sale: false,
                        loss_percentage: Some(25.0),
                    },
                ),
            )
            .await
            .unwrap();

        let metadata = repo.find_metadata(stored.id).await.unwrap().unwrap();
        assert_eq!(metadata.loss_percentage, Some(25.0));
        assert!(!metadata.manual_sale);

        assert!(repo.delete(stored.id).await.unwrap());
        assert!(!repo.delete(stored.id).await.unwrap());
        assert!(repo.find_metadata(stored.id).await.unwrap().is_none());
    }
}
