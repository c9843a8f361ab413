//! Reconciliation Repository
//!
//! Audit trail of manual stock counts. Rows are never deleted; only
//! `notes` may change after insertion.

use super::models::ReconciliationRecord;
use super::{DatabaseError, DbPool};
use crate::domain::entities::reconciliation::{NewStockReconciliation, StockReconciliation};
use crate::domain::errors::LedgerResult;
use crate::domain::repositories::ReconciliationRepository;
use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, error};

pub struct SqliteReconciliationRepository {
    pool: DbPool,
}

impl SqliteReconciliationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReconciliationRepository for SqliteReconciliationRepository {
    async fn insert(&self, record: &NewStockReconciliation) -> LedgerResult<StockReconciliation> {
        let discrepancy = record.discrepancy()?;
        let saved = sqlx::query_as::<_, ReconciliationRecord>(
            r#"
            INSERT INTO stock_reconciliations (
                sku, product_id, variation_id, reconciliation_date,
                expected_quantity, actual_quantity, discrepancy, notes, created_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            RETURNING *
            "#,
        )
        .bind(&record.sku)
        .bind(record.product_id)
        .bind(record.variation_id)
        .bind(record.reconciliation_date)
        .bind(record.expected_quantity)
        .bind(record.actual_quantity)
        .bind(discrepancy)
        .bind(&record.notes)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to insert reconciliation for {}: {}", record.sku, e);
            DatabaseError::QueryError(format!("Failed to insert reconciliation: {}", e))
        })?;

        debug!("Inserted reconciliation: {} for {}", saved.id, saved.sku);
        Ok(saved.into())
    }

    async fn find_by_id(&self, id: i64) -> LedgerResult<Option<StockReconciliation>> {
        let record = sqlx::query_as::<_, ReconciliationRecord>(
            "SELECT * FROM stock_reconciliations WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to get reconciliation {}: {}", id, e);
            DatabaseError::QueryError(format!("Failed to get reconciliation: {}", e))
        })?;

        Ok(record.map(Into::into))
    }

    async fn find_latest(&self, sku: &str) -> LedgerResult<Option<StockReconciliation>> {
        let record = sqlx::query_as::<_, ReconciliationRecord>(
            r#"
            SELECT * FROM stock_reconciliations
            WHERE sku = ?1
            ORDER BY reconciliation_date DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(sku)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to get latest reconciliation for {}: {}", sku, e);
            DatabaseError::QueryError(format!("Failed to get latest reconciliation: {}", e))
        })?;

        Ok(record.map(Into::into))
    }

    async fn find_by_sku(&self, sku: &str) -> LedgerResult<Vec<StockReconciliation>> {
        let records = sqlx::query_as::<_, ReconciliationRecord>(
            r#"
            SELECT * FROM stock_reconciliations
            WHERE sku = ?1
            ORDER BY reconciliation_date DESC, id DESC
            "#,
        )
        .bind(sku)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to get reconciliations for {}: {}", sku, e);
            DatabaseError::QueryError(format!("Failed to get reconciliations: {}", e))
        })?;

        Ok(records.into_iter().map(Into::into).collect())
    }

    async fn update_notes(
        &self,
        id: i64,
        notes: Option<String>,
    ) -> LedgerResult<Option<StockReconciliation>> {
        let record = sqlx::query_as::<_, ReconciliationRecord>(
            "UPDATE stock_reconciliations SET notes = ?1 WHERE id = ?2 RETURNING *",
        )
        .bind(notes)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to update reconciliation {}: {}", id, e);
            DatabaseError::QueryError(format!("Failed to update reconciliation: {}", e))
        })?;

        Ok(record.map(Into::into))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::init_database;
    use chrono::Duration;

    fn count(sku: &str, expected: i64, actual: i64) -> NewStockReconciliation {
        NewStockReconciliation {
            sku: sku.to_string(),
            product_id: Some(1),
            variation_id: None,
            reconciliation_date: Utc::now(),
            expected_quantity: expected,
            actual_quantity: actual,
            notes: None,
        }
    }

    #[tokio::test]
    async fn test_insert_computes_discrepancy() {
        let pool = init_database("sqlite::memory:").await.unwrap();
        let repo = SqliteReconciliationRepository::new(pool);

        let saved = repo.insert(&count("A", 85, 80)).await.unwrap();
        assert_eq!(saved.discrepancy, -5);
        let found = repo.find_by_id(saved.id).await.unwrap().unwrap();
        assert_eq!(found.expected_quantity, 85);
        assert_eq!(found.product_id, Some(1));
    }

    #[tokio::test]
    async fn test_history_is_newest_first() {
        let pool = init_database("sqlite::memory:").await.unwrap();
        let repo = SqliteReconciliationRepository::new(pool);

        let mut older = count("A", 10, 10);
        older.reconciliation_date = Utc::now() - Duration::days(3);
        let older = repo.insert(&older).await.unwrap();
        let newer = repo.insert(&count("A", 10, 9)).await.unwrap();
        repo.insert(&count("B", 1, 1)).await.unwrap();

        let history = repo.find_by_sku("A").await.unwrap();
        assert_eq!(
            history.iter().map(|r| r.id).collect::<Vec<_>>(),
            vec![newer.id, older.id]
        );
        assert_eq!(repo.find_latest("A").await.unwrap().unwrap().id, newer.id);
        assert!(repo.find_latest("C").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_notes() {
        let pool = init_database("sqlite::memory:").await.unwrap();
        let repo = SqliteReconciliationRepository::new(pool);
        let saved = repo.insert(&count("A", 1, 2)).await.unwrap();

        let updated = repo
            .update_notes(saved.id, Some("found a box".to_string()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.notes.as_deref(), Some("found a box"));
        assert!(repo.update_notes(999, None).await.unwrap().is_none());
    }
}
