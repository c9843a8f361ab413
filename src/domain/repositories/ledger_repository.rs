//! Ledger Repository Traits
//!
//! Storage seams for the movement ledger and the reconciliation audit
//! trail. The SQLite implementations live in `crate::persistence`; tests
//! use the in-memory implementations from `crate::infrastructure`.

use crate::domain::entities::movement::{
    AdjustmentMetadata, MovementType, MovementUpdate, NewStockMovement, StockMovement,
};
use crate::domain::entities::reconciliation::{NewStockReconciliation, StockReconciliation};
use crate::domain::errors::LedgerResult;
use async_trait::async_trait;

/// Durable access to individual movement rows
#[async_trait]
pub trait MovementRepository: Send + Sync {
    /// Append a movement (and its adjustment metadata, if any)
    async fn insert(&self, movement: &NewStockMovement) -> LedgerResult<StockMovement>;

    async fn find_by_id(&self, id: i64) -> LedgerResult<Option<StockMovement>>;

    async fn find_by_sku(&self, sku: &str) -> LedgerResult<Vec<StockMovement>>;

    async fn find_by_type(&self, movement_type: MovementType) -> LedgerResult<Vec<StockMovement>>;

    async fn find_all(&self) -> LedgerResult<Vec<StockMovement>>;

    /// Look up a persisted sale by its idempotency key
    async fn find_sale(
        &self,
        sku: &str,
        reference_id: &str,
        quantity: i64,
    ) -> LedgerResult<Option<StockMovement>>;

    /// Edit annotation fields. Returns `None` when the id is unknown.
    async fn update_annotations(
        &self,
        id: i64,
        update: &MovementUpdate,
    ) -> LedgerResult<Option<StockMovement>>;

    /// Returns whether a row was removed
    async fn delete(&self, id: i64) -> LedgerResult<bool>;

    async fn find_metadata(&self, movement_id: i64) -> LedgerResult<Option<AdjustmentMetadata>>;
}

/// Append-mostly store for reconciliation audit records
#[async_trait]
pub trait ReconciliationRepository: Send + Sync {
    async fn insert(&self, record: &NewStockReconciliation) -> LedgerResult<StockReconciliation>;

    async fn find_by_id(&self, id: i64) -> LedgerResult<Option<StockReconciliation>>;

    /// Most recent reconciliation for the SKU
    async fn find_latest(&self, sku: &str) -> LedgerResult<Option<StockReconciliation>>;

    /// All reconciliations for the SKU, newest first
    async fn find_by_sku(&self, sku: &str) -> LedgerResult<Vec<StockReconciliation>>;

    /// Returns `None` when the id is unknown
    async fn update_notes(
        &self,
        id: i64,
        notes: Option<String>,
    ) -> LedgerResult<Option<StockReconciliation>>;
}
