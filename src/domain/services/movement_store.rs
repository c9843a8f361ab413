//! Movement Store
//!
//! Append/read access to the movement ledger. Every write invalidates the
//! summary cache; reads go through the [`MovementReader`] policy layer.

use crate::domain::entities::movement::{
    AdjustmentMetadata, MovementType, MovementUpdate, NewStockMovement, StockMovement,
};
use crate::domain::errors::{LedgerError, LedgerResult};
use crate::domain::services::bounded;
use crate::domain::services::movement_reader::MovementReader;
use crate::domain::services::summary_cache::SummaryCache;
use std::sync::Arc;
use tracing::{debug, info};

const ENTITY: &str = "Stock movement";

pub struct MovementStore {
    reader: Arc<MovementReader>,
    cache: Arc<SummaryCache>,
}

impl MovementStore {
    pub fn new(reader: Arc<MovementReader>, cache: Arc<SummaryCache>) -> Self {
        Self { reader, cache }
    }

    pub fn reader(&self) -> &Arc<MovementReader> {
        &self.reader
    }

    /// Append a movement and return its id
    pub async fn add_movement(&self, movement: NewStockMovement) -> LedgerResult<i64> {
        Ok(self.insert(movement).await?.id)
    }

    /// Append a movement and return the stored row
    pub async fn insert(&self, mut movement: NewStockMovement) -> LedgerResult<StockMovement> {
        movement.validate()?;
        movement.sku = movement.sku.trim().to_string();

        let stored = bounded(
            self.reader.timeout(),
            "movement insert",
            self.reader.repository().insert(&movement),
        )
        .await?;
        self.cache.invalidate().await;

        debug!(
            id = stored.id,
            sku = %stored.sku,
            movement_type = %stored.movement_type,
            quantity = stored.quantity,
            "Stock movement recorded"
        );
        Ok(stored)
    }

    pub async fn get_by_sku(&self, sku: &str) -> LedgerResult<Vec<StockMovement>> {
        self.reader.read_by_sku(sku).await
    }

    pub async fn get_by_type(&self, movement_type: MovementType) -> LedgerResult<Vec<StockMovement>> {
        self.reader.read_by_type(movement_type).await
    }

    pub async fn get_all(&self) -> LedgerResult<Vec<StockMovement>> {
        self.reader.read_all().await
    }

    /// Persisted row by id. Sales derived from orders have no row.
    pub async fn get_by_id(&self, id: i64) -> LedgerResult<StockMovement> {
        bounded(
            self.reader.timeout(),
            "movement lookup",
            self.reader.repository().find_by_id(id),
        )
        .await?
        .ok_or_else(|| LedgerError::not_found(ENTITY, id))
    }

    /// Edit the annotation fields of a movement
    pub async fn update(&self, id: i64, update: MovementUpdate) -> LedgerResult<StockMovement> {
        if update.is_empty() {
            return self.get_by_id(id).await;
        }
        let updated = bounded(
            self.reader.timeout(),
            "movement update",
            self.reader.repository().update_annotations(id, &update),
        )
        .await?
        .ok_or_else(|| LedgerError::not_found(ENTITY, id))?;
        self.cache.invalidate().await;

        info!(id, sku = %updated.sku, "Stock movement annotations updated");
        Ok(updated)
    }

    pub async fn delete(&self, id: i64) -> LedgerResult<()> {
        let removed = bounded(
            self.reader.timeout(),
            "movement delete",
            self.reader.repository().delete(id),
        )
        .await?;
        if !removed {
            return Err(LedgerError::not_found(ENTITY, id));
        }
        self.cache.invalidate().await;

        info!(id, "Stock movement deleted");
        Ok(())
    }

    pub async fn get_adjustment_metadata(&self, id: i64) -> LedgerResult<Option<AdjustmentMetadata>> {
        bounded(
            self.reader.timeout(),
            "adjustment metadata lookup",
            self.reader.repository().find_metadata(id),
        )
        .await
    }

    /// Persisted sale matching the idempotency key, if any
    pub async fn find_sale(
        &self,
        sku: &str,
        reference_id: &str,
        quantity: i64,
    ) -> LedgerResult<Option<StockMovement>> {
        bounded(
            self.reader.timeout(),
            "sale lookup",
            self.reader.repository().find_sale(sku, reference_id, quantity),
        )
        .await
    }
}
