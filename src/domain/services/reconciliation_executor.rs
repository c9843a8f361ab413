//! Reconciliation Executor
//!
//! Records a manual stock count against the ledger and, when the count
//! disagrees with the folded total, appends a `correction` adjustment that
//! closes the gap. Reconciliations of the same SKU are serialized inside
//! the process.

use crate::domain::entities::movement::{AdjustmentReason, LedgerTotals, NewStockMovement};
use crate::domain::entities::reconciliation::{NewStockReconciliation, StockReconciliation};
use crate::domain::errors::{LedgerError, LedgerResult};
use crate::domain::repositories::{InventorySource, ReconciliationRepository};
use crate::domain::services::bounded;
use crate::domain::services::movement_store::MovementStore;
use crate::domain::services::summary_cache::SummaryCache;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const ENTITY: &str = "Stock reconciliation";

pub struct ReconciliationExecutor {
    store: Arc<MovementStore>,
    reconciliations: Arc<dyn ReconciliationRepository>,
    inventory: Arc<dyn InventorySource>,
    cache: Arc<SummaryCache>,
    sku_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ReconciliationExecutor {
    pub fn new(
        store: Arc<MovementStore>,
        reconciliations: Arc<dyn ReconciliationRepository>,
        inventory: Arc<dyn InventorySource>,
        cache: Arc<SummaryCache>,
    ) -> Self {
        Self {
            store,
            reconciliations,
            inventory,
            cache,
            sku_locks: Mutex::new(HashMap::new()),
        }
    }

    async fn lock_for(&self, sku: &str) -> Arc<Mutex<()>> {
        let mut locks = self.sku_locks.lock().await;
        locks
            .entry(sku.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Record `actual_quantity` for the SKU and correct the ledger to match
    pub async fn perform_reconciliation(
        &self,
        sku: &str,
        actual_quantity: i64,
        notes: Option<String>,
    ) -> LedgerResult<StockReconciliation> {
        let sku = sku.trim();
        if sku.is_empty() {
            return Err(LedgerError::validation("sku is required"));
        }

        let lock = self.lock_for(sku).await;
        let result = {
            let _guard = lock.lock().await;
            self.reconcile_locked(sku, actual_quantity, notes).await
        };
        self.release_lock(sku, lock).await;
        result
    }

    /// Drop the SKU's lock entry once no other reconciliation holds or waits on it
    async fn release_lock(&self, sku: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.sku_locks.lock().await;
        // one reference in the map, one here
        if Arc::strong_count(&lock) == 2 {
            locks.remove(sku);
        }
    }

    async fn reconcile_locked(
        &self,
        sku: &str,
        actual_quantity: i64,
        notes: Option<String>,
    ) -> LedgerResult<StockReconciliation> {
        let movements = self.store.get_by_sku(sku).await?;
        let expected_quantity = LedgerTotals::fold(&movements).expected_stock();
        let (product_id, variation_id) = self.resolve_ids(sku).await;

        let record = NewStockReconciliation {
            sku: sku.to_string(),
            product_id,
            variation_id,
            reconciliation_date: Utc::now(),
            expected_quantity,
            actual_quantity,
            notes,
        };
        record.discrepancy()?;

        let reconciliation = bounded(
            self.store.reader().timeout(),
            "reconciliation insert",
            self.reconciliations.insert(&record),
        )
        .await?;
        // the audit row changes last_reconciled even if the correction fails
        self.cache.invalidate().await;

        if reconciliation.discrepancy != 0 {
            let correction = NewStockMovement::adjustment(
                sku,
                reconciliation.discrepancy,
                AdjustmentReason::Correction,
            )
            .with_product(product_id, variation_id)
            .with_reference(reconciliation.id.to_string())
            .with_notes(format!(
                "Stock reconciliation #{} correction",
                reconciliation.id
            ));
            self.store.add_movement(correction).await?;
        }

        info!(
            id = reconciliation.id,
            sku = %sku,
            expected = expected_quantity,
            actual = actual_quantity,
            discrepancy = reconciliation.discrepancy,
            "Stock reconciliation recorded"
        );
        Ok(reconciliation)
    }

    /// Catalog ids for the SKU, products first. Lookup failures only cost
    /// the ids.
    async fn resolve_ids(&self, sku: &str) -> (Option<i64>, Option<i64>) {
        let timeout = self.store.reader().timeout();
        match bounded(timeout, "product lookup", self.inventory.get_product_by_sku(sku)).await {
            Ok(Some(product)) => return (Some(product.id), None),
            Ok(None) => {}
            Err(e) => {
                warn!(sku = %sku, error = %e, "Product lookup failed during reconciliation");
                return (None, None);
            }
        }
        match bounded(timeout, "variation lookup", self.inventory.get_variation_by_sku(sku)).await {
            Ok(Some(variation)) => (Some(variation.product_id), Some(variation.id)),
            Ok(None) => (None, None),
            Err(e) => {
                warn!(sku = %sku, error = %e, "Variation lookup failed during reconciliation");
                (None, None)
            }
        }
    }

    /// History for a SKU, newest first
    pub async fn get_reconciliations(&self, sku: &str) -> LedgerResult<Vec<StockReconciliation>> {
        bounded(
            self.store.reader().timeout(),
            "reconciliation history",
            self.reconciliations.find_by_sku(sku),
        )
        .await
    }

    pub async fn get_latest_reconciliation(
        &self,
        sku: &str,
    ) -> LedgerResult<Option<StockReconciliation>> {
        bounded(
            self.store.reader().timeout(),
            "latest reconciliation lookup",
            self.reconciliations.find_latest(sku),
        )
        .await
    }

    pub async fn update_reconciliation_notes(
        &self,
        id: i64,
        notes: Option<String>,
    ) -> LedgerResult<StockReconciliation> {
        let updated = bounded(
            self.store.reader().timeout(),
            "reconciliation notes update",
            self.reconciliations.update_notes(id, notes),
        )
        .await?
        .ok_or_else(|| LedgerError::not_found(ENTITY, id))?;
        self.cache.invalidate().await;

        debug!(id, sku = %updated.sku, "Reconciliation notes updated");
        Ok(updated)
    }
}
