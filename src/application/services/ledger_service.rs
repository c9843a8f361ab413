//! Stock Ledger Service
//!
//! Facade over the ledger components. Owns the summary cache and wires the
//! movement reader into every component that reads movements, so all of
//! them observe the same sale-source policy.

use crate::config::LedgerConfig;
use crate::domain::entities::movement::{
    AdjustmentMetadata, MovementType, MovementUpdate, NewStockMovement, StockMovement,
};
use crate::domain::entities::order::Order;
use crate::domain::entities::reconciliation::{StockReconciliation, StockReconciliationSummary};
use crate::domain::errors::LedgerResult;
use crate::domain::repositories::{
    InventorySource, MovementRepository, OrderSource, ReconciliationRepository, SettingsStore,
    SyncWatermarkStore,
};
use crate::domain::services::bounded;
use crate::domain::services::duplicate_cleaner::{CleanupResult, DuplicateCleaner};
use crate::domain::services::movement_reader::MovementReader;
use crate::domain::services::movement_store::MovementStore;
use crate::domain::services::order_translator::{
    IncrementalSyncResult, OrderBatchResult, OrderOutcome, OrderTranslator,
};
use crate::domain::services::reconciliation_executor::ReconciliationExecutor;
use crate::domain::services::summary_cache::{CacheStats, SummaryCache};
use crate::domain::services::summary_generator::{SummaryBatch, SummaryGenerator};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Collaborators the ledger is built from
#[derive(Clone)]
pub struct LedgerDependencies {
    pub movements: Arc<dyn MovementRepository>,
    pub reconciliations: Arc<dyn ReconciliationRepository>,
    pub inventory: Arc<dyn InventorySource>,
    pub orders: Arc<dyn OrderSource>,
    pub settings: Arc<dyn SettingsStore>,
    pub watermarks: Arc<dyn SyncWatermarkStore>,
}

pub struct StockLedgerService {
    orders: Arc<dyn OrderSource>,
    timeout: Duration,
    cache: Arc<SummaryCache>,
    store: Arc<MovementStore>,
    translator: OrderTranslator,
    generator: SummaryGenerator,
    executor: ReconciliationExecutor,
    cleaner: DuplicateCleaner,
}

impl StockLedgerService {
    pub fn new(deps: LedgerDependencies, config: &LedgerConfig) -> Self {
        let cache = Arc::new(SummaryCache::new(config.summary_cache_ttl()));
        Self::with_cache(deps, config, cache)
    }

    pub fn with_cache(
        deps: LedgerDependencies,
        config: &LedgerConfig,
        cache: Arc<SummaryCache>,
    ) -> Self {
        let timeout = config.store_timeout();
        let reader = Arc::new(MovementReader::new(
            deps.movements,
            deps.orders.clone(),
            deps.settings,
            timeout,
        ));
        let store = Arc::new(MovementStore::new(reader.clone(), cache.clone()));

        Self {
            orders: deps.orders,
            timeout,
            translator: OrderTranslator::new(store.clone(), deps.watermarks),
            generator: SummaryGenerator::new(
                reader.clone(),
                deps.reconciliations.clone(),
                deps.inventory.clone(),
                cache.clone(),
            )
            .with_batch_size(config.summary_batch_size),
            executor: ReconciliationExecutor::new(
                store.clone(),
                deps.reconciliations,
                deps.inventory,
                cache.clone(),
            ),
            cleaner: DuplicateCleaner::new(reader, cache.clone()),
            store,
            cache,
        }
    }

    // Movements

    pub async fn add_movement(&self, movement: NewStockMovement) -> LedgerResult<i64> {
        self.store.add_movement(movement).await
    }

    pub async fn get_movement(&self, id: i64) -> LedgerResult<StockMovement> {
        self.store.get_by_id(id).await
    }

    pub async fn get_movements_by_sku(&self, sku: &str) -> LedgerResult<Vec<StockMovement>> {
        self.store.get_by_sku(sku).await
    }

    pub async fn get_movements_by_type(
        &self,
        movement_type: MovementType,
    ) -> LedgerResult<Vec<StockMovement>> {
        self.store.get_by_type(movement_type).await
    }

    pub async fn get_all_movements(&self) -> LedgerResult<Vec<StockMovement>> {
        self.store.get_all().await
    }

    pub async fn update_movement(
        &self,
        id: i64,
        update: MovementUpdate,
    ) -> LedgerResult<StockMovement> {
        self.store.update(id, update).await
    }

    pub async fn delete_movement(&self, id: i64) -> LedgerResult<()> {
        self.store.delete(id).await
    }

    pub async fn get_adjustment_metadata(
        &self,
        movement_id: i64,
    ) -> LedgerResult<Option<AdjustmentMetadata>> {
        self.store.get_adjustment_metadata(movement_id).await
    }

    // Summaries

    pub async fn generate_summary(&self, sku: &str) -> StockReconciliationSummary {
        self.generator.generate_summary(sku).await
    }

    pub async fn generate_all_summaries(
        &self,
        force_refresh: bool,
    ) -> Vec<StockReconciliationSummary> {
        self.generator.generate_all_summaries(force_refresh).await
    }

    pub async fn refresh_skus(&self, skus: &[String]) -> SummaryBatch {
        self.generator.refresh_skus(skus).await
    }

    // Reconciliation

    pub async fn perform_reconciliation(
        &self,
        sku: &str,
        actual_quantity: i64,
        notes: Option<String>,
    ) -> LedgerResult<StockReconciliation> {
        self.executor
            .perform_reconciliation(sku, actual_quantity, notes)
            .await
    }

    pub async fn get_reconciliations(&self, sku: &str) -> LedgerResult<Vec<StockReconciliation>> {
        self.executor.get_reconciliations(sku).await
    }

    pub async fn get_latest_reconciliation(
        &self,
        sku: &str,
    ) -> LedgerResult<Option<StockReconciliation>> {
        self.executor.get_latest_reconciliation(sku).await
    }

    pub async fn update_reconciliation_notes(
        &self,
        id: i64,
        notes: Option<String>,
    ) -> LedgerResult<StockReconciliation> {
        self.executor.update_reconciliation_notes(id, notes).await
    }

    // Maintenance

    pub async fn cleanup_duplicates(&self, movement_type: MovementType) -> CleanupResult {
        self.cleaner.cleanup_duplicates(movement_type).await
    }

    pub async fn invalidate_cache(&self) {
        self.cache.invalidate().await
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    pub async fn summaries_computed_at(&self) -> Option<DateTime<Utc>> {
        self.cache.last_computed_at().await
    }

    // Order ingestion

    pub async fn process_order(&self, order: &Order) -> LedgerResult<OrderOutcome> {
        self.translator.process_order(order).await
    }

    pub async fn process_orders(&self, orders: &[Order]) -> OrderBatchResult {
        self.translator.process_orders(orders).await
    }

    pub async fn process_new_orders(&self, orders: &[Order]) -> LedgerResult<IncrementalSyncResult> {
        self.translator.process_new_orders(orders).await
    }

    /// Pull the order feed and ingest anything newer than the watermark
    pub async fn sync_new_orders(&self) -> LedgerResult<IncrementalSyncResult> {
        let orders = bounded(self.timeout, "order feed read", self.orders.get_all_orders()).await?;
        info!("Syncing {} orders from order source", orders.len());
        self.translator.process_new_orders(&orders).await
    }
}
