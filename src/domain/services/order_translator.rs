//! Order-to-Movement Translator
//!
//! Turns fulfilled storefront orders into `sale` movements. Ingestion is
//! idempotent: a line item already recorded under the same
//! `(sku, order number, quantity)` is never inserted twice.

use crate::domain::entities::movement::{MovementType, NewStockMovement};
use crate::domain::entities::order::Order;
use crate::domain::errors::LedgerResult;
use crate::domain::repositories::SyncWatermarkStore;
use crate::domain::services::bounded;
use crate::domain::services::movement_store::MovementStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Watermark key for incremental order ingestion
pub const SYNC_KEY: &str = "stock_movements";

/// What happened to a single order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderOutcome {
    /// Status does not contribute sales
    Skipped,
    Processed { inserted: usize, existing: usize },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderBatchResult {
    pub processed: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IncrementalSyncResult {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub errors: Vec<String>,
    /// Watermark in effect after the run
    pub last_processed_time: Option<DateTime<Utc>>,
}

pub struct OrderTranslator {
    store: Arc<MovementStore>,
    watermarks: Arc<dyn SyncWatermarkStore>,
}

impl OrderTranslator {
    pub fn new(store: Arc<MovementStore>, watermarks: Arc<dyn SyncWatermarkStore>) -> Self {
        Self { store, watermarks }
    }

    pub async fn process_order(&self, order: &Order) -> LedgerResult<OrderOutcome> {
        let exclude_on_hold = self.store.reader().exclude_on_hold_orders().await?;
        if !order.counts_as_sale(exclude_on_hold) {
            debug!(order = %order.number, status = ?order.status, "Order skipped");
            return Ok(OrderOutcome::Skipped);
        }

        let mut inserted = 0;
        let mut existing = 0;
        for item in order.line_items.iter().filter(|item| item.has_sku()) {
            let sku = item.ledger_sku();
            let quantity = item.sale_quantity()?;
            if self
                .store
                .find_sale(sku, &order.number, quantity)
                .await?
                .is_some()
            {
                existing += 1;
                continue;
            }

            let sale = NewStockMovement::new(sku, MovementType::Sale, quantity)
                .with_reference(order.number.clone())
                .with_date(order.sale_date())
                .with_product(item.product_id, item.variation_id);
            self.store.insert(sale).await?;
            inserted += 1;
        }

        if inserted > 0 {
            info!(order = %order.number, inserted, existing, "Order translated into sale movements");
        }
        Ok(OrderOutcome::Processed { inserted, existing })
    }

    /// Translate every order; failures are collected per order
    pub async fn process_orders(&self, orders: &[Order]) -> OrderBatchResult {
        let mut result = OrderBatchResult::default();
        for order in orders {
            match self.process_order(order).await {
                Ok(OrderOutcome::Processed { .. }) => result.processed += 1,
                Ok(OrderOutcome::Skipped) => {}
                Err(e) => {
                    warn!(order = %order.number, error = %e, "Failed to translate order");
                    result.failed += 1;
                    result.errors.push(format!("Order {}: {}", order.number, e));
                }
            }
        }
        result
    }

    /// Translate orders created after the last sync. The watermark only
    /// moves when something was processed or none existed yet.
    pub async fn process_new_orders(&self, orders: &[Order]) -> LedgerResult<IncrementalSyncResult> {
        let run_started = Utc::now();
        let timeout = self.store.reader().timeout();
        let watermark = bounded(timeout, "watermark read", self.watermarks.get_last_sync(SYNC_KEY)).await?;

        let mut result = IncrementalSyncResult {
            last_processed_time: watermark,
            ..Default::default()
        };
        for order in orders {
            if watermark.is_some_and(|mark| order.date_created <= mark) {
                result.skipped += 1;
                continue;
            }
            match self.process_order(order).await {
                Ok(OrderOutcome::Processed { .. }) => result.processed += 1,
                Ok(OrderOutcome::Skipped) => result.skipped += 1,
                Err(e) => {
                    warn!(order = %order.number, error = %e, "Failed to translate order");
                    result.failed += 1;
                    result.errors.push(format!("Order {}: {}", order.number, e));
                }
            }
        }

        if result.processed > 0 || watermark.is_none() {
            bounded(
                timeout,
                "watermark write",
                self.watermarks.set_last_sync(SYNC_KEY, run_started),
            )
            .await?;
            result.last_processed_time = Some(run_started);
        }

        info!(
            processed = result.processed,
            skipped = result.skipped,
            failed = result.failed,
            "Incremental order sync finished"
        );
        Ok(result)
    }
}
