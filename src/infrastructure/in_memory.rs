//! In-memory collaborators
//!
//! Process-local implementations of the repository and source traits.
//! They back the unit and end-to-end tests and can be used to run the
//! engine without a storefront. Each can be switched into an "unavailable"
//! state to exercise upstream failure paths.

use crate::domain::entities::movement::{
    AdjustmentMetadata, MovementType, MovementUpdate, NewStockMovement, StockMovement,
};
use crate::domain::entities::order::Order;
use crate::domain::entities::product::{Product, Variation};
use crate::domain::entities::reconciliation::{NewStockReconciliation, StockReconciliation};
use crate::domain::errors::{LedgerError, LedgerResult};
use crate::domain::repositories::{
    InventorySource, MovementRepository, OrderSource, ReconciliationRepository,
    SyncWatermarkStore,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;

fn check_available(flag: &AtomicBool, what: &str) -> LedgerResult<()> {
    if flag.load(Ordering::SeqCst) {
        Err(LedgerError::upstream(format!("{} unavailable", what)))
    } else {
        Ok(())
    }
}

#[derive(Default)]
struct MovementTable {
    rows: Vec<StockMovement>,
    metadata: HashMap<i64, AdjustmentMetadata>,
    next_id: i64,
}

/// Movement ledger held in a vector
#[derive(Default)]
pub struct InMemoryMovementRepository {
    table: RwLock<MovementTable>,
    unavailable: AtomicBool,
    failing_inserts: AtomicBool,
    failing_deletes: RwLock<HashSet<i64>>,
}

impl InMemoryMovementRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make inserts fail while reads keep working
    pub fn set_fail_inserts(&self, fail: bool) {
        self.failing_inserts.store(fail, Ordering::SeqCst);
    }

    /// Make deletes of the given id fail
    pub async fn fail_delete_of(&self, id: i64) {
        self.failing_deletes.write().await.insert(id);
    }

    pub async fn len(&self) -> usize {
        self.table.read().await.rows.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl MovementRepository for InMemoryMovementRepository {
    async fn insert(&self, movement: &NewStockMovement) -> LedgerResult<StockMovement> {
        check_available(&self.unavailable, "movement store")?;
        check_available(&self.failing_inserts, "movement insert")?;
        let mut table = self.table.write().await;
        table.next_id += 1;
        let now = Utc::now();
        let record = StockMovement {
            id: table.next_id,
            sku: movement.sku.clone(),
            product_id: movement.product_id,
            variation_id: movement.variation_id,
            movement_date: movement.movement_date.unwrap_or(now),
            quantity: movement.quantity,
            movement_type: movement.movement_type,
            reason: movement.reason,
            reference_id: movement.reference_id.clone(),
            batch_number: movement.batch_number.clone(),
            notes: movement.notes.clone(),
            created_at: now,
        };
        if let Some(metadata) = &movement.metadata {
            table.metadata.insert(record.id, metadata.clone());
        }
        table.rows.push(record.clone());
        Ok(record)
    }

    async fn find_by_id(&self, id: i64) -> LedgerResult<Option<StockMovement>> {
        check_available(&self.unavailable, "movement store")?;
        let table = self.table.read().await;
        Ok(table.rows.iter().find(|m| m.id == id).cloned())
    }

    async fn find_by_sku(&self, sku: &str) -> LedgerResult<Vec<StockMovement>> {
        check_available(&self.unavailable, "movement store")?;
        let table = self.table.read().await;
        Ok(table.rows.iter().filter(|m| m.sku == sku).cloned().collect())
    }

    async fn find_by_type(&self, movement_type: MovementType) -> LedgerResult<Vec<StockMovement>> {
        check_available(&self.unavailable, "movement store")?;
        let table = self.table.read().await;
        Ok(table
            .rows
            .iter()
            .filter(|m| m.movement_type == movement_type)
            .cloned()
            .collect())
    }

    async fn find_all(&self) -> LedgerResult<Vec<StockMovement>> {
        check_available(&self.unavailable, "movement store")?;
        Ok(self.table.read().await.rows.clone())
    }

    async fn find_sale(
        &self,
        sku: &str,
        reference_id: &str,
        quantity: i64,
    ) -> LedgerResult<Option<StockMovement>> {
        check_available(&self.unavailable, "movement store")?;
        let table = self.table.read().await;
        Ok(table
            .rows
            .iter()
            .find(|m| {
                m.movement_type == MovementType::Sale
                    && m.sku == sku
                    && m.reference_id.as_deref() == Some(reference_id)
                    && m.quantity == quantity
            })
            .cloned())
    }

    async fn update_annotations(
        &self,
        id: i64,
        update: &MovementUpdate,
    ) -> LedgerResult<Option<StockMovement>> {
        check_available(&self.unavailable, "movement store")?;
        let mut table = self.table.write().await;
        let Some(row) = table.rows.iter_mut().find(|m| m.id == id) else {
            return Ok(None);
        };
        if let Some(notes) = &update.notes {
            row.notes = Some(notes.clone());
        }
        if let Some(reason) = update.reason {
            row.reason = Some(reason);
        }
        if let Some(batch) = &update.batch_number {
            row.batch_number = Some(batch.clone());
        }
        Ok(Some(row.clone()))
    }

    async fn delete(&self, id: i64) -> LedgerResult<bool> {
        check_available(&self.unavailable, "movement store")?;
        if self.failing_deletes.read().await.contains(&id) {
            return Err(LedgerError::upstream(format!("delete of movement {} rejected", id)));
        }
        let mut table = self.table.write().await;
        let before = table.rows.len();
        table.rows.retain(|m| m.id != id);
        table.metadata.remove(&id);
        Ok(table.rows.len() < before)
    }

    async fn find_metadata(&self, movement_id: i64) -> LedgerResult<Option<AdjustmentMetadata>> {
        check_available(&self.unavailable, "movement store")?;
        Ok(self.table.read().await.metadata.get(&movement_id).cloned())
    }
}

/// Reconciliation audit trail held in a vector
#[derive(Default)]
pub struct InMemoryReconciliationRepository {
    rows: RwLock<Vec<StockReconciliation>>,
    unavailable: AtomicBool,
}

impl InMemoryReconciliationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl ReconciliationRepository for InMemoryReconciliationRepository {
    async fn insert(&self, record: &NewStockReconciliation) -> LedgerResult<StockReconciliation> {
        check_available(&self.unavailable, "reconciliation store")?;
        let discrepancy = record.discrepancy()?;
        let mut rows = self.rows.write().await;
        let saved = StockReconciliation {
            id: rows.len() as i64 + 1,
            sku: record.sku.clone(),
            product_id: record.product_id,
            variation_id: record.variation_id,
            reconciliation_date: record.reconciliation_date,
            expected_quantity: record.expected_quantity,
            actual_quantity: record.actual_quantity,
            discrepancy,
            notes: record.notes.clone(),
            created_at: Utc::now(),
        };
        rows.push(saved.clone());
        Ok(saved)
    }

    async fn find_by_id(&self, id: i64) -> LedgerResult<Option<StockReconciliation>> {
        check_available(&self.unavailable, "reconciliation store")?;
        Ok(self.rows.read().await.iter().find(|r| r.id == id).cloned())
    }

    async fn find_latest(&self, sku: &str) -> LedgerResult<Option<StockReconciliation>> {
        Ok(self.find_by_sku(sku).await?.into_iter().next())
    }

    async fn find_by_sku(&self, sku: &str) -> LedgerResult<Vec<StockReconciliation>> {
        check_available(&self.unavailable, "reconciliation store")?;
        let mut matching: Vec<_> = self
            .rows
            .read()
            .await
            .iter()
            .filter(|r| r.sku == sku)
            .cloned()
            .collect();
        matching.sort_by(|a, b| {
            b.reconciliation_date
                .cmp(&a.reconciliation_date)
                .then(b.id.cmp(&a.id))
        });
        Ok(matching)
    }

    async fn update_notes(
        &self,
        id: i64,
        notes: Option<String>,
    ) -> LedgerResult<Option<StockReconciliation>> {
        check_available(&self.unavailable, "reconciliation store")?;
        let mut rows = self.rows.write().await;
        Ok(rows.iter_mut().find(|r| r.id == id).map(|row| {
            row.notes = notes;
            row.clone()
        }))
    }
}

/// Storefront stand-in: catalog, stock levels and orders
#[derive(Default)]
pub struct InMemoryCatalog {
    products: RwLock<Vec<Product>>,
    variations: RwLock<Vec<Variation>>,
    orders: RwLock<Vec<Order>>,
    failing_skus: RwLock<HashSet<String>>,
    unavailable: AtomicBool,
    lookups: AtomicUsize,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_product(&self, product: Product) {
        self.products.write().await.push(product);
    }

    pub async fn add_variation(&self, variation: Variation) {
        self.variations.write().await.push(variation);
    }

    pub async fn add_order(&self, order: Order) {
        self.orders.write().await.push(order);
    }

    /// Set the stock level reported for a product or variation SKU
    pub async fn set_stock(&self, sku: &str, quantity: i64) {
        let mut variations = self.variations.write().await;
        if let Some(v) = variations.iter_mut().find(|v| v.sku.as_deref() == Some(sku)) {
            v.stock_quantity = Some(quantity);
            return;
        }
        drop(variations);
        let mut products = self.products.write().await;
        if let Some(p) = products.iter_mut().find(|p| p.sku.as_deref() == Some(sku)) {
            p.stock_quantity = Some(quantity);
        }
    }

    /// Make every lookup of the SKU fail
    pub async fn fail_sku(&self, sku: &str) {
        self.failing_skus.write().await.insert(sku.to_string());
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of SKU lookups served so far
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    async fn check_sku(&self, sku: &str) -> LedgerResult<()> {
        check_available(&self.unavailable, "inventory source")?;
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.failing_skus.read().await.contains(sku) {
            return Err(LedgerError::upstream(format!("lookup of {} failed", sku)));
        }
        Ok(())
    }
}

#[async_trait]
impl InventorySource for InMemoryCatalog {
    async fn get_product_by_sku(&self, sku: &str) -> LedgerResult<Option<Product>> {
        self.check_sku(sku).await?;
        let products = self.products.read().await;
        Ok(products
            .iter()
            .find(|p| p.sku.as_deref() == Some(sku))
            .cloned())
    }

    async fn get_variation_by_sku(&self, sku: &str) -> LedgerResult<Option<Variation>> {
        self.check_sku(sku).await?;
        let variations = self.variations.read().await;
        Ok(variations
            .iter()
            .find(|v| v.sku.as_deref() == Some(sku))
            .cloned())
    }

    async fn get_product_name_by_id(&self, product_id: i64) -> LedgerResult<Option<String>> {
        check_available(&self.unavailable, "inventory source")?;
        let products = self.products.read().await;
        Ok(products
            .iter()
            .find(|p| p.id == product_id)
            .map(|p| p.name.clone()))
    }
}

#[async_trait]
impl OrderSource for InMemoryCatalog {
    async fn get_all_orders(&self) -> LedgerResult<Vec<Order>> {
        check_available(&self.unavailable, "order source")?;
        Ok(self.orders.read().await.clone())
    }
}

/// Watermarks held in a map
#[derive(Default)]
pub struct InMemoryWatermarkStore {
    marks: RwLock<HashMap<String, DateTime<Utc>>>,
}

impl InMemoryWatermarkStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SyncWatermarkStore for InMemoryWatermarkStore {
    async fn get_last_sync(&self, key: &str) -> LedgerResult<Option<DateTime<Utc>>> {
        Ok(self.marks.read().await.get(key).copied())
    }

    async fn set_last_sync(&self, key: &str, timestamp: DateTime<Utc>) -> LedgerResult<()> {
        self.marks.write().await.insert(key.to_string(), timestamp);
        Ok(())
    }
}
