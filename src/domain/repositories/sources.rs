//! External Source Traits
//!
//! Collaborators the ledger consumes but does not own: the storefront's
//! catalog and order feed, the settings store and the sync watermark store.

use crate::domain::entities::order::Order;
use crate::domain::entities::product::{Product, Variation};
use crate::domain::errors::LedgerResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Catalog and stock-level lookups
#[async_trait]
pub trait InventorySource: Send + Sync {
    async fn get_product_by_sku(&self, sku: &str) -> LedgerResult<Option<Product>>;

    async fn get_variation_by_sku(&self, sku: &str) -> LedgerResult<Option<Variation>>;

    async fn get_product_name_by_id(&self, product_id: i64) -> LedgerResult<Option<String>>;

    /// Real stock count. Variation stock wins over product stock; a SKU
    /// known to neither reports 0.
    async fn get_actual_stock_by_sku(&self, sku: &str) -> LedgerResult<i64> {
        if let Some(stock) = self
            .get_variation_by_sku(sku)
            .await?
            .and_then(|variation| variation.stock_quantity)
        {
            return Ok(stock);
        }
        Ok(self
            .get_product_by_sku(sku)
            .await?
            .and_then(|product| product.stock_quantity)
            .unwrap_or(0))
    }
}

/// Order feed
#[async_trait]
pub trait OrderSource: Send + Sync {
    async fn get_all_orders(&self) -> LedgerResult<Vec<Order>>;
}

/// Application settings consulted by the ledger
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// When set, sales are derived from orders on read and on-hold orders
    /// never contribute
    async fn exclude_on_hold_orders(&self) -> LedgerResult<bool>;
}

/// Timestamps of the last successful incremental sync, by key
#[async_trait]
pub trait SyncWatermarkStore: Send + Sync {
    async fn get_last_sync(&self, key: &str) -> LedgerResult<Option<DateTime<Utc>>>;

    async fn set_last_sync(&self, key: &str, timestamp: DateTime<Utc>) -> LedgerResult<()>;
}
