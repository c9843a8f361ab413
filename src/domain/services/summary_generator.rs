//! Summary Generator
//!
//! Folds a SKU's movements into expected stock and compares it against the
//! storefront's actual count. Single-SKU generation never fails: any error
//! is rendered into a zeroed summary named `Error: <message>`.

use crate::domain::entities::movement::LedgerTotals;
use crate::domain::entities::product::unknown_product_name;
use crate::domain::entities::reconciliation::StockReconciliationSummary;
use crate::domain::errors::LedgerResult;
use crate::domain::repositories::{InventorySource, ReconciliationRepository};
use crate::domain::services::bounded;
use crate::domain::services::movement_reader::MovementReader;
use crate::domain::services::summary_cache::SummaryCache;
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Concurrent computations per batch
pub const DEFAULT_BATCH_SIZE: usize = 5;

/// Outcome of a multi-SKU computation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SummaryBatch {
    pub summaries: Vec<StockReconciliationSummary>,
    pub errors: Vec<String>,
}

/// Display name and catalog ids resolved for a SKU
struct ResolvedProduct {
    name: String,
    product_id: Option<i64>,
    variation_id: Option<i64>,
}

pub struct SummaryGenerator {
    reader: Arc<MovementReader>,
    reconciliations: Arc<dyn ReconciliationRepository>,
    inventory: Arc<dyn InventorySource>,
    cache: Arc<SummaryCache>,
    batch_size: usize,
}

impl SummaryGenerator {
    pub fn new(
        reader: Arc<MovementReader>,
        reconciliations: Arc<dyn ReconciliationRepository>,
        inventory: Arc<dyn InventorySource>,
        cache: Arc<SummaryCache>,
    ) -> Self {
        Self {
            reader,
            reconciliations,
            inventory,
            cache,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    fn timeout(&self) -> Duration {
        self.reader.timeout()
    }

    /// Summary for one SKU. Failures degrade to an `Error:` summary.
    pub async fn generate_summary(&self, sku: &str) -> StockReconciliationSummary {
        match self.try_generate_summary(sku).await {
            Ok(summary) => summary,
            Err(e) => {
                warn!(sku = %sku, error = %e, "Summary generation failed");
                StockReconciliationSummary::degraded(sku, format!("Error: {}", e))
            }
        }
    }

    pub async fn try_generate_summary(&self, sku: &str) -> LedgerResult<StockReconciliationSummary> {
        let movements = self.reader.read_by_sku(sku).await?;
        let totals = LedgerTotals::fold(&movements);

        let latest = bounded(
            self.timeout(),
            "latest reconciliation lookup",
            self.reconciliations.find_latest(sku),
        )
        .await?;
        let actual_stock = bounded(
            self.timeout(),
            "actual stock lookup",
            self.inventory.get_actual_stock_by_sku(sku),
        )
        .await?;
        let product = self.resolve_product(sku).await;

        let mut summary =
            StockReconciliationSummary::from_totals(sku, product.name, totals, actual_stock);
        summary.product_id = product.product_id;
        summary.variation_id = product.variation_id;
        summary.last_reconciled = latest.map(|r| r.reconciliation_date);

        debug!(
            sku = %sku,
            movements = movements.len(),
            expected = summary.expected_stock,
            actual = summary.actual_stock,
            "Summary computed"
        );
        Ok(summary)
    }

    /// A failed catalog lookup only costs the display name
    async fn resolve_product(&self, sku: &str) -> ResolvedProduct {
        match self.lookup_product(sku).await {
            Ok(Some(product)) => product,
            Ok(None) => ResolvedProduct {
                name: unknown_product_name(sku),
                product_id: None,
                variation_id: None,
            },
            Err(e) => {
                warn!(sku = %sku, error = %e, "Product name lookup failed");
                ResolvedProduct {
                    name: unknown_product_name(sku),
                    product_id: None,
                    variation_id: None,
                }
            }
        }
    }

    async fn lookup_product(&self, sku: &str) -> LedgerResult<Option<ResolvedProduct>> {
        let variation = bounded(
            self.timeout(),
            "variation lookup",
            self.inventory.get_variation_by_sku(sku),
        )
        .await?;
        if let Some(variation) = variation {
            let parent = bounded(
                self.timeout(),
                "parent name lookup",
                self.inventory.get_product_name_by_id(variation.product_id),
            )
            .await?;
            let name = match parent {
                Some(parent) => variation.display_name(&parent),
                None => unknown_product_name(sku),
            };
            return Ok(Some(ResolvedProduct {
                name,
                product_id: Some(variation.product_id),
                variation_id: Some(variation.id),
            }));
        }

        let product = bounded(
            self.timeout(),
            "product lookup",
            self.inventory.get_product_by_sku(sku),
        )
        .await?;
        Ok(product.map(|product| ResolvedProduct {
            name: product.name,
            product_id: Some(product.id),
            variation_id: None,
        }))
    }

    /// Compute summaries in sequential batches of `batch_size` concurrent
    /// computations, collecting per-SKU failures
    pub async fn generate_batch(&self, skus: &[String]) -> SummaryBatch {
        let mut batch = SummaryBatch::default();
        for chunk in skus.chunks(self.batch_size) {
            let results = join_all(chunk.iter().map(|sku| self.try_generate_summary(sku))).await;
            for (sku, result) in chunk.iter().zip(results) {
                match result {
                    Ok(summary) => batch.summaries.push(summary),
                    Err(e) => {
                        warn!(sku = %sku, error = %e, "Skipping SKU in batch summary");
                        batch.errors.push(format!("{}: {}", sku, e));
                    }
                }
            }
        }
        batch
    }

    /// Every ledger SKU, served from the cache while fresh
    pub async fn generate_all_summaries(&self, force_refresh: bool) -> Vec<StockReconciliationSummary> {
        self.cache
            .get_or_compute(force_refresh, || self.compute_all())
            .await
    }

    async fn compute_all(&self) -> LedgerResult<Vec<StockReconciliationSummary>> {
        let skus: Vec<String> = self
            .reader
            .read_all()
            .await?
            .into_iter()
            .map(|m| m.sku)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let batch = self.generate_batch(&skus).await;
        info!(
            skus = skus.len(),
            computed = batch.summaries.len(),
            errors = batch.errors.len(),
            "Computed summaries for all ledger SKUs"
        );
        self.cache.record_errors(batch.errors).await;
        Ok(batch.summaries)
    }

    /// Recompute the listed SKUs and patch them into a populated cache.
    /// An empty cache is left empty.
    pub async fn refresh_skus(&self, skus: &[String]) -> SummaryBatch {
        let batch = self.generate_batch(skus).await;
        let patched = self.cache.replace_entries(batch.summaries.clone()).await;
        debug!(skus = skus.len(), patched, "SKU-scoped summary refresh");
        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StaticSettings;
    use crate::domain::entities::movement::{AdjustmentReason, MovementType, NewStockMovement};
    use crate::domain::entities::product::{Product, Variation, VariationAttribute};
    use crate::domain::entities::reconciliation::NewStockReconciliation;
    use crate::domain::repositories::MovementRepository;
    use crate::infrastructure::in_memory::{
        InMemoryCatalog, InMemoryMovementRepository, InMemoryReconciliationRepository,
    };
    use crate::domain::entities::order::Order;
    use crate::domain::repositories::OrderSource;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Catalog that tracks how many product lookups run at once
    #[derive(Default)]
    struct SlowCatalog {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    #[async_trait]
    impl InventorySource for SlowCatalog {
        async fn get_product_by_sku(&self, _sku: &str) -> LedgerResult<Option<Product>> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(None)
        }

        async fn get_variation_by_sku(&self, _sku: &str) -> LedgerResult<Option<Variation>> {
            Ok(None)
        }

        async fn get_product_name_by_id(&self, _id: i64) -> LedgerResult<Option<String>> {
            Ok(None)
        }

        async fn get_actual_stock_by_sku(&self, _sku: &str) -> LedgerResult<i64> {
            Ok(0)
        }
    }

    #[async_trait]
    impl OrderSource for SlowCatalog {
        async fn get_all_orders(&self) -> LedgerResult<Vec<Order>> {
            Ok(Vec::new())
        }
    }

    struct Fixture {
        generator: SummaryGenerator,
        movements: Arc<InMemoryMovementRepository>,
        reconciliations: Arc<InMemoryReconciliationRepository>,
        catalog: Arc<InMemoryCatalog>,
        cache: Arc<SummaryCache>,
    }

    fn fixture() -> Fixture {
        let movements = Arc::new(InMemoryMovementRepository::new());
        let reconciliations = Arc::new(InMemoryReconciliationRepository::new());
        let catalog = Arc::new(InMemoryCatalog::new());
        let cache = Arc::new(SummaryCache::with_default_ttl());
        let reader = Arc::new(MovementReader::new(
            movements.clone(),
            catalog.clone(),
            Arc::new(StaticSettings::new(false)),
            Duration::from_secs(1),
        ));
        let generator =
            SummaryGenerator::new(reader, reconciliations.clone(), catalog.clone(), cache.clone());
        Fixture {
            generator,
            movements,
            reconciliations,
            catalog,
            cache,
        }
    }

    async fn seed_widget(f: &Fixture) {
        f.catalog
            .add_product(Product {
                id: 1,
                name: "Widget".to_string(),
                sku: Some("W-1".to_string()),
                stock_quantity: Some(80),
            })
            .await;
        for movement in [
            NewStockMovement::new("W-1", MovementType::Initial, 100),
            NewStockMovement::new("W-1", MovementType::Sale, -30).with_reference("5001"),
            NewStockMovement::adjustment("W-1", -5, AdjustmentReason::Damage),
            NewStockMovement::new("W-1", MovementType::Purchase, 20),
        ] {
            f.movements.insert(&movement).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_worked_example() {
        let f = fixture();
        seed_widget(&f).await;

        let summary = f.generator.generate_summary("W-1").await;
        assert_eq!(summary.product_name, "Widget");
        assert_eq!(summary.product_id, Some(1));
        assert_eq!(summary.initial_stock, 100);
        assert_eq!(summary.total_sales, 30);
        assert_eq!(summary.total_adjustments, -5);
        assert_eq!(summary.total_purchases, 20);
        assert_eq!(summary.expected_stock, 85);
        assert_eq!(summary.actual_stock, 80);
        assert_eq!(summary.discrepancy, -5);
        assert!(summary.last_reconciled.is_none());
    }

    #[tokio::test]
    async fn test_last_reconciled_uses_latest_record() {
        let f = fixture();
        seed_widget(&f).await;
        let date = Utc::now();
        f.reconciliations
            .insert(&NewStockReconciliation {
                sku: "W-1".to_string(),
                product_id: Some(1),
                variation_id: None,
                reconciliation_date: date,
                expected_quantity: 85,
                actual_quantity: 80,
                notes: None,
            })
            .await
            .unwrap();

        let summary = f.generator.generate_summary("W-1").await;
        assert_eq!(summary.last_reconciled, Some(date));
    }

    #[tokio::test]
    async fn test_variation_name_uses_parent_and_options() {
        let f = fixture();
        f.catalog
            .add_product(Product {
                id: 10,
                name: "T-Shirt".to_string(),
                sku: None,
                stock_quantity: None,
            })
            .await;
        f.catalog
            .add_variation(Variation {
                id: 11,
                product_id: 10,
                sku: Some("TEE-RED-M".to_string()),
                attributes: vec![
                    VariationAttribute {
                        name: "Colour".to_string(),
                        option: "Red".to_string(),
                    },
                    VariationAttribute {
                        name: "Size".to_string(),
                        option: "M".to_string(),
                    },
                ],
                stock_quantity: Some(4),
            })
            .await;

        let summary = f.generator.generate_summary("TEE-RED-M").await;
        assert_eq!(summary.product_name, "T-Shirt - Red, M");
        assert_eq!(summary.variation_id, Some(11));
        assert_eq!(summary.actual_stock, 4);
        assert_eq!(summary.expected_stock, 0);
        assert_eq!(summary.discrepancy, 4);
    }

    #[tokio::test]
    async fn test_unknown_sku_gets_placeholder_name() {
        let f = fixture();
        f.movements
            .insert(&NewStockMovement::new("GHOST", MovementType::Initial, 3))
            .await
            .unwrap();
        let summary = f.generator.generate_summary("GHOST").await;
        assert_eq!(summary.product_name, "Unknown Product (SKU: GHOST)");
        assert_eq!(summary.actual_stock, 0);
        assert_eq!(summary.discrepancy, -3);
    }

    #[tokio::test]
    async fn test_failure_degrades_to_error_summary() {
        let f = fixture();
        seed_widget(&f).await;
        f.catalog.fail_sku("W-1").await;

        let summary = f.generator.generate_summary("W-1").await;
        assert!(summary.product_name.starts_with("Error: "));
        assert_eq!(summary.expected_stock, 0);
        assert_eq!(summary.actual_stock, 0);
        assert_eq!(summary.discrepancy, 0);
    }

    #[tokio::test]
    async fn test_batch_collects_per_sku_failures() {
        let f = fixture();
        seed_widget(&f).await;
        for sku in ["A", "B", "C", "D", "E", "F", "G"] {
            f.movements
                .insert(&NewStockMovement::new(sku, MovementType::Initial, 1))
                .await
                .unwrap();
        }
        f.catalog.fail_sku("C").await;

        let all = f.generator.generate_all_summaries(false).await;
        assert_eq!(all.len(), 7);
        assert!(!all.iter().any(|s| s.sku == "C"));
        let skus: Vec<_> = all.iter().map(|s| s.sku.as_str()).collect();
        assert_eq!(skus, vec!["A", "B", "D", "E", "F", "G", "W-1"]);

        let errors = f.cache.stats().await.last_errors;
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("C:"));

        let batch = f
            .generator
            .generate_batch(&["A".to_string(), "C".to_string()])
            .await;
        assert_eq!(batch.summaries.len(), 1);
        assert_eq!(batch.errors.len(), 1);
        assert!(batch.errors[0].starts_with("C:"));
    }

    #[tokio::test]
    async fn test_cached_set_is_not_recomputed_within_ttl() {
        let f = fixture();
        seed_widget(&f).await;

        let first = f.generator.generate_all_summaries(false).await;
        let lookups = f.catalog.lookup_count();
        let second = f.generator.generate_all_summaries(false).await;
        assert_eq!(first, second);
        assert_eq!(f.catalog.lookup_count(), lookups);

        f.generator.generate_all_summaries(true).await;
        assert!(f.catalog.lookup_count() > lookups);
    }

    #[tokio::test]
    async fn test_refresh_skus_patches_populated_cache() {
        let f = fixture();
        seed_widget(&f).await;

        let skus = vec!["W-1".to_string()];
        f.generator.refresh_skus(&skus).await;
        assert!(!f.cache.is_populated().await);

        f.generator.generate_all_summaries(false).await;
        f.catalog.set_stock("W-1", 85).await;
        let batch = f.generator.refresh_skus(&skus).await;
        assert_eq!(batch.summaries[0].discrepancy, 0);

        let cached = f.generator.generate_all_summaries(false).await;
        assert_eq!(cached[0].actual_stock, 85);
    }

    #[tokio::test]
    async fn test_batch_limits_concurrent_computations() {
        let movements = Arc::new(InMemoryMovementRepository::new());
        let catalog = Arc::new(SlowCatalog::default());
        let reader = Arc::new(MovementReader::new(
            movements.clone(),
            catalog.clone(),
            Arc::new(StaticSettings::new(false)),
            Duration::from_secs(1),
        ));
        let generator = SummaryGenerator::new(
            reader,
            Arc::new(InMemoryReconciliationRepository::new()),
            catalog.clone(),
            Arc::new(SummaryCache::with_default_ttl()),
        );
        let skus: Vec<String> = (0..12).map(|i| format!("SKU-{:02}", i)).collect();
        for sku in &skus {
            movements
                .insert(&NewStockMovement::new(sku.as_str(), MovementType::Initial, 1))
                .await
                .unwrap();
        }

        let batch = generator.generate_batch(&skus).await;
        assert_eq!(batch.summaries.len(), 12);
        let max = catalog.max_in_flight.load(Ordering::SeqCst);
        assert!(max <= DEFAULT_BATCH_SIZE, "{} lookups in flight", max);
        assert!(max > 1);
    }
}
