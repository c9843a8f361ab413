//! Movement Reader
//!
//! Single read path for ledger movements. Where sale movements come from is
//! a policy decided per read by the "exclude on-hold orders" setting:
//!
//! - [`SaleSource::Ledger`]: every movement type is read from persisted rows.
//! - [`SaleSource::Orders`]: sales are recomputed from the order feed on
//!   every read (fulfilment orders only, on-hold excluded); non-sale
//!   movements still come from persisted rows.
//!
//! There is no materialization step: the derived path runs each time.

use crate::domain::entities::movement::{MovementType, StockMovement};
use crate::domain::entities::order::{LineItem, Order};
use crate::domain::errors::LedgerResult;
use crate::domain::repositories::{MovementRepository, OrderSource, SettingsStore};
use crate::domain::services::bounded;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Where sale movements are read from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaleSource {
    Ledger,
    Orders,
}

pub struct MovementReader {
    repository: Arc<dyn MovementRepository>,
    orders: Arc<dyn OrderSource>,
    settings: Arc<dyn SettingsStore>,
    timeout: Duration,
}

impl MovementReader {
    pub fn new(
        repository: Arc<dyn MovementRepository>,
        orders: Arc<dyn OrderSource>,
        settings: Arc<dyn SettingsStore>,
        timeout: Duration,
    ) -> Self {
        Self {
            repository,
            orders,
            settings,
            timeout,
        }
    }

    pub fn repository(&self) -> &Arc<dyn MovementRepository> {
        &self.repository
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn exclude_on_hold_orders(&self) -> LedgerResult<bool> {
        bounded(
            self.timeout,
            "settings lookup",
            self.settings.exclude_on_hold_orders(),
        )
        .await
    }

    pub async fn sale_source(&self) -> LedgerResult<SaleSource> {
        Ok(if self.exclude_on_hold_orders().await? {
            SaleSource::Orders
        } else {
            SaleSource::Ledger
        })
    }

    pub async fn read_by_sku(&self, sku: &str) -> LedgerResult<Vec<StockMovement>> {
        let sku = sku.trim();
        let persisted = bounded(
            self.timeout,
            "movement read by sku",
            self.repository.find_by_sku(sku),
        )
        .await?;
        match self.sale_source().await? {
            SaleSource::Ledger => Ok(persisted),
            SaleSource::Orders => {
                let mut movements = without_sales(persisted);
                movements.extend(self.derived_sales(|item| item.ledger_sku() == sku).await?);
                Ok(movements)
            }
        }
    }

    pub async fn read_by_type(&self, movement_type: MovementType) -> LedgerResult<Vec<StockMovement>> {
        match (movement_type, self.sale_source().await?) {
            (MovementType::Sale, SaleSource::Orders) => self.derived_sales(|_| true).await,
            _ => {
                bounded(
                    self.timeout,
                    "movement read by type",
                    self.repository.find_by_type(movement_type),
                )
                .await
            }
        }
    }

    pub async fn read_all(&self) -> LedgerResult<Vec<StockMovement>> {
        let persisted = bounded(self.timeout, "movement read", self.repository.find_all()).await?;
        match self.sale_source().await? {
            SaleSource::Ledger => Ok(persisted),
            SaleSource::Orders => {
                let mut movements = without_sales(persisted);
                movements.extend(self.derived_sales(|_| true).await?);
                Ok(movements)
            }
        }
    }

    async fn derived_sales<F>(&self, include: F) -> LedgerResult<Vec<StockMovement>>
    where
        F: Fn(&LineItem) -> bool,
    {
        let orders = bounded(self.timeout, "order feed read", self.orders.get_all_orders()).await?;
        let include = &include;
        let sales: Vec<StockMovement> = orders
            .iter()
            .filter(|order| order.counts_as_sale(true))
            .flat_map(move |order| {
                order
                    .line_items
                    .iter()
                    .filter(move |item| item.has_sku() && include(item))
                    .filter_map(move |item| match derived_sale(order, item) {
                        Ok(sale) => Some(sale),
                        Err(e) => {
                            warn!(order = %order.number, error = %e, "Line item skipped");
                            None
                        }
                    })
            })
            .collect();
        debug!(
            orders = orders.len(),
            sales = sales.len(),
            "Derived sale movements from order feed"
        );
        Ok(sales)
    }
}

fn without_sales(movements: Vec<StockMovement>) -> Vec<StockMovement> {
    movements
        .into_iter()
        .filter(|m| m.movement_type != MovementType::Sale)
        .collect()
}

fn derived_sale(order: &Order, item: &LineItem) -> LedgerResult<StockMovement> {
    let date = order.sale_date();
    Ok(StockMovement {
        id: 0,
        sku: item.ledger_sku().to_string(),
        product_id: item.product_id,
        variation_id: item.variation_id,
        movement_date: date,
        quantity: item.sale_quantity()?,
        movement_type: MovementType::Sale,
        reason: None,
        reference_id: Some(order.number.clone()),
        batch_number: None,
        notes: None,
        created_at: date,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StaticSettings;
    use crate::domain::entities::movement::NewStockMovement;
    use crate::domain::entities::order::OrderStatus;
    use crate::infrastructure::in_memory::{InMemoryCatalog, InMemoryMovementRepository};
    use chrono::Utc;

    fn order(number: &str, status: OrderStatus, sku: &str, quantity: i64) -> Order {
        Order {
            number: number.to_string(),
            status,
            date_created: Utc::now(),
            date_completed: None,
            line_items: vec![LineItem {
                sku: sku.to_string(),
                quantity,
                product_id: None,
                variation_id: None,
            }],
        }
    }

    async fn setup(
        exclude_on_hold: bool,
    ) -> (MovementReader, Arc<InMemoryMovementRepository>, Arc<StaticSettings>) {
        let repository = Arc::new(InMemoryMovementRepository::new());
        let catalog = Arc::new(InMemoryCatalog::new());
        catalog.add_order(order("100", OrderStatus::Completed, "SKU-A", 2)).await;
        catalog.add_order(order("101", OrderStatus::OnHold, "SKU-A", 5)).await;
        catalog.add_order(order("102", OrderStatus::Processing, "SKU-B", 1)).await;
        catalog.add_order(order("103", OrderStatus::Cancelled, "SKU-A", 7)).await;

        repository
            .insert(&NewStockMovement::new("SKU-A", MovementType::Initial, 50))
            .await
            .unwrap();
        repository
            .insert(&NewStockMovement::new("SKU-A", MovementType::Sale, -9).with_reference("999"))
            .await
            .unwrap();

        let settings = Arc::new(StaticSettings::new(exclude_on_hold));
        let reader = MovementReader::new(
            repository.clone(),
            catalog,
            settings.clone(),
            Duration::from_secs(1),
        );
        (reader, repository, settings)
    }

    #[tokio::test]
    async fn test_ledger_strategy_reads_persisted_sales() {
        let (reader, _, _) = setup(false).await;
        assert_eq!(reader.sale_source().await.unwrap(), SaleSource::Ledger);

        let movements = reader.read_by_sku("SKU-A").await.unwrap();
        assert_eq!(movements.len(), 2);
        let sales: Vec<_> = movements
            .iter()
            .filter(|m| m.movement_type == MovementType::Sale)
            .collect();
        assert_eq!(sales.len(), 1);
        assert_eq!(sales[0].quantity, -9);
    }

    #[tokio::test]
    async fn test_order_strategy_recomputes_sales_and_skips_on_hold() {
        let (reader, _, _) = setup(true).await;
        assert_eq!(reader.sale_source().await.unwrap(), SaleSource::Orders);

        let movements = reader.read_by_sku("SKU-A").await.unwrap();
        let sales: Vec<_> = movements
            .iter()
            .filter(|m| m.movement_type == MovementType::Sale)
            .collect();
        assert_eq!(sales.len(), 1);
        assert_eq!(sales[0].reference_id.as_deref(), Some("100"));
        assert_eq!(sales[0].quantity, -2);
        assert!(movements
            .iter()
            .any(|m| m.movement_type == MovementType::Initial && m.quantity == 50));
    }

    #[tokio::test]
    async fn test_order_strategy_read_by_type_and_all() {
        let (reader, _, _) = setup(true).await;

        let sales = reader.read_by_type(MovementType::Sale).await.unwrap();
        let refs: Vec<_> = sales.iter().filter_map(|m| m.reference_id.clone()).collect();
        assert_eq!(refs.len(), 2);
        assert!(refs.contains(&"100".to_string()));
        assert!(refs.contains(&"102".to_string()));

        let initial = reader.read_by_type(MovementType::Initial).await.unwrap();
        assert_eq!(initial.len(), 1);

        let all = reader.read_all().await.unwrap();
        assert_eq!(all.len(), 3);
        assert!(!all.iter().any(|m| m.reference_id.as_deref() == Some("999")));
    }

    #[tokio::test]
    async fn test_derived_path_runs_on_every_read() {
        let repository = Arc::new(InMemoryMovementRepository::new());
        let catalog = Arc::new(InMemoryCatalog::new());
        let reader = MovementReader::new(
            repository,
            catalog.clone(),
            Arc::new(StaticSettings::new(true)),
            Duration::from_secs(1),
        );
        assert!(reader.read_by_sku("SKU-A").await.unwrap().is_empty());

        catalog.add_order(order("200", OrderStatus::Completed, "SKU-A", 4)).await;
        let movements = reader.read_by_sku("SKU-A").await.unwrap();
        assert_eq!(movements.len(), 1);
        assert_eq!(movements[0].quantity, -4);
    }

    #[tokio::test]
    async fn test_derived_sales_match_padded_skus() {
        let catalog = Arc::new(InMemoryCatalog::new());
        let reader = MovementReader::new(
            Arc::new(InMemoryMovementRepository::new()),
            catalog.clone(),
            Arc::new(StaticSettings::new(true)),
            Duration::from_secs(1),
        );
        catalog.add_order(order("300", OrderStatus::Completed, "SKU-A ", 3)).await;
        catalog.add_order(order("301", OrderStatus::Completed, "SKU-A", i64::MIN)).await;

        let movements = reader.read_by_sku(" SKU-A").await.unwrap();
        assert_eq!(movements.len(), 1);
        assert_eq!(movements[0].sku, "SKU-A");
        assert_eq!(movements[0].quantity, -3);
    }

    #[tokio::test]
    async fn test_switching_setting_changes_strategy() {
        let (reader, repository, settings) = setup(false).await;
        assert_eq!(reader.read_all().await.unwrap().len(), 2);

        settings.set_exclude_on_hold_orders(true);
        let all = reader.read_all().await.unwrap();
        assert_eq!(all.len(), 3);
        // persisted rows are untouched by the read policy
        assert_eq!(repository.len().await, 2);
    }
}
