//! Reconciliation audit records and the derived per-SKU summary

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::movement::LedgerTotals;
use crate::domain::errors::{LedgerError, LedgerResult};

/// Point-in-time audit of a manual stock count
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockReconciliation {
    pub id: i64,
    pub sku: String,
    pub product_id: Option<i64>,
    pub variation_id: Option<i64>,
    pub reconciliation_date: DateTime<Utc>,
    pub expected_quantity: i64,
    pub actual_quantity: i64,
    pub discrepancy: i64,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Input for recording a reconciliation
#[derive(Debug, Clone, PartialEq)]
pub struct NewStockReconciliation {
    pub sku: String,
    pub product_id: Option<i64>,
    pub variation_id: Option<i64>,
    pub reconciliation_date: DateTime<Utc>,
    pub expected_quantity: i64,
    pub actual_quantity: i64,
    pub notes: Option<String>,
}

impl NewStockReconciliation {
    pub fn discrepancy(&self) -> LedgerResult<i64> {
        self.actual_quantity
            .checked_sub(self.expected_quantity)
            .ok_or_else(|| {
                LedgerError::validation(format!(
                    "discrepancy out of range for {}: {} counted, {} expected",
                    self.sku, self.actual_quantity, self.expected_quantity
                ))
            })
    }
}

/// Expected-vs-actual view of one SKU, folded from the ledger on demand
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockReconciliationSummary {
    pub sku: String,
    pub product_id: Option<i64>,
    pub variation_id: Option<i64>,
    pub product_name: String,
    pub initial_stock: i64,
    /// Magnitude of sales; the signed value feeds `expected_stock`
    pub total_sales: i64,
    pub total_adjustments: i64,
    pub total_purchases: i64,
    pub expected_stock: i64,
    pub actual_stock: i64,
    pub discrepancy: i64,
    pub last_reconciled: Option<DateTime<Utc>>,
}

impl StockReconciliationSummary {
    pub fn from_totals(
        sku: &str,
        product_name: String,
        totals: LedgerTotals,
        actual_stock: i64,
    ) -> Self {
        let expected_stock = totals.expected_stock();
        Self {
            sku: sku.to_string(),
            product_id: None,
            variation_id: None,
            product_name,
            initial_stock: totals.initial,
            total_sales: totals.sales.abs(),
            total_adjustments: totals.adjustments,
            total_purchases: totals.purchases,
            expected_stock,
            actual_stock,
            discrepancy: actual_stock.saturating_sub(expected_stock),
            last_reconciled: None,
        }
    }

    /// Zero-valued summary returned when a SKU could not be computed
    pub fn degraded(sku: &str, product_name: String) -> Self {
        Self::from_totals(sku, product_name, LedgerTotals::default(), 0)
    }

    pub fn has_discrepancy(&self) -> bool {
        self.discrepancy != 0
    }
}
