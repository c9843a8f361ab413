use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::errors::{LedgerError, LedgerResult};

/// Lifecycle state reported by the order source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OrderStatus {
    Pending,
    Processing,
    OnHold,
    Completed,
    Cancelled,
    Refunded,
    Failed,
    #[serde(other)]
    Other,
}

impl OrderStatus {
    /// Orders in these states have left (or are leaving) the warehouse
    pub fn is_fulfilment(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Processing)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    #[serde(default)]
    pub sku: String,
    pub quantity: i64,
    #[serde(default)]
    pub product_id: Option<i64>,
    #[serde(default)]
    pub variation_id: Option<i64>,
}

impl LineItem {
    /// SKU as it is stored in the ledger
    pub fn ledger_sku(&self) -> &str {
        self.sku.trim()
    }

    pub fn has_sku(&self) -> bool {
        !self.ledger_sku().is_empty()
    }

    /// Ledger quantity for this item; always a removal
    pub fn sale_quantity(&self) -> LedgerResult<i64> {
        self.quantity.checked_abs().map(|q| -q).ok_or_else(|| {
            LedgerError::validation(format!(
                "line item quantity out of range for {}: {}",
                self.ledger_sku(),
                self.quantity
            ))
        })
    }
}

/// Order as read from the external order source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub number: String,
    pub status: OrderStatus,
    pub date_created: DateTime<Utc>,
    #[serde(default)]
    pub date_completed: Option<DateTime<Utc>>,
    #[serde(default)]
    pub line_items: Vec<LineItem>,
}

impl Order {
    /// Whether this order contributes sale movements
    pub fn counts_as_sale(&self, exclude_on_hold: bool) -> bool {
        if exclude_on_hold && self.status == OrderStatus::OnHold {
            return false;
        }
        self.status.is_fulfilment()
    }

    /// Date recorded on derived sale movements
    pub fn sale_date(&self) -> DateTime<Utc> {
        self.date_completed.unwrap_or(self.date_created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn order(status: OrderStatus) -> Order {
        Order {
            number: "1001".to_string(),
            status,
            date_created: Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap(),
            date_completed: None,
            line_items: vec![],
        }
    }

    #[test]
    fn test_fulfilment_statuses_count_as_sales() {
        assert!(order(OrderStatus::Completed).counts_as_sale(false));
        assert!(order(OrderStatus::Processing).counts_as_sale(true));
        assert!(!order(OrderStatus::Pending).counts_as_sale(false));
        assert!(!order(OrderStatus::Cancelled).counts_as_sale(false));
    }

    #[test]
    fn test_on_hold_never_counts() {
        assert!(!order(OrderStatus::OnHold).counts_as_sale(true));
        assert!(!order(OrderStatus::OnHold).counts_as_sale(false));
    }

    #[test]
    fn test_sale_date_prefers_completion() {
        let mut o = order(OrderStatus::Completed);
        assert_eq!(o.sale_date(), o.date_created);
        let completed = Utc.with_ymd_and_hms(2024, 3, 2, 9, 30, 0).unwrap();
        o.date_completed = Some(completed);
        assert_eq!(o.sale_date(), completed);
    }

    #[test]
    fn test_status_deserializes_kebab_case() {
        let status: OrderStatus = serde_json::from_str("\"on-hold\"").unwrap();
        assert_eq!(status, OrderStatus::OnHold);
        let status: OrderStatus = serde_json::from_str("\"checkout-draft\"").unwrap();
        assert_eq!(status, OrderStatus::Other);
    }

    #[test]
    fn test_line_item_sale_quantity_is_negative() {
        let item = LineItem {
            sku: "SKU-1".to_string(),
            quantity: 3,
            product_id: None,
            variation_id: None,
        };
        assert_eq!(item.sale_quantity(), Ok(-3));
        let refund_line = LineItem { quantity: -2, ..item };
        assert_eq!(refund_line.sale_quantity(), Ok(-2));
    }

    #[test]
    fn test_extreme_quantity_is_rejected() {
        let item = LineItem {
            sku: "SKU-1".to_string(),
            quantity: i64::MIN,
            product_id: None,
            variation_id: None,
        };
        assert!(matches!(item.sale_quantity(), Err(LedgerError::Validation(_))));
    }

    #[test]
    fn test_ledger_sku_is_trimmed() {
        let item = LineItem {
            sku: "  A-1 ".to_string(),
            quantity: 1,
            product_id: None,
            variation_id: None,
        };
        assert_eq!(item.ledger_sku(), "A-1");
        assert!(item.has_sku());
        assert!(!LineItem { sku: "   ".to_string(), ..item }.has_sku());
    }
}
