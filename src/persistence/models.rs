//! Database Models
//!
//! Row structures for the ledger tables. Enum columns are stored as their
//! lowercase text form and parsed back when a row is converted into its
//! domain entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::DatabaseError;
use crate::domain::entities::movement::{
    AdjustmentMetadata, AdjustmentReason, MovementType, StockMovement,
};
use crate::domain::entities::reconciliation::StockReconciliation;

/// Movement record in database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MovementRecord {
    pub id: i64,
    pub sku: String,
    pub product_id: Option<i64>,
    pub variation_id: Option<i64>,
    pub movement_date: DateTime<Utc>,
    pub quantity: i64,
    pub movement_type: String, // "initial", "sale", "adjustment" or "purchase"
    pub reason: Option<String>,
    pub reference_id: Option<String>,
    pub batch_number: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<MovementRecord> for StockMovement {
    type Error = DatabaseError;

    fn try_from(record: MovementRecord) -> Result<Self, Self::Error> {
        let movement_type = record.movement_type.parse::<MovementType>().map_err(|e| {
            DatabaseError::QueryError(format!("Movement {}: {}", record.id, e))
        })?;
        let reason = record
            .reason
            .as_deref()
            .map(str::parse::<AdjustmentReason>)
            .transpose()
            .map_err(|e| DatabaseError::QueryError(format!("Movement {}: {}", record.id, e)))?;

        Ok(StockMovement {
            id: record.id,
            sku: record.sku,
            product_id: record.product_id,
            variation_id: record.variation_id,
            movement_date: record.movement_date,
            quantity: record.quantity,
            movement_type,
            reason,
            reference_id: record.reference_id,
            batch_number: record.batch_number,
            notes: record.notes,
            created_at: record.created_at,
        })
    }
}

/// Adjustment metadata side-table row
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AdjustmentMetadataRecord {
    pub movement_id: i64,
    pub manual_sale: bool,
    pub loss_percentage: Option<f64>,
}

impl From<AdjustmentMetadataRecord> for AdjustmentMetadata {
    fn from(record: AdjustmentMetadataRecord) -> Self {
        AdjustmentMetadata {
            manual_sale: record.manual_sale,
            loss_percentage: record.loss_percentage,
        }
    }
}

/// Reconciliation record in database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ReconciliationRecord {
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

impl From<ReconciliationRecord> for StockReconciliation {
    fn from(record: ReconciliationRecord) -> Self {
        StockReconciliation {
            id: record.id,
            sku: record.sku,
            product_id: record.product_id,
            variation_id: record.variation_id,
            reconciliation_date: record.reconciliation_date,
            expected_quantity: record.expected_quantity,
            actual_quantity: record.actual_quantity,
            discrepancy: record.discrepancy,
            notes: record.notes,
            created_at: record.created_at,
        }
    }
}

/// Sync watermark row
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WatermarkRecord {
    pub sync_key: String,
    pub last_synced_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(movement_type: &str, reason: Option<&str>) -> MovementRecord {
        MovementRecord {
            id: 3,
            sku: "SKU-1".to_string(),
            product_id: None,
            variation_id: None,
            movement_date: Utc::now(),
            quantity: -2,
            movement_type: movement_type.to_string(),
            reason: reason.map(str::to_string),
            reference_id: None,
            batch_number: None,
            notes: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_record_converts_to_movement() {
        let movement = StockMovement::try_from(record("adjustment", Some("theft"))).unwrap();
        assert_eq!(movement.movement_type, MovementType::Adjustment);
        assert_eq!(movement.reason, Some(AdjustmentReason::Theft));
    }

    #[test]
    fn test_unknown_enum_text_is_rejected() {
        assert!(StockMovement::try_from(record("transfer", None)).is_err());
        assert!(StockMovement::try_from(record("adjustment", Some("lost"))).is_err());
    }
}
