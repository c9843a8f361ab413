//! Stock movement ledger entries
//!
//! A movement is one signed quantity change for a SKU. Movements are
//! append-only: after creation only the annotation fields (`notes`,
//! `reason`, `batch_number`) may be edited.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::errors::{LedgerError, LedgerResult};

/// Kind of ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementType {
    Initial,
    Sale,
    Adjustment,
    Purchase,
}

impl MovementType {
    pub const ALL: [MovementType; 4] = [
        MovementType::Initial,
        MovementType::Sale,
        MovementType::Adjustment,
        MovementType::Purchase,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::Initial => "initial",
            MovementType::Sale => "sale",
            MovementType::Adjustment => "adjustment",
            MovementType::Purchase => "purchase",
        }
    }
}

impl fmt::Display for MovementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MovementType {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "initial" => Ok(MovementType::Initial),
            "sale" => Ok(MovementType::Sale),
            "adjustment" => Ok(MovementType::Adjustment),
            "purchase" => Ok(MovementType::Purchase),
            other => Err(LedgerError::validation(format!(
                "unknown movement type: {}",
                other
            ))),
        }
    }
}

/// Why an adjustment was recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdjustmentReason {
    Expiry,
    Damage,
    Theft,
    Correction,
    Other,
}

impl AdjustmentReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdjustmentReason::Expiry => "expiry",
            AdjustmentReason::Damage => "damage",
            AdjustmentReason::Theft => "theft",
            AdjustmentReason::Correction => "correction",
            AdjustmentReason::Other => "other",
        }
    }
}

impl fmt::Display for AdjustmentReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AdjustmentReason {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "expiry" => Ok(AdjustmentReason::Expiry),
            "damage" => Ok(AdjustmentReason::Damage),
            "theft" => Ok(AdjustmentReason::Theft),
            "correction" => Ok(AdjustmentReason::Correction),
            "other" => Ok(AdjustmentReason::Other),
            other => Err(LedgerError::validation(format!(
                "unknown adjustment reason: {}",
                other
            ))),
        }
    }
}

/// Structured metadata attached to an adjustment movement
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AdjustmentMetadata {
    /// Adjustment records a sale made outside the order source
    pub manual_sale: bool,
    /// Share of the batch lost, in percent
    pub loss_percentage: Option<f64>,
}

impl AdjustmentMetadata {
    pub fn validate(&self) -> LedgerResult<()> {
        if let Some(loss) = self.loss_percentage {
            if !loss.is_finite() || !(0.0..=100.0).contains(&loss) {
                return Err(LedgerError::validation(format!(
                    "loss percentage must be between 0 and 100, got {}",
                    loss
                )));
            }
        }
        Ok(())
    }
}

/// Persisted ledger entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockMovement {
    /// Store-assigned id. Sales derived from orders on read carry 0.
    pub id: i64,
    pub sku: String,
    pub product_id: Option<i64>,
    pub variation_id: Option<i64>,
    pub movement_date: DateTime<Utc>,
    pub quantity: i64,
    pub movement_type: MovementType,
    pub reason: Option<AdjustmentReason>,
    pub reference_id: Option<String>,
    pub batch_number: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl StockMovement {
    pub fn natural_key(&self) -> MovementKey {
        MovementKey {
            reference_id: self.reference_id.clone(),
            sku: self.sku.clone(),
            quantity: self.quantity,
        }
    }
}

/// Natural key used to detect redundant rows
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MovementKey {
    pub reference_id: Option<String>,
    pub sku: String,
    pub quantity: i64,
}

/// Input for appending a movement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewStockMovement {
    pub sku: String,
    #[serde(default)]
    pub product_id: Option<i64>,
    #[serde(default)]
    pub variation_id: Option<i64>,
    /// Defaults to the insertion time
    #[serde(default)]
    pub movement_date: Option<DateTime<Utc>>,
    pub quantity: i64,
    pub movement_type: MovementType,
    #[serde(default)]
    pub reason: Option<AdjustmentReason>,
    #[serde(default)]
    pub reference_id: Option<String>,
    #[serde(default)]
    pub batch_number: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub metadata: Option<AdjustmentMetadata>,
}

impl NewStockMovement {
    pub fn new(sku: impl Into<String>, movement_type: MovementType, quantity: i64) -> Self {
        Self {
            sku: sku.into(),
            product_id: None,
            variation_id: None,
            movement_date: None,
            quantity,
            movement_type,
            reason: None,
            reference_id: None,
            batch_number: None,
            notes: None,
            metadata: None,
        }
    }

    pub fn adjustment(sku: impl Into<String>, quantity: i64, reason: AdjustmentReason) -> Self {
        let mut movement = Self::new(sku, MovementType::Adjustment, quantity);
        movement.reason = Some(reason);
        movement
    }

    pub fn with_reference(mut self, reference_id: impl Into<String>) -> Self {
        self.reference_id = Some(reference_id.into());
        self
    }

    pub fn with_date(mut self, date: DateTime<Utc>) -> Self {
        self.movement_date = Some(date);
        self
    }

    pub fn with_product(mut self, product_id: Option<i64>, variation_id: Option<i64>) -> Self {
        self.product_id = product_id;
        self.variation_id = variation_id;
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn with_batch(mut self, batch_number: impl Into<String>) -> Self {
        self.batch_number = Some(batch_number.into());
        self
    }

    pub fn with_metadata(mut self, metadata: AdjustmentMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn validate(&self) -> LedgerResult<()> {
        if self.sku.trim().is_empty() {
            return Err(LedgerError::validation("sku is required"));
        }
        if let Some(metadata) = &self.metadata {
            if self.movement_type != MovementType::Adjustment {
                return Err(LedgerError::validation(format!(
                    "adjustment metadata cannot be attached to a {} movement",
                    self.movement_type
                )));
            }
            metadata.validate()?;
        }
        Ok(())
    }
}

/// Annotation edit. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MovementUpdate {
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub reason: Option<AdjustmentReason>,
    #[serde(default)]
    pub batch_number: Option<String>,
}

impl MovementUpdate {
    pub fn is_empty(&self) -> bool {
        self.notes.is_none() && self.reason.is_none() && self.batch_number.is_none()
    }
}

/// Signed per-type sums of a SKU's movements
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerTotals {
    pub initial: i64,
    /// Signed running total; sales are negative
    pub sales: i64,
    pub adjustments: i64,
    pub purchases: i64,
}

impl LedgerTotals {
    pub fn fold<'a, I>(movements: I) -> Self
    where
        I: IntoIterator<Item = &'a StockMovement>,
    {
        movements
            .into_iter()
            .fold(LedgerTotals::default(), |mut totals, movement| {
                match movement.movement_type {
                    MovementType::Initial => totals.initial += movement.quantity,
                    MovementType::Sale => totals.sales += movement.quantity,
                    MovementType::Adjustment => totals.adjustments += movement.quantity,
                    MovementType::Purchase => totals.purchases += movement.quantity,
                }
                totals
            })
    }

    pub fn expected_stock(&self) -> i64 {
        self.initial + self.sales + self.adjustments + self.purchases
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn movement(movement_type: MovementType, quantity: i64) -> StockMovement {
        StockMovement {
            id: 1,
            sku: "SKU-1".to_string(),
            product_id: None,
            variation_id: None,
            movement_date: Utc::now(),
            quantity,
            movement_type,
            reason: None,
            reference_id: None,
            batch_number: None,
            notes: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_fold_matches_signed_sum() {
        let movements = vec![
            movement(MovementType::Initial, 100),
            movement(MovementType::Sale, -30),
            movement(MovementType::Adjustment, -5),
            movement(MovementType::Purchase, 20),
        ];
        let totals = LedgerTotals::fold(&movements);
        assert_eq!(totals.initial, 100);
        assert_eq!(totals.sales, -30);
        assert_eq!(totals.adjustments, -5);
        assert_eq!(totals.purchases, 20);
        assert_eq!(totals.expected_stock(), 85);
        assert_eq!(
            totals.expected_stock(),
            movements.iter().map(|m| m.quantity).sum::<i64>()
        );
    }

    #[test]
    fn test_fold_empty_ledger() {
        let totals = LedgerTotals::fold(&Vec::<StockMovement>::new());
        assert_eq!(totals, LedgerTotals::default());
        assert_eq!(totals.expected_stock(), 0);
    }

    #[test]
    fn test_movement_type_round_trips_through_str() {
        for movement_type in MovementType::ALL {
            assert_eq!(movement_type.as_str().parse::<MovementType>(), Ok(movement_type));
        }
        assert!("transfer".parse::<MovementType>().is_err());
    }

    #[test]
    fn test_reason_parse() {
        assert_eq!("damage".parse::<AdjustmentReason>(), Ok(AdjustmentReason::Damage));
        assert!("lost".parse::<AdjustmentReason>().is_err());
    }

    #[test]
    fn test_validate_rejects_blank_sku() {
        let result = NewStockMovement::new("   ", MovementType::Initial, 10).validate();
        assert!(matches!(result, Err(LedgerError::Validation(_))));
    }

    #[test]
    fn test_validate_metadata_only_on_adjustments() {
        let sale = NewStockMovement::new("SKU-1", MovementType::Sale, -1)
            .with_metadata(AdjustmentMetadata::default());
        assert!(sale.validate().is_err());

        let adjustment = NewStockMovement::adjustment("SKU-1", -3, AdjustmentReason::Expiry)
            .with_metadata(AdjustmentMetadata {
                manual_sale: false,
                loss_percentage: Some(12.5),
            });
        assert!(adjustment.validate().is_ok());
    }

    #[test]
    fn test_loss_percentage_bounds() {
        let metadata = AdjustmentMetadata {
            manual_sale: false,
            loss_percentage: Some(140.0),
        };
        assert!(metadata.validate().is_err());
        let metadata = AdjustmentMetadata {
            manual_sale: true,
            loss_percentage: None,
        };
        assert!(metadata.validate().is_ok());
    }

    #[test]
    fn test_movement_type_serde_is_lowercase() {
        let json = serde_json::to_string(&MovementType::Purchase).unwrap();
        assert_eq!(json, "\"purchase\"");
    }
}
