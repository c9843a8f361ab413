//! Duplicate Cleaner
//!
//! Removes redundant persisted movements that share a natural key
//! `(reference_id, sku, quantity)`, keeping the oldest row of each group.

use crate::domain::entities::movement::{MovementKey, MovementType, StockMovement};
use crate::domain::services::bounded;
use crate::domain::services::movement_reader::MovementReader;
use crate::domain::services::summary_cache::SummaryCache;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CleanupResult {
    pub removed: usize,
    pub errors: Vec<String>,
}

pub struct DuplicateCleaner {
    reader: Arc<MovementReader>,
    cache: Arc<SummaryCache>,
}

impl DuplicateCleaner {
    pub fn new(reader: Arc<MovementReader>, cache: Arc<SummaryCache>) -> Self {
        Self { reader, cache }
    }

    pub async fn cleanup_duplicates(&self, movement_type: MovementType) -> CleanupResult {
        let mut result = CleanupResult::default();
        let timeout = self.reader.timeout();

        // Derived sales have no rows to delete, so read persisted rows only
        let movements = match bounded(
            timeout,
            "movement read by type",
            self.reader.repository().find_by_type(movement_type),
        )
        .await
        {
            Ok(movements) => movements,
            Err(e) => {
                warn!(movement_type = %movement_type, error = %e, "Duplicate scan failed");
                result.errors.push(e.to_string());
                return result;
            }
        };

        for (key, group) in group_by_key(movements) {
            if group.len() < 2 {
                continue;
            }
            // Groups are sorted by id; the first row survives
            for duplicate in &group[1..] {
                match bounded(
                    timeout,
                    "movement delete",
                    self.reader.repository().delete(duplicate.id),
                )
                .await
                {
                    Ok(true) => result.removed += 1,
                    Ok(false) => {}
                    Err(e) => {
                        warn!(id = duplicate.id, sku = %key.sku, error = %e, "Failed to delete duplicate movement");
                        result.errors.push(format!(
                            "{} {:?} x{} (id {}): {}",
                            key.sku, key.reference_id, key.quantity, duplicate.id, e
                        ));
                    }
                }
            }
        }

        if result.removed > 0 {
            self.cache.invalidate().await;
        }
        info!(
            movement_type = %movement_type,
            removed = result.removed,
            errors = result.errors.len(),
            "Duplicate cleanup finished"
        );
        result
    }
}

fn group_by_key(movements: Vec<StockMovement>) -> BTreeMap<MovementKey, Vec<StockMovement>> {
    let mut groups: BTreeMap<MovementKey, Vec<StockMovement>> = BTreeMap::new();
    for movement in movements {
        groups.entry(movement.natural_key()).or_default().push(movement);
    }
    for group in groups.values_mut() {
        group.sort_by_key(|m| m.id);
    }
    groups
}
