pub mod ledger_repository;
pub mod sources;

pub use ledger_repository::{MovementRepository, ReconciliationRepository};
pub use sources::{InventorySource, OrderSource, SettingsStore, SyncWatermarkStore};
