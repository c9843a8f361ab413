pub mod movement;
pub mod order;
pub mod product;
pub mod reconciliation;
