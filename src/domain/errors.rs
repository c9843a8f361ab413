use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result alias used across the ledger services
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Errors surfaced by single-item ledger operations.
///
/// Batch operations never return these directly; they collect the
/// rendered messages into their result structures instead.
#[derive(Debug, Error, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum LedgerError {
    /// A required field is missing or out of range
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Lookup by id found nothing
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: i64 },

    /// The backing store or an external source failed or timed out
    #[error("Upstream failure: {0}")]
    Upstream(String),
}

impl LedgerError {
    pub fn validation(message: impl Into<String>) -> Self {
        LedgerError::Validation(message.into())
    }

    pub fn not_found(entity: &str, id: i64) -> Self {
        LedgerError::NotFound {
            entity: entity.to_string(),
            id,
        }
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        LedgerError::Upstream(message.into())
    }

    /// Whether the failure may succeed on retry
    pub fn is_recoverable(&self) -> bool {
        matches!(self, LedgerError::Upstream(_))
    }
}
