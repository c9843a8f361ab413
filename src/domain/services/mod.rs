pub mod duplicate_cleaner;
pub mod movement_reader;
pub mod movement_store;
pub mod order_translator;
pub mod reconciliation_executor;
pub mod summary_cache;
pub mod summary_generator;

use crate::domain::errors::{LedgerError, LedgerResult};
use std::future::Future;
use std::time::Duration;

/// Run a collaborator call under the store timeout. An elapsed timeout is
/// reported as an upstream failure so callers can treat it per item.
pub(crate) async fn bounded<T, F>(timeout: Duration, operation: &str, call: F) -> LedgerResult<T>
where
    F: Future<Output = LedgerResult<T>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(LedgerError::upstream(format!(
            "{} timed out after {}ms",
            operation,
            timeout.as_millis()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bounded_passes_result_through() {
        let result = bounded(Duration::from_millis(50), "noop", async { Ok(7) }).await;
        assert_eq!(result, Ok(7));
    }

    #[tokio::test]
    async fn test_bounded_maps_timeout_to_upstream() {
        let result: LedgerResult<()> = bounded(Duration::from_millis(5), "slow read", async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(())
        })
        .await;
        match result {
            Err(LedgerError::Upstream(message)) => assert!(message.contains("slow read")),
            other => panic!("expected upstream timeout, got {:?}", other),
        }
    }
}
