/// Task Runner with Circuit Breaker Pattern
///
/// Runs a periodic background task with exponential backoff on failure.
/// After too many consecutive failures the task is stopped and the last
/// error is returned; the rest of the process keeps running.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::application::services::ledger_service::StockLedgerService;

/// Circuit breaker configuration for background tasks
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the task is stopped
    pub max_consecutive_failures: u32,
    /// Pause after a successful run
    pub interval: Duration,
    /// Initial delay between retries
    pub initial_retry_delay: Duration,
    /// Maximum delay between retries
    pub max_retry_delay: Duration,
}

#[derive(Debug)]
struct CircuitBreakerState {
    consecutive_failures: u32,
    current_retry_delay: Duration,
}

impl CircuitBreakerState {
    fn new(initial_delay: Duration) -> Self {
        Self {
            consecutive_failures: 0,
            current_retry_delay: initial_delay,
        }
    }

    fn record_failure(&mut self, max_delay: Duration) {
        self.consecutive_failures += 1;
        self.current_retry_delay = std::cmp::min(self.current_retry_delay * 2, max_delay);
    }

    fn reset(&mut self, initial_delay: Duration) {
        self.consecutive_failures = 0;
        self.current_retry_delay = initial_delay;
    }
}

/// Run `task_fn` forever, pausing `interval` between successful runs.
///
/// Returns the last error once `max_consecutive_failures` runs in a row
/// have failed.
pub async fn run_with_circuit_breaker<F, Fut>(
    task_name: &str,
    config: CircuitBreakerConfig,
    mut task_fn: F,
) -> String
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<(), String>>,
{
    let mut state = CircuitBreakerState::new(config.initial_retry_delay);

    loop {
        match task_fn().await {
            Ok(()) => {
                if state.consecutive_failures > 0 {
                    warn!(
                        "Task '{}' recovered after {} failures",
                        task_name, state.consecutive_failures
                    );
                }
                state.reset(config.initial_retry_delay);
                sleep(config.interval).await;
            }
            Err(e) => {
                state.record_failure(config.max_retry_delay);
                error!(
                    "Task '{}' failed (attempt {}/{}): {}",
                    task_name, state.consecutive_failures, config.max_consecutive_failures, e
                );

                if state.consecutive_failures >= config.max_consecutive_failures {
                    error!(
                        "Task '{}' stopped after {} consecutive failures. Last error: {}",
                        task_name, config.max_consecutive_failures, e
                    );
                    return e;
                }

                warn!(
                    "Task '{}' will retry in {:?}",
                    task_name, state.current_retry_delay
                );
                sleep(state.current_retry_delay).await;
            }
        }
    }
}

/// Periodic incremental order ingestion
pub async fn run_order_sync(
    service: Arc<StockLedgerService>,
    interval: Duration,
    max_failures: u32,
) -> String {
    let config = CircuitBreakerConfig {
        max_consecutive_failures: max_failures,
        interval,
        initial_retry_delay: Duration::from_secs(5),
        max_retry_delay: interval.max(Duration::from_secs(5)),
    };

    run_with_circuit_breaker("order_sync", config, || {
        let service = service.clone();
        async move {
            let result = service.sync_new_orders().await.map_err(|e| e.to_string())?;
            if result.processed > 0 || result.failed > 0 {
                info!(
                    "Order sync: {} processed, {} skipped, {} failed",
                    result.processed, result.skipped, result.failed
                );
            }
            for message in &result.errors {
                warn!("Order sync error: {}", message);
            }
            Ok(())
        }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::services::ledger_service::LedgerDependencies;
    use crate::config::{LedgerConfig, StaticSettings};
    use crate::infrastructure::in_memory::{
        InMemoryCatalog, InMemoryMovementRepository, InMemoryReconciliationRepository,
        InMemoryWatermarkStore,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast_config(max_failures: u32) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            max_consecutive_failures: max_failures,
            interval: Duration::from_millis(5),
            initial_retry_delay: Duration::from_millis(5),
            max_retry_delay: Duration::from_millis(20),
        }
    }

    #[tokio::test]
    async fn test_circuit_breaker_resets_on_success() {
        let attempt_count = Arc::new(AtomicUsize::new(0));
        let attempt_count_clone = attempt_count.clone();

        let handle = tokio::spawn(async move {
            run_with_circuit_breaker("test_task", fast_config(3), || {
                let count = attempt_count_clone.fetch_add(1, Ordering::SeqCst);
                async move {
                    // two failures, one success, two failures, ...
                    if count % 3 < 2 {
                        Err("Simulated failure".to_string())
                    } else {
                        Ok(())
                    }
                }
            })
            .await
        });

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!handle.is_finished());
        handle.abort();

        assert!(attempt_count.load(Ordering::SeqCst) >= 6);
    }

    #[tokio::test]
    async fn test_circuit_breaker_stops_after_max_failures() {
        let attempt_count = Arc::new(AtomicUsize::new(0));
        let attempt_count_clone = attempt_count.clone();

        let last_error = run_with_circuit_breaker("failing_task", fast_config(3), || {
            let count = attempt_count_clone.fetch_add(1, Ordering::SeqCst);
            async move { Err(format!("failure {}", count)) }
        })
        .await;

        assert_eq!(attempt_count.load(Ordering::SeqCst), 3);
        assert_eq!(last_error, "failure 2");
    }

    #[test]
    fn test_backoff_is_capped() {
        let mut state = CircuitBreakerState::new(Duration::from_millis(10));
        for _ in 0..10 {
            state.record_failure(Duration::from_millis(50));
        }
        assert_eq!(state.current_retry_delay, Duration::from_millis(50));
        assert_eq!(state.consecutive_failures, 10);

        state.reset(Duration::from_millis(10));
        assert_eq!(state.consecutive_failures, 0);
        assert_eq!(state.current_retry_delay, Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_order_sync_stops_when_source_is_down() {
        let catalog = Arc::new(InMemoryCatalog::new());
        catalog.set_unavailable(true);
        let deps = LedgerDependencies {
            movements: Arc::new(InMemoryMovementRepository::new()),
            reconciliations: Arc::new(InMemoryReconciliationRepository::new()),
            inventory: catalog.clone(),
            orders: catalog,
            settings: Arc::new(StaticSettings::new(false)),
            watermarks: Arc::new(InMemoryWatermarkStore::new()),
        };
        let service = Arc::new(StockLedgerService::new(deps, &LedgerConfig::default()));

        // first retry waits 5s; a single allowed failure returns at once
        let last_error = tokio::time::timeout(
            Duration::from_secs(2),
            run_order_sync(service, Duration::from_millis(10), 1),
        )
        .await
        .unwrap();
        assert!(last_error.contains("order source"));
    }
}
