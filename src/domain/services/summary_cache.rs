use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::domain::entities::reconciliation::StockReconciliationSummary;
use crate::domain::errors::LedgerResult;

/// Cache performance statistics
#[derive(Clone, Debug, Default, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub invalidations: u64,
    /// Per-SKU failures of the most recent full computation
    pub last_errors: Vec<String>,
}

impl CacheStats {
    /// Calculate hit rate as percentage
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

#[derive(Default)]
struct CacheState {
    summaries: Option<Vec<StockReconciliationSummary>>,
    last_computed_at: Option<DateTime<Utc>>,
    /// Bumped on every invalidation; a recomputation started under an older
    /// generation is returned to its caller but not stored.
    generation: u64,
    stats: CacheStats,
}

/// Time-boxed memo of the full per-SKU summary set.
///
/// Invalidation is all-or-nothing: any ledger write clears the whole set.
/// The lock is never held while summaries are being computed.
pub struct SummaryCache {
    state: RwLock<CacheState>,
    ttl: Duration,
}

impl SummaryCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            state: RwLock::new(CacheState::default()),
            ttl,
        }
    }

    pub fn with_default_ttl() -> Self {
        Self::new(Duration::from_secs(300)) // 5 minutes default
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return the cached set when fresh, otherwise run `compute` and store
    /// its result. A failed recomputation falls back to whatever is cached,
    /// stale or not, and to an empty set when nothing is.
    pub async fn get_or_compute<F, Fut>(
        &self,
        force_refresh: bool,
        compute: F,
    ) -> Vec<StockReconciliationSummary>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = LedgerResult<Vec<StockReconciliationSummary>>>,
    {
        let generation = {
            let mut state = self.state.write().await;
            let fresh = !force_refresh
                && state.summaries.is_some()
                && state
                    .last_computed_at
                    .map(|computed_at| self.is_fresh(computed_at))
                    .unwrap_or(false);
            if fresh {
                let cached = state.summaries.clone().unwrap_or_default();
                state.stats.hits += 1;
                debug!(
                    entries = cached.len(),
                    cache_hit_rate = format!("{:.2}%", state.stats.hit_rate()),
                    "Cache hit - returning cached summaries"
                );
                return cached;
            }
            state.stats.misses += 1;
            state.generation
        };

        let started_at = Utc::now();
        match compute().await {
            Ok(summaries) => {
                let mut state = self.state.write().await;
                if state.generation == generation {
                    state.summaries = Some(summaries.clone());
                    state.last_computed_at = Some(started_at);
                    info!(
                        entries = summaries.len(),
                        force_refresh, "Summary set recomputed and cached"
                    );
                } else {
                    debug!("Cache invalidated during recomputation - result not stored");
                }
                summaries
            }
            Err(e) => {
                let state = self.state.read().await;
                warn!(
                    error = %e,
                    last_computed_at = ?state.last_computed_at,
                    "Summary recomputation failed - serving cached data"
                );
                state.summaries.clone().unwrap_or_default()
            }
        }
    }

    /// Drop the cached set unconditionally
    pub async fn invalidate(&self) {
        let mut state = self.state.write().await;
        state.summaries = None;
        state.last_computed_at = None;
        state.generation += 1;
        state.stats.invalidations += 1;
        debug!("Summary cache invalidated");
    }

    /// Replace the entries for the given summaries' SKUs in a populated set.
    /// Does nothing when the cache is empty and never touches the
    /// computation timestamp.
    pub async fn replace_entries(&self, fresh: Vec<StockReconciliationSummary>) -> bool {
        let mut state = self.state.write().await;
        let Some(summaries) = state.summaries.as_mut() else {
            return false;
        };
        for summary in fresh {
            match summaries.iter_mut().find(|s| s.sku == summary.sku) {
                Some(existing) => *existing = summary,
                None => summaries.push(summary),
            }
        }
        summaries.sort_by(|a, b| a.sku.cmp(&b.sku));
        true
    }

    /// Keep the per-SKU failures of a full computation for `stats`
    pub async fn record_errors(&self, errors: Vec<String>) {
        self.state.write().await.stats.last_errors = errors;
    }

    /// When the cached set was computed, for "last updated" displays
    pub async fn last_computed_at(&self) -> Option<DateTime<Utc>> {
        self.state.read().await.last_computed_at
    }

    pub async fn is_populated(&self) -> bool {
        self.state.read().await.summaries.is_some()
    }

    pub async fn stats(&self) -> CacheStats {
        self.state.read().await.stats.clone()
    }

    fn is_fresh(&self, computed_at: DateTime<Utc>) -> bool {
        (Utc::now() - computed_at)
            .to_std()
            .map(|age| age < self.ttl)
            .unwrap_or(false)
    }
}
