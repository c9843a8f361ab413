use crate::domain::errors::LedgerResult;
use crate::domain::repositories::SettingsStore;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Runtime configuration for the stock ledger
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub database_url: String,
    pub database_max_connections: u32,
    pub bind_address: String,

    // Summary cache and batch computation
    pub summary_cache_ttl_seconds: u64, // How long a computed summary set stays fresh
    pub summary_batch_size: usize,      // Concurrent summary computations per batch
    pub store_timeout_milliseconds: u64, // Per-call timeout for store and source calls

    // Order ingestion
    pub exclude_on_hold_orders: bool, // Derive sales from orders on read, skip on-hold
    pub order_sync_enabled: bool,
    pub order_sync_interval_seconds: u64,
    pub order_sync_max_failures: u32,

    // Storefront REST API
    pub storefront_url: Option<String>,
    pub storefront_key: Option<String>,
    pub storefront_secret: Option<String>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://data/stockledger.db".to_string(),
            database_max_connections: 5,
            bind_address: "127.0.0.1:3000".to_string(),

            summary_cache_ttl_seconds: 300, // 5 minutes
            summary_batch_size: 5,
            store_timeout_milliseconds: 10000,

            exclude_on_hold_orders: false,
            order_sync_enabled: true,
            order_sync_interval_seconds: 300,
            order_sync_max_failures: 5,

            storefront_url: None,
            storefront_key: None,
            storefront_secret: None,
        }
    }
}

fn parse_flag(value: &str) -> bool {
    value.to_lowercase() == "true" || value == "1"
}

impl LedgerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> LedgerConfig {
        let mut config = LedgerConfig::default();

        if let Ok(url) = std::env::var("DATABASE_URL") {
            if !url.trim().is_empty() {
                config.database_url = url;
            }
        }

        if let Ok(max) = std::env::var("DATABASE_MAX_CONNECTIONS") {
            match max.parse::<u32>() {
                Ok(value) if (1..=100).contains(&value) => config.database_max_connections = value,
                _ => tracing::warn!(
                    "Invalid DATABASE_MAX_CONNECTIONS '{}', using default: {}",
                    max,
                    config.database_max_connections
                ),
            }
        }

        if let Ok(address) = std::env::var("BIND_ADDRESS") {
            if !address.trim().is_empty() {
                config.bind_address = address;
            }
        }

        if let Ok(ttl) = std::env::var("SUMMARY_CACHE_TTL_SECONDS") {
            match ttl.parse::<u64>() {
                Ok(value) if value <= 86400 => config.summary_cache_ttl_seconds = value,
                Ok(value) => tracing::warn!(
                    "Invalid SUMMARY_CACHE_TTL_SECONDS value: {} (must be at most 86400), using default: {}",
                    value,
                    config.summary_cache_ttl_seconds
                ),
                Err(e) => tracing::warn!(
                    "Failed to parse SUMMARY_CACHE_TTL_SECONDS '{}': {}, using default: {}",
                    ttl,
                    e,
                    config.summary_cache_ttl_seconds
                ),
            }
        }

        if let Ok(batch) = std::env::var("SUMMARY_BATCH_SIZE") {
            match batch.parse::<usize>() {
                Ok(value) if (1..=50).contains(&value) => config.summary_batch_size = value,
                _ => tracing::warn!(
                    "Invalid SUMMARY_BATCH_SIZE '{}' (must be between 1 and 50), using default: {}",
                    batch,
                    config.summary_batch_size
                ),
            }
        }

        if let Ok(timeout) = std::env::var("STORE_TIMEOUT_MILLISECONDS") {
            match timeout.parse::<u64>() {
                Ok(value) if (100..=120000).contains(&value) => {
                    config.store_timeout_milliseconds = value
                }
                _ => tracing::warn!(
                    "Invalid STORE_TIMEOUT_MILLISECONDS '{}' (must be between 100 and 120000), using default: {}",
                    timeout,
                    config.store_timeout_milliseconds
                ),
            }
        }

        if let Ok(exclude) = std::env::var("EXCLUDE_ON_HOLD_ORDERS") {
            config.exclude_on_hold_orders = parse_flag(&exclude);
        }

        if let Ok(enabled) = std::env::var("ORDER_SYNC_ENABLED") {
            config.order_sync_enabled = parse_flag(&enabled);
        }

        if let Ok(interval) = std::env::var("ORDER_SYNC_INTERVAL_SECONDS") {
            if let Ok(value) = interval.parse::<u64>() {
                if (30..=86400).contains(&value) {
                    config.order_sync_interval_seconds = value;
                }
            }
        }

        if let Ok(failures) = std::env::var("ORDER_SYNC_MAX_FAILURES") {
            if let Ok(value) = failures.parse::<u32>() {
                if (1..=100).contains(&value) {
                    config.order_sync_max_failures = value;
                }
            }
        }

        config.storefront_url = std::env::var("STOREFRONT_URL").ok().filter(|s| !s.is_empty());
        config.storefront_key = std::env::var("STOREFRONT_KEY").ok().filter(|s| !s.is_empty());
        config.storefront_secret = std::env::var("STOREFRONT_SECRET")
            .ok()
            .filter(|s| !s.is_empty());

        config
    }

    pub fn summary_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.summary_cache_ttl_seconds)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_milliseconds)
    }

    pub fn order_sync_interval(&self) -> Duration {
        Duration::from_secs(self.order_sync_interval_seconds)
    }
}

/// Settings store backed by the loaded configuration. The flag can be
/// flipped at runtime.
#[derive(Debug, Default)]
pub struct StaticSettings {
    exclude_on_hold_orders: AtomicBool,
}

impl StaticSettings {
    pub fn new(exclude_on_hold_orders: bool) -> Self {
        Self {
            exclude_on_hold_orders: AtomicBool::new(exclude_on_hold_orders),
        }
    }

    pub fn from_config(config: &LedgerConfig) -> Self {
        Self::new(config.exclude_on_hold_orders)
    }

    pub fn set_exclude_on_hold_orders(&self, value: bool) {
        self.exclude_on_hold_orders.store(value, Ordering::SeqCst);
    }
}

#[async_trait]
impl SettingsStore for StaticSettings {
    async fn exclude_on_hold_orders(&self) -> LedgerResult<bool> {
        Ok(self.exclude_on_hold_orders.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LedgerConfig::default();
        assert_eq!(config.summary_cache_ttl(), Duration::from_secs(300));
        assert_eq!(config.summary_batch_size, 5);
        assert!(!config.exclude_on_hold_orders);
        assert!(config.storefront_url.is_none());
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("true"));
        assert!(parse_flag("TRUE"));
        assert!(parse_flag("1"));
        assert!(!parse_flag("yes"));
        assert!(!parse_flag("0"));
    }

    #[tokio::test]
    async fn test_static_settings_toggle() {
        let settings = StaticSettings::new(false);
        assert!(!settings.exclude_on_hold_orders().await.unwrap());
        settings.set_exclude_on_hold_orders(true);
        assert!(settings.exclude_on_hold_orders().await.unwrap());
    }
}
