//! Storefront REST client
//!
//! Reads orders, products and variations from a WooCommerce-style REST API
//! (`/orders`, `/products`, `/products/{id}/variations/{id}`) using basic
//! auth with the store's consumer key and secret.

use crate::config::LedgerConfig;
use crate::domain::entities::order::{LineItem, Order, OrderStatus};
use crate::domain::entities::product::{Product, Variation, VariationAttribute};
use crate::domain::errors::{LedgerError, LedgerResult};
use crate::domain::repositories::{InventorySource, OrderSource};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Orders requested per page
const ORDERS_PER_PAGE: usize = 100;

/// Upper bound on pages fetched in one order read
const MAX_ORDER_PAGES: usize = 500;

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Invalid storefront URL: {0}")]
    InvalidUrl(String),

    #[error("Storefront request failed: {0}")]
    Network(String),

    #[error("Storefront API error: {status} - {body}")]
    Api { status: u16, body: String },

    #[error("Failed to parse storefront response: {0}")]
    Parse(String),
}

impl From<SourceError> for LedgerError {
    fn from(error: SourceError) -> Self {
        LedgerError::upstream(error.to_string())
    }
}

/// Storefront connection settings
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// REST API root, e.g. "https://shop.example.com/wp-json/wc/v3"
    pub api_base: String,
    pub consumer_key: String,
    pub consumer_secret: String,
    pub timeout: Duration,
}

impl StorefrontConfig {
    /// Storefront settings when URL, key and secret are all configured
    pub fn from_ledger_config(config: &LedgerConfig) -> Option<Self> {
        Some(Self {
            api_base: config.storefront_url.clone()?,
            consumer_key: config.storefront_key.clone()?,
            consumer_secret: config.storefront_secret.clone()?,
            timeout: config.store_timeout(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct WireLineItem {
    #[serde(default)]
    sku: Option<String>,
    quantity: i64,
    #[serde(default)]
    product_id: i64,
    #[serde(default)]
    variation_id: i64,
}

#[derive(Debug, Deserialize)]
struct WireOrder {
    #[serde(default)]
    id: i64,
    #[serde(default)]
    number: Option<String>,
    status: OrderStatus,
    date_created_gmt: String,
    #[serde(default)]
    date_completed_gmt: Option<String>,
    #[serde(default)]
    line_items: Vec<WireLineItem>,
}

#[derive(Debug, Deserialize)]
struct WireProduct {
    id: i64,
    #[serde(default)]
    parent_id: i64,
    name: String,
    #[serde(default)]
    sku: Option<String>,
    #[serde(default)]
    stock_quantity: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct WireVariation {
    id: i64,
    #[serde(default)]
    sku: Option<String>,
    #[serde(default)]
    stock_quantity: Option<i64>,
    #[serde(default)]
    attributes: Vec<VariationAttribute>,
}

/// Non-zero id, the storefront's "none" being 0
fn optional_id(id: i64) -> Option<i64> {
    (id != 0).then_some(id)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// GMT timestamps come without an offset ("2024-03-01T10:00:00")
fn parse_gmt(value: &str) -> Result<DateTime<Utc>, SourceError> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S")
        .map(|naive| naive.and_utc())
        .map_err(|e| SourceError::Parse(format!("invalid timestamp '{}': {}", value, e)))
}

impl TryFrom<WireOrder> for Order {
    type Error = SourceError;

    fn try_from(wire: WireOrder) -> Result<Self, Self::Error> {
        let date_completed = match non_empty(wire.date_completed_gmt) {
            Some(value) => Some(parse_gmt(&value)?),
            None => None,
        };
        Ok(Order {
            number: non_empty(wire.number).unwrap_or_else(|| wire.id.to_string()),
            status: wire.status,
            date_created: parse_gmt(&wire.date_created_gmt)?,
            date_completed,
            line_items: wire
                .line_items
                .into_iter()
                .map(|item| LineItem {
                    sku: item.sku.map(|sku| sku.trim().to_string()).unwrap_or_default(),
                    quantity: item.quantity,
                    product_id: optional_id(item.product_id),
                    variation_id: optional_id(item.variation_id),
                })
                .collect(),
        })
    }
}

/// Convert one page of orders, skipping any that cannot be converted
fn parse_orders(page: Vec<WireOrder>) -> Vec<Order> {
    page.into_iter()
        .filter_map(|wire| {
            let id = wire.id;
            match Order::try_from(wire) {
                Ok(order) => Some(order),
                Err(e) => {
                    warn!(order = id, error = %e, "Skipping unparseable order");
                    None
                }
            }
        })
        .collect()
}

pub struct StorefrontClient {
    client: Client,
    base: Url,
    config: StorefrontConfig,
}

impl StorefrontClient {
    pub fn new(config: StorefrontConfig) -> Result<Self, SourceError> {
        let mut base = config.api_base.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base = Url::parse(&base).map_err(|e| SourceError::InvalidUrl(e.to_string()))?;
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent("stockledger/0.1.0")
            .build()
            .map_err(|e| SourceError::Network(e.to_string()))?;

        info!("Storefront client configured for {}", base);
        Ok(Self {
            client,
            base,
            config,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, SourceError> {
        self.base
            .join(path)
            .map_err(|e| SourceError::InvalidUrl(e.to_string()))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, SourceError> {
        let url = self.endpoint(path)?;
        debug!("GET {} {:?}", url, query);

        let response = self
            .client
            .get(url)
            .basic_auth(&self.config.consumer_key, Some(&self.config.consumer_secret))
            .query(query)
            .send()
            .await
            .map_err(|e| SourceError::Network(format!("{}: {}", path, e)))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::Api { status, body });
        }

        response
            .json()
            .await
            .map_err(|e| SourceError::Parse(format!("{}: {}", path, e)))
    }

    async fn find_by_sku(&self, sku: &str) -> Result<Vec<WireProduct>, SourceError> {
        self.get_json("products", &[("sku", sku.to_string())]).await
    }
}

#[async_trait]
impl OrderSource for StorefrontClient {
    async fn get_all_orders(&self) -> LedgerResult<Vec<Order>> {
        let mut orders = Vec::new();
        for page in 1..=MAX_ORDER_PAGES {
            let batch: Vec<WireOrder> = self
                .get_json(
                    "orders",
                    &[
                        ("per_page", ORDERS_PER_PAGE.to_string()),
                        ("page", page.to_string()),
                    ],
                )
                .await?;
            let fetched = batch.len();
            orders.extend(parse_orders(batch));
            if fetched < ORDERS_PER_PAGE {
                break;
            }
        }

        debug!("Fetched {} orders from storefront", orders.len());
        Ok(orders)
    }
}

#[async_trait]
impl InventorySource for StorefrontClient {
    async fn get_product_by_sku(&self, sku: &str) -> LedgerResult<Option<Product>> {
        let matches = self.find_by_sku(sku).await?;
        Ok(matches
            .into_iter()
            .find(|p| p.parent_id == 0 && p.sku.as_deref() == Some(sku))
            .map(|p| Product {
                id: p.id,
                name: p.name,
                sku: non_empty(p.sku),
                stock_quantity: p.stock_quantity,
            }))
    }

    async fn get_variation_by_sku(&self, sku: &str) -> LedgerResult<Option<Variation>> {
        let matches = self.find_by_sku(sku).await?;
        let Some(found) = matches
            .into_iter()
            .find(|p| p.parent_id != 0 && p.sku.as_deref() == Some(sku))
        else {
            return Ok(None);
        };

        let wire: WireVariation = self
            .get_json(
                &format!("products/{}/variations/{}", found.parent_id, found.id),
                &[],
            )
            .await?;
        Ok(Some(Variation {
            id: wire.id,
            product_id: found.parent_id,
            sku: non_empty(wire.sku),
            attributes: wire.attributes,
            stock_quantity: wire.stock_quantity,
        }))
    }

    async fn get_product_name_by_id(&self, product_id: i64) -> LedgerResult<Option<String>> {
        match self
            .get_json::<WireProduct>(&format!("products/{}", product_id), &[])
            .await
        {
            Ok(product) => Ok(Some(product.name)),
            Err(SourceError::Api { status: 404, .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
