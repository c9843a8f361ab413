use serde::{Deserialize, Serialize};

/// Catalog product as seen by the inventory source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub stock_quantity: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariationAttribute {
    pub name: String,
    pub option: String,
}

/// Product variation (size, colour, ...) with its own SKU
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variation {
    pub id: i64,
    /// Parent product id
    pub product_id: i64,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub attributes: Vec<VariationAttribute>,
    #[serde(default)]
    pub stock_quantity: Option<i64>,
}

impl Variation {
    pub fn display_name(&self, parent_name: &str) -> String {
        if self.attributes.is_empty() {
            return format!("{} (Variation)", parent_name);
        }
        let options = self
            .attributes
            .iter()
            .map(|attribute| attribute.option.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        format!("{} - {}", parent_name, options)
    }
}

/// Placeholder name for SKUs missing from the catalog
pub fn unknown_product_name(sku: &str) -> String {
    format!("Unknown Product (SKU: {})", sku)
}
