//! Cross-domain product record. Domain detail blocks are carried verbatim
//! and stay opaque to the pipeline; only `attr` peeks inside for
//! diversification axes and filter matching.

use serde::{Deserialize, Serialize};

/// A single ranked candidate as returned by any search backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductSummary {
    pub id: String,
    pub product_type: String,
    pub name: String,
    pub brand: String,
    /// Smallest-unit integer (cents).
    pub price: i64,
    pub currency: String,
    pub image_url: Option<String>,
    pub available: bool,
    pub rating: f32,
    pub reviews_count: u32,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vehicle: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub laptop: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub book: Option<serde_json::Value>,
}

impl Default for ProductSummary {
    fn default() -> Self {
        Self {
            id: String::new(),
            product_type: String::new(),
            name: String::new(),
            brand: String::new(),
            price: 0,
            currency: "USD".to_string(),
            image_url: None,
            available: true,
            rating: 0.0,
            reviews_count: 0,
            description: String::new(),
            vehicle: None,
            laptop: None,
            book: None,
        }
    }
}

impl ProductSummary {
    /// Look up a categorical attribute by key: `brand` comes from the
    /// common fields, anything else from whichever detail block is present.
    pub fn attr(&self, key: &str) -> Option<String> {
        if key == "brand" || key == "make" {
            if self.brand.is_empty() {
                return None;
            }
            return Some(self.brand.clone());
        }
        for block in [&self.vehicle, &self.laptop, &self.book].into_iter().flatten() {
            if let Some(value) = block.get(key) {
                return match value {
                    serde_json::Value::String(text) => Some(text.clone()),
                    serde_json::Value::Number(number) => Some(number.to_string()),
                    serde_json::Value::Bool(flag) => Some(flag.to_string()),
                    _ => None,
                };
            }
        }
        None
    }

    /// Integer attribute from a detail block (e.g. `ram_gb`).
    pub fn attr_int(&self, key: &str) -> Option<i64> {
        for block in [&self.vehicle, &self.laptop, &self.book].into_iter().flatten() {
            if let Some(value) = block.get(key).and_then(|value| value.as_i64()) {
                return Some(value);
            }
        }
        None
    }

    /// One-line fingerprint used in refinement prompts so the classifier can
    /// resolve "the second one" or "the Dell".
    pub fn fingerprint(&self) -> String {
        format!(
            "{} | {} | {} | {}",
            self.id,
            self.name,
            self.brand,
            aisle_registry::format_price(self.price)
        )
    }
}
