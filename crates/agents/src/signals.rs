//! Typed outputs of the structured LLM calls, plus the conversion that
//! snaps raw model values onto the registry's closed sets.

use std::collections::BTreeMap;

use serde::Deserialize;
use tracing::debug;

use aisle_registry::{Domain, PriceBand, PriceScale, Registry, SlotKind, SlotValue, SoftPreferences};

// ── Domain detection ─────────────────────────────────────────────────────────

/// Raw wire shape of the detection stage.
#[derive(Debug, Deserialize)]
pub struct RawDomainDetection {
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub confidence: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DomainDetection {
    pub domain: Domain,
    pub confidence: f32,
}

impl DomainDetection {
    /// Confidence below 0.6 is treated as no detection at all.
    pub const CONFIDENCE_FLOOR: f32 = 0.6;

    pub fn from_raw(raw: RawDomainDetection) -> Self {
        let domain = if raw.confidence < Self::CONFIDENCE_FLOOR {
            Domain::Unknown
        } else {
            Domain::parse(&raw.domain)
        };
        Self { domain, confidence: raw.confidence }
    }
}

// ── Slot extraction ──────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawSoftPreferences {
    pub liked: Vec<String>,
    pub disliked: Vec<String>,
    pub notes: Option<String>,
}

/// Raw wire shape of the extraction stage. Filter values arrive as loose
/// JSON and are validated against the registry before use.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawExtraction {
    pub filters: BTreeMap<String, serde_json::Value>,
    pub soft_preferences: RawSoftPreferences,
    pub impatience: bool,
    pub asks_for_recommendations: bool,
}

/// Validated per-turn signals, ready to merge into session state.
#[derive(Debug, Default, Clone)]
pub struct ExtractedSignals {
    pub filters: BTreeMap<String, SlotValue>,
    pub soft_preferences: SoftPreferences,
    pub impatience: bool,
    pub asks_for_recommendations: bool,
}

impl ExtractedSignals {
    /// Coerce a loose filters map, snapping categorical values onto their
    /// closed sets and scaling budgets. Anything inadmissible is dropped.
    pub fn from_raw_filters(
        raw_filters: BTreeMap<String, serde_json::Value>,
        registry: &Registry,
        domain: Domain,
    ) -> BTreeMap<String, SlotValue> {
        let mut filters = BTreeMap::new();
        for (key, value) in raw_filters {
            let Some(slot) = registry.slot(domain, &key) else {
                debug!(%key, "dropping filter for unknown slot");
                continue;
            };
            if let Some(validated) = coerce_value(&slot.kind, &value) {
                filters.insert(key, validated);
            } else {
                debug!(%key, %value, "dropping inadmissible filter value");
            }
        }
        filters
    }

    /// Convert raw model output into validated per-turn signals.
    pub fn from_raw(raw: RawExtraction, registry: &Registry, domain: Domain) -> Self {
        Self {
            filters: Self::from_raw_filters(raw.filters, registry, domain),
            soft_preferences: SoftPreferences {
                liked: raw.soft_preferences.liked,
                disliked: raw.soft_preferences.disliked,
                notes: raw.soft_preferences.notes.unwrap_or_default(),
            },
            impatience: raw.impatience,
            asks_for_recommendations: raw.asks_for_recommendations,
        }
    }
}

/// Map one raw JSON value onto a slot's value shape.
fn coerce_value(kind: &SlotKind, value: &serde_json::Value) -> Option<SlotValue> {
    match kind {
        SlotKind::Categorical { allowed } => {
            let raw = value.as_str()?;
            allowed
                .iter()
                .find(|candidate| candidate.eq_ignore_ascii_case(raw.trim()))
                .map(|snapped| SlotValue::Text(snapped.clone()))
        }
        SlotKind::PriceRange { scale } => coerce_price(*scale, value),
        SlotKind::Integer => value.as_i64().map(SlotValue::Int),
        SlotKind::FreeText => value.as_str().map(|text| SlotValue::Text(text.trim().to_string())),
    }
}

fn coerce_price(scale: PriceScale, value: &serde_json::Value) -> Option<SlotValue> {
    if let Some(amount) = value.as_f64() {
        return Some(SlotValue::Price(PriceBand::up_to(to_cents(scale, amount))));
    }
    if let Some(object) = value.as_object() {
        let min = object.get("min").and_then(|v| v.as_f64()).map(|v| to_cents(scale, v));
        let max = object.get("max").and_then(|v| v.as_f64()).map(|v| to_cents(scale, v));
        if min.is_none() && max.is_none() {
            return None;
        }
        return Some(SlotValue::Price(PriceBand { min, max }));
    }
    None
}

/// Bare numbers in a thousands-scaled domain read as thousands of dollars
/// when small enough ("30" means $30,000, but "25000" already is dollars).
fn to_cents(scale: PriceScale, amount: f64) -> i64 {
    let dollars = match scale {
        PriceScale::Thousands if amount <= 1000.0 => amount * 1000.0,
        _ => amount,
    };
    (dollars * 100.0).round() as i64
}

// ── Question generation ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeneratedQuestion {
    pub question: String,
    pub quick_replies: Vec<String>,
    pub slot_key: String,
}

impl Default for GeneratedQuestion {
    fn default() -> Self {
        Self {
            question: String::new(),
            quick_replies: Vec::new(),
            slot_key: String::new(),
        }
    }
}

// ── Refinement classification ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefinementIntent {
    FilterChange,
    DomainSwitch,
    NewSearch,
    Research,
    Compare,
    Cart,
    Chat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CartOp {
    Favorite,
    Unfavorite,
    Add,
    Remove,
    Checkout,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefinementDecision {
    pub intent: RefinementIntent,
    #[serde(default)]
    pub filter_delta: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub target_product_ids: Vec<String>,
    #[serde(default)]
    pub target_domain: Option<String>,
    #[serde(default)]
    pub cart_op: Option<CartOp>,
}

impl RefinementDecision {
    pub fn chat() -> Self {
        Self {
            intent: RefinementIntent::Chat,
            filter_delta: BTreeMap::new(),
            target_product_ids: Vec::new(),
            target_domain: None,
            cart_op: None,
        }
    }
}
