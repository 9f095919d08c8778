//! Prompt templates and JSON schemas for the structured stages. Prompts are
//! assembled from labeled blocks; schemas describe the exact record the
//! model must populate.

use serde_json::json;

use aisle_registry::{Domain, Registry, SlotKind, SlotValue};
use aisle_search::ProductSummary;
use aisle_session::ChatTurn;

use std::collections::BTreeMap;

pub fn conversation_block(tail: &[&ChatTurn]) -> String {
    if tail.is_empty() {
        return "(none yet)".to_string();
    }
    tail.iter()
        .map(|turn| {
            let role = match turn.role {
                aisle_session::ChatRole::User => "User",
                aisle_session::ChatRole::Assistant => "Assistant",
            };
            format!("{role}: {}", turn.text)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn filters_block(filters: &BTreeMap<String, SlotValue>) -> String {
    if filters.is_empty() {
        return "(none)".to_string();
    }
    filters
        .iter()
        .map(|(key, value)| format!("- {key}: {}", value.render()))
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Domain detection ─────────────────────────────────────────────────────────

pub fn domain_detection_prompt(
    message: &str,
    tail: &[&ChatTurn],
    active_domain: Option<Domain>,
    registry: &Registry,
) -> String {
    let domains = registry
        .domains()
        .map(|domain| domain.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "Classify the shopping domain of the latest message.\n\
         Supported domains: {domains}. Use \"unknown\" when none clearly applies.\n\
         Currently active domain: {active}.\n\n\
         RECENT CONVERSATION:\n{conversation}\n\n\
         LATEST USER MESSAGE:\n{message}",
        active = active_domain.map(|d| d.as_str()).unwrap_or("none"),
        conversation = conversation_block(tail),
    )
}

pub fn domain_detection_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "domain": { "type": "string" },
            "confidence": { "type": "number", "minimum": 0.0, "maximum": 1.0 }
        },
        "required": ["domain", "confidence"],
        "additionalProperties": false
    })
}

// ── Slot extraction ──────────────────────────────────────────────────────────

pub fn slot_extraction_prompt(message: &str, domain: Domain, registry: &Registry) -> String {
    let slot_lines = registry
        .slots(domain)
        .iter()
        .map(|slot| match &slot.kind {
            SlotKind::Categorical { allowed } => {
                format!("- {} (one of: {})", slot.key, allowed.join(", "))
            }
            SlotKind::PriceRange { scale } => format!(
                "- {} (number or {{min,max}}; bare numbers are {})",
                slot.key,
                match scale {
                    aisle_registry::PriceScale::Thousands => "thousands of dollars",
                    aisle_registry::PriceScale::Dollars => "dollars",
                }
            ),
            SlotKind::Integer => format!("- {} (integer)", slot.key),
            SlotKind::FreeText => format!("- {} (free text)", slot.key),
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Extract shopping preferences from the latest message.\n\
         Domain: {domain}. Fill only slots the message actually mentions; omit\n\
         everything else. Categorical values must be copied from the allowed set.\n\
         Also report soft preferences (likes/dislikes used for ranking only),\n\
         whether the user sounds impatient, and whether they explicitly ask to\n\
         see recommendations.\n\n\
         SLOTS:\n{slot_lines}\n\n\
         LATEST USER MESSAGE:\n{message}"
    )
}

pub fn slot_extraction_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "filters": { "type": "object" },
            "soft_preferences": {
                "type": "object",
                "properties": {
                    "liked": { "type": "array", "items": { "type": "string" } },
                    "disliked": { "type": "array", "items": { "type": "string" } },
                    "notes": { "type": "string" }
                },
                "additionalProperties": false
            },
            "impatience": { "type": "boolean" },
            "asks_for_recommendations": { "type": "boolean" }
        },
        "required": ["filters", "impatience", "asks_for_recommendations"],
        "additionalProperties": false
    })
}

// ── Question generation ──────────────────────────────────────────────────────

pub fn question_prompt(
    domain: Domain,
    slot_key: &str,
    filters: &BTreeMap<String, SlotValue>,
    tail: &[&ChatTurn],
) -> String {
    format!(
        "Write the next interview question.\n\
         Domain: {domain}. Ask about the \"{slot_key}\" slot, in one friendly\n\
         sentence, with 2-4 short quick replies. The question must end with an\n\
         open invitation such as \"or feel free to share anything else you care\n\
         about\". Do not repeat anything already known.\n\n\
         KNOWN FILTERS:\n{filters}\n\n\
         RECENT CONVERSATION:\n{conversation}",
        filters = filters_block(filters),
        conversation = conversation_block(tail),
    )
}

pub fn question_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "question": { "type": "string" },
            "quick_replies": { "type": "array", "items": { "type": "string" } },
            "slot_key": { "type": "string" }
        },
        "required": ["question", "quick_replies", "slot_key"],
        "additionalProperties": false
    })
}

// ── Recommendation explanation ───────────────────────────────────────────────

pub fn explanation_prompt(
    top: &[ProductSummary],
    filters: &BTreeMap<String, SlotValue>,
    soft_notes: &str,
) -> String {
    let product_lines = top
        .iter()
        .map(|product| format!("- {}", product.fingerprint()))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Summarize why these recommendations fit.\n\
         Write 2-4 sentences, name exactly one standout product, and explain\n\
         the theme of the rows. No bullet lists.\n\n\
         TOP CANDIDATES:\n{product_lines}\n\n\
         USER FILTERS:\n{filters}\n\n\
         SOFT PREFERENCES:\n{soft}",
        filters = filters_block(filters),
        soft = if soft_notes.is_empty() { "(none)" } else { soft_notes },
    )
}

pub fn explanation_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": { "message": { "type": "string" } },
        "required": ["message"],
        "additionalProperties": false
    })
}

// ── Post-recommendation refinement ───────────────────────────────────────────

pub fn refinement_prompt(
    message: &str,
    last_results: &[ProductSummary],
    filters: &BTreeMap<String, SlotValue>,
) -> String {
    let shown = last_results
        .iter()
        .map(|product| format!("- {}", product.fingerprint()))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Classify the follow-up message after recommendations.\n\
         Intents: filter_change (adjusts constraints), domain_switch (pivots to\n\
         a different product vertical; set target_domain), new_search (fresh\n\
         open query in the same domain), research (wants details), compare\n\
         (wants products compared), cart (favorite/add/remove/checkout; set\n\
         cart_op), chat (small talk). Resolve references like \"the second\n\
         one\" against the shown products and return their ids.\n\n\
         PRODUCTS CURRENTLY SHOWN:\n{shown}\n\n\
         CURRENT FILTERS:\n{filters}\n\n\
         LATEST USER MESSAGE:\n{message}",
        filters = filters_block(filters),
    )
}

pub fn refinement_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "intent": {
                "type": "string",
                "enum": ["filter_change", "domain_switch", "new_search", "research", "compare", "cart", "chat"]
            },
            "filter_delta": { "type": "object" },
            "target_product_ids": { "type": "array", "items": { "type": "string" } },
            "target_domain": { "type": "string" },
            "cart_op": {
                "type": "string",
                "enum": ["favorite", "unfavorite", "add", "remove", "checkout"]
            }
        },
        "required": ["intent"],
        "additionalProperties": false
    })
}

// ── Small talk ───────────────────────────────────────────────────────────────

pub fn chat_reply_prompt(message: &str, tail: &[&ChatTurn]) -> String {
    format!(
        "Reply to the shopper's small talk.\n\
         One or two friendly sentences; gently steer back to the products\n\
         currently on screen.\n\n\
         RECENT CONVERSATION:\n{conversation}\n\n\
         LATEST USER MESSAGE:\n{message}",
        conversation = conversation_block(tail),
    )
}

pub fn chat_reply_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": { "message": { "type": "string" } },
        "required": ["message"],
        "additionalProperties": false
    })
}
