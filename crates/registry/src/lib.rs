//! Read-only domain/slot registry — the single extension point for adding a
//! product vertical. A domain is a registry entry plus a search-backend
//! binding; nothing else in the pipeline is domain-specific.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

mod slots;
mod value;

pub use slots::builtin_domains;
pub use value::{PriceBand, SlotValue, format_price};

// ── Domain ───────────────────────────────────────────────────────────────────

/// A product vertical with its own slot schema and search backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Vehicles,
    Laptops,
    Books,
    Unknown,
}

impl Domain {
    pub fn as_str(self) -> &'static str {
        match self {
            Domain::Vehicles => "vehicles",
            Domain::Laptops => "laptops",
            Domain::Books => "books",
            Domain::Unknown => "unknown",
        }
    }

    /// Every domain that has a slot schema (excludes `Unknown`).
    pub fn known() -> &'static [Domain] {
        &[Domain::Vehicles, Domain::Laptops, Domain::Books]
    }

    pub fn parse(raw: &str) -> Domain {
        match raw.trim().to_lowercase().as_str() {
            "vehicles" | "vehicle" | "cars" | "car" => Domain::Vehicles,
            "laptops" | "laptop" | "computers" | "computer" => Domain::Laptops,
            "books" | "book" => Domain::Books,
            _ => Domain::Unknown,
        }
    }
}

impl std::fmt::Display for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Slots ────────────────────────────────────────────────────────────────────

/// Interview order prefers High, then Medium, then Low.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SlotPriority {
    High,
    Medium,
    Low,
}

/// Scale applied when the user gives a bare number as a budget.
/// Vehicle shoppers say "30" meaning $30,000; book shoppers mean $30.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceScale {
    Dollars,
    Thousands,
}

/// The value shape a slot accepts. Categorical slots carry their closed set
/// so the extractor's snap-to-allowed-value guarantee is checkable here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SlotKind {
    Categorical { allowed: Vec<String> },
    PriceRange { scale: PriceScale },
    FreeText,
    Integer,
}

/// A semantic preference dimension on a domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slot {
    pub key: String,
    pub priority: SlotPriority,
    pub kind: SlotKind,
    /// Scripted question used when LLM question generation is unavailable.
    pub example_prompt: String,
    pub example_replies: Vec<String>,
    /// The interview will not terminate until this slot has a value or the
    /// user signals impatience.
    pub required_for_search: bool,
}

impl Slot {
    /// Snap free text onto this slot's closed set (case-insensitive).
    /// Returns `None` for non-members and for non-categorical slots.
    pub fn snap(&self, raw: &str) -> Option<String> {
        match &self.kind {
            SlotKind::Categorical { allowed } => allowed
                .iter()
                .find(|candidate| candidate.eq_ignore_ascii_case(raw.trim()))
                .cloned(),
            _ => None,
        }
    }

    /// Whether `value` is admissible for this slot.
    pub fn accepts(&self, value: &SlotValue) -> bool {
        match (&self.kind, value) {
            (SlotKind::Categorical { allowed }, SlotValue::Text(text)) => {
                allowed.iter().any(|candidate| candidate == text)
            }
            (SlotKind::PriceRange { .. }, SlotValue::Price(_)) => true,
            (SlotKind::FreeText, SlotValue::Text(_)) => true,
            (SlotKind::Integer, SlotValue::Int(_)) => true,
            _ => false,
        }
    }
}

// ── Soft preferences ─────────────────────────────────────────────────────────

/// Free-text likes/dislikes used for ranking, never for hard filtering.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoftPreferences {
    pub liked: Vec<String>,
    pub disliked: Vec<String>,
    pub notes: String,
}

impl SoftPreferences {
    pub fn is_empty(&self) -> bool {
        self.liked.is_empty() && self.disliked.is_empty() && self.notes.is_empty()
    }

    /// Merge another set of signals in, de-duplicating case-insensitively.
    pub fn merge(&mut self, other: &SoftPreferences) {
        for item in &other.liked {
            if !self.liked.iter().any(|existing| existing.eq_ignore_ascii_case(item)) {
                self.liked.push(item.clone());
            }
        }
        for item in &other.disliked {
            if !self.disliked.iter().any(|existing| existing.eq_ignore_ascii_case(item)) {
                self.disliked.push(item.clone());
            }
        }
        if !other.notes.is_empty() {
            if self.notes.is_empty() {
                self.notes = other.notes.clone();
            } else {
                self.notes.push_str("; ");
                self.notes.push_str(&other.notes);
            }
        }
    }
}

// ── Registry ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct DomainSpec {
    pub domain: Domain,
    /// Free-text keywords the fuzzy corrector matches against.
    pub keywords: Vec<String>,
    pub slots: Vec<Slot>,
}

/// Static description of the supported domains and their slots.
#[derive(Debug, Clone)]
pub struct Registry {
    domains: Vec<DomainSpec>,
}

impl Registry {
    pub fn new(domains: Vec<DomainSpec>) -> Self {
        Self { domains }
    }

    /// The reference domain set: vehicles, laptops, books.
    pub fn builtin() -> Self {
        Self::new(builtin_domains())
    }

    pub fn domains(&self) -> impl Iterator<Item = Domain> + '_ {
        self.domains.iter().map(|spec| spec.domain)
    }

    pub fn spec(&self, domain: Domain) -> Option<&DomainSpec> {
        self.domains.iter().find(|spec| spec.domain == domain)
    }

    pub fn slots(&self, domain: Domain) -> &[Slot] {
        self.spec(domain).map(|spec| spec.slots.as_slice()).unwrap_or(&[])
    }

    pub fn slot(&self, domain: Domain, key: &str) -> Option<&Slot> {
        self.slots(domain).iter().find(|slot| slot.key == key)
    }

    /// Slots in the order the interview asks them: priority tier first,
    /// registry order within a tier.
    pub fn interview_order(&self, domain: Domain) -> Vec<&Slot> {
        let mut ordered: Vec<(usize, &Slot)> = self.slots(domain).iter().enumerate().collect();
        ordered.sort_by_key(|(index, slot)| (slot.priority, *index));
        ordered.into_iter().map(|(_, slot)| slot).collect()
    }

    /// Keys of categorical slots, used as candidate diversification axes.
    pub fn categorical_keys(&self, domain: Domain) -> Vec<String> {
        self.slots(domain)
            .iter()
            .filter(|slot| matches!(slot.kind, SlotKind::Categorical { .. }))
            .map(|slot| slot.key.clone())
            .collect()
    }

    /// All `(keyword, domain)` pairs for fuzzy domain correction.
    pub fn keyword_table(&self) -> Vec<(String, Domain)> {
        self.domains
            .iter()
            .flat_map(|spec| {
                spec.keywords
                    .iter()
                    .map(move |keyword| (keyword.clone(), spec.domain))
            })
            .collect()
    }

    /// Drop filter entries that are not admissible for their slot.
    /// Unknown keys and out-of-set categorical values are removed.
    pub fn sanitize_filters(
        &self,
        domain: Domain,
        filters: &mut BTreeMap<String, SlotValue>,
    ) {
        filters.retain(|key, value| {
            self.slot(domain, key)
                .map(|slot| slot.accepts(value))
                .unwrap_or(false)
        });
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::builtin()
    }
}
