//! Concrete filter values. Prices are smallest-unit integers (cents)
//! end-to-end; only labels render dollars.

use serde::{Deserialize, Serialize};

/// An inclusive price window in cents. Either bound may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriceBand {
    pub min: Option<i64>,
    pub max: Option<i64>,
}

impl PriceBand {
    pub fn up_to(max_cents: i64) -> Self {
        Self { min: None, max: Some(max_cents) }
    }

    pub fn at_least(min_cents: i64) -> Self {
        Self { min: Some(min_cents), max: None }
    }

    pub fn between(min_cents: i64, max_cents: i64) -> Self {
        Self { min: Some(min_cents), max: Some(max_cents) }
    }

    pub fn contains(&self, price_cents: i64) -> bool {
        self.min.map(|min| price_cents >= min).unwrap_or(true)
            && self.max.map(|max| price_cents <= max).unwrap_or(true)
    }
}

impl std::fmt::Display for PriceBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.min, self.max) {
            (Some(min), Some(max)) => {
                write!(f, "{}-{}", format_price(min), format_price(max))
            }
            (None, Some(max)) => write!(f, "under {}", format_price(max)),
            (Some(min), None) => write!(f, "over {}", format_price(min)),
            (None, None) => f.write_str("any price"),
        }
    }
}

/// A concrete value assigned to a slot for the current session.
///
/// Untagged: a JSON object is a price band, a number is an integer, a
/// string is categorical or free text. The three shapes never overlap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SlotValue {
    Price(PriceBand),
    Int(i64),
    Text(String),
}

impl SlotValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            SlotValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_price(&self) -> Option<&PriceBand> {
        match self {
            SlotValue::Price(band) => Some(band),
            _ => None,
        }
    }

    /// Human-readable rendering for traces and "dropped filters" messages.
    pub fn render(&self) -> String {
        match self {
            SlotValue::Price(band) => band.to_string(),
            SlotValue::Int(value) => value.to_string(),
            SlotValue::Text(text) => text.clone(),
        }
    }
}

/// Render cents as a dollar label. Whole-dollar amounts omit the cents.
pub fn format_price(cents: i64) -> String {
    if cents % 100 == 0 {
        format!("${}", group_thousands(cents / 100))
    } else {
        format!("${}.{:02}", group_thousands(cents / 100), (cents % 100).abs())
    }
}

fn group_thousands(mut value: i64) -> String {
    let negative = value < 0;
    value = value.abs();
    let mut groups = Vec::new();
    loop {
        if value < 1000 {
            groups.push(value.to_string());
            break;
        }
        groups.push(format!("{:03}", value % 1000));
        value /= 1000;
    }
    groups.reverse();
    let joined = groups.join(",");
    if negative { format!("-{joined}") } else { joined }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_band_contains_respects_bounds() {
        let band = PriceBand::between(100_000, 150_000);
        assert!(band.contains(100_000));
        assert!(band.contains(150_000));
        assert!(!band.contains(99_999));
        assert!(!band.contains(150_001));
        assert!(PriceBand::default().contains(i64::MAX));
    }

    #[test]
    fn format_price_groups_thousands() {
        assert_eq!(format_price(149_900), "$1,499");
        assert_eq!(format_price(149_950), "$1,499.50");
        assert_eq!(format_price(2_500_000_00), "$2,500,000");
        assert_eq!(format_price(99), "$0.99");
    }

    #[test]
    fn slot_value_untagged_round_trip() {
        let values = vec![
            SlotValue::Text("NVIDIA".to_string()),
            SlotValue::Int(16),
            SlotValue::Price(PriceBand::up_to(150_000)),
        ];
        for value in values {
            let json = serde_json::to_string(&value).unwrap();
            let back: SlotValue = serde_json::from_str(&json).unwrap();
            assert_eq!(back, value);
        }
    }

    #[test]
    fn band_display_is_readable() {
        assert_eq!(PriceBand::up_to(150_000).to_string(), "under $1,500");
        assert_eq!(
            PriceBand::between(89_900, 119_900).to_string(),
            "$899-$1,199"
        );
    }
}
