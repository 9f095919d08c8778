//! Shapes a ranked candidate list into R labeled rows of up to P items,
//! grouped along whichever categorical axis spreads the candidates widest.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use aisle_registry::format_price;

use crate::product::ProductSummary;

pub const PRICE_AXIS: &str = "price_bucket";

#[derive(Debug, Clone)]
pub struct DiversifyConfig {
    pub rows: usize,
    pub per_row: usize,
    /// Minimum entropy (nats) an axis must reach to beat the price fallback.
    pub entropy_floor: f64,
    /// Categorical axes to consider besides price; usually the domain's
    /// categorical slot keys plus `brand`.
    pub axes: Vec<String>,
}

impl Default for DiversifyConfig {
    fn default() -> Self {
        Self {
            rows: 3,
            per_row: 3,
            entropy_floor: 0.5,
            axes: vec!["brand".to_string()],
        }
    }
}

/// A labeled horizontal group of recommendations sharing a dimension value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationRow {
    pub label: String,
    pub dimension: String,
    pub value: String,
    pub items: Vec<ProductSummary>,
}

/// Group `candidates` (already ranked) into rows. Every candidate appears
/// in at most one row; ranking order is preserved within a row.
pub fn diversify(candidates: &[ProductSummary], config: &DiversifyConfig) -> Vec<RecommendationRow> {
    if candidates.is_empty() {
        return Vec::new();
    }

    let price_values = price_bucket_values(candidates, config.rows);
    let price_entropy = entropy(&price_values);

    let mut chosen_axis = PRICE_AXIS.to_string();
    let mut chosen_values = price_values;
    let mut best_entropy = price_entropy;
    for axis in &config.axes {
        let values: Vec<Option<String>> =
            candidates.iter().map(|candidate| candidate.attr(axis)).collect();
        let axis_entropy = entropy(&values);
        if axis_entropy > best_entropy && axis_entropy > config.entropy_floor {
            chosen_axis = axis.clone();
            chosen_values = values;
            best_entropy = axis_entropy;
        }
    }
    debug!(axis = %chosen_axis, entropy = best_entropy, "diversification axis chosen");

    // Rank axis values by entropy contribution (-p ln p), frequency as the
    // tiebreaker, value text as the final deterministic tiebreaker.
    let mut frequency: BTreeMap<&str, usize> = BTreeMap::new();
    for value in chosen_values.iter().flatten() {
        *frequency.entry(value.as_str()).or_default() += 1;
    }
    let total = chosen_values.iter().flatten().count() as f64;
    let mut ranked_values: Vec<(&str, usize)> = frequency.into_iter().collect();
    ranked_values.sort_by(|a, b| {
        let contribution = |count: usize| {
            let p = count as f64 / total;
            -p * p.ln()
        };
        contribution(b.1)
            .partial_cmp(&contribution(a.1))
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(b.1.cmp(&a.1))
            .then(a.0.cmp(b.0))
    });

    let mut used = vec![false; candidates.len()];
    let mut rows: Vec<RecommendationRow> = Vec::new();
    for (value, _) in ranked_values.into_iter().take(config.rows) {
        let mut items = Vec::new();
        for (index, candidate) in candidates.iter().enumerate() {
            if items.len() == config.per_row {
                break;
            }
            if chosen_values[index].as_deref() == Some(value) && !used[index] {
                used[index] = true;
                items.push(candidate.clone());
            }
        }
        if items.is_empty() {
            continue;
        }
        rows.push(RecommendationRow {
            label: row_label(&chosen_axis, value, &items),
            dimension: chosen_axis.clone(),
            value: value.to_string(),
            items,
        });
    }

    // Top up short rows with the best-ranked leftovers, then synthesize
    // filler rows until the grid is full or candidates run out.
    let mut leftovers: std::collections::VecDeque<usize> =
        (0..candidates.len()).filter(|&index| !used[index]).collect();
    for row in &mut rows {
        while row.items.len() < config.per_row {
            let Some(index) = leftovers.pop_front() else { break };
            row.items.push(candidates[index].clone());
        }
    }
    let filler_labels = ["Top Rated", "More Matches", "Also Worth a Look"];
    let mut filler = 0;
    while rows.len() < config.rows && !leftovers.is_empty() {
        let mut items = Vec::new();
        while items.len() < config.per_row {
            let Some(index) = leftovers.pop_front() else { break };
            items.push(candidates[index].clone());
        }
        let label = filler_labels[filler.min(filler_labels.len() - 1)].to_string();
        filler += 1;
        rows.push(RecommendationRow {
            label,
            dimension: "rank".to_string(),
            value: format!("tier-{}", rows.len() + 1),
            items,
        });
    }

    rows
}

/// Shannon entropy (nats) of the value distribution; `None`s are skipped.
fn entropy(values: &[Option<String>]) -> f64 {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for value in values.iter().flatten() {
        *counts.entry(value.as_str()).or_default() += 1;
    }
    let total: usize = counts.values().sum();
    if total == 0 {
        return 0.0;
    }
    counts
        .values()
        .map(|&count| {
            let p = count as f64 / total as f64;
            -p * p.ln()
        })
        .sum()
}

/// Quantile price buckets: `rows` tiers over the sorted candidate prices.
fn price_bucket_values(candidates: &[ProductSummary], rows: usize) -> Vec<Option<String>> {
    let mut prices: Vec<i64> = candidates.iter().map(|candidate| candidate.price).collect();
    prices.sort_unstable();
    let tiers = rows.max(1);
    let bucket_of = |price: i64| -> usize {
        // Rank-based tiering keeps buckets near-equal even with skewed prices.
        let rank = prices.partition_point(|&p| p < price);
        (rank * tiers / prices.len()).min(tiers - 1)
    };
    candidates
        .iter()
        .map(|candidate| Some(format!("tier-{}", bucket_of(candidate.price))))
        .collect()
}

fn row_label(axis: &str, value: &str, items: &[ProductSummary]) -> String {
    match axis {
        PRICE_AXIS => {
            let min = items.iter().map(|item| item.price).min().unwrap_or(0);
            let max = items.iter().map(|item| item.price).max().unwrap_or(0);
            let range = if min == max {
                format_price(min)
            } else {
                format!("{}-{}", format_price(min), format_price(max))
            };
            let tier = match value {
                "tier-0" => "Budget-Friendly",
                "tier-1" => "Mid-Range",
                _ => "Premium",
            };
            format!("{tier} ({range})")
        }
        "use_case" => format!("{} Focus", title_case(value)),
        "brand" | "make" => format!("{} Lineup", title_case(value)),
        "genre" => format!("{} Picks", title_case(value)),
        _ => title_case(value),
    }
}

fn title_case(value: &str) -> String {
    value
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn laptop(id: &str, price: i64, use_case: &str, brand: &str) -> ProductSummary {
        ProductSummary {
            id: id.to_string(),
            product_type: "laptop".to_string(),
            name: format!("Model {id}"),
            brand: brand.to_string(),
            price,
            laptop: Some(json!({"use_case": use_case})),
            ..Default::default()
        }
    }

    fn mixed_candidates() -> Vec<ProductSummary> {
        vec![
            laptop("a", 89_900, "gaming", "Asus"),
            laptop("b", 99_900, "work", "Dell"),
            laptop("c", 109_900, "school", "Lenovo"),
            laptop("d", 119_900, "gaming", "Asus"),
            laptop("e", 129_900, "work", "Dell"),
            laptop("f", 139_900, "school", "HP"),
            laptop("g", 149_900, "gaming", "Asus"),
            laptop("h", 159_900, "work", "Dell"),
            laptop("i", 169_900, "school", "Lenovo"),
        ]
    }

    fn config_with(axes: &[&str]) -> DiversifyConfig {
        DiversifyConfig {
            axes: axes.iter().map(|axis| axis.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn produces_full_grid_with_distinct_labels() {
        let rows = diversify(&mixed_candidates(), &config_with(&["use_case", "brand"]));
        assert_eq!(rows.len(), 3);
        for row in &rows {
            assert!(!row.items.is_empty() && row.items.len() <= 3);
        }
        let mut labels: Vec<&str> = rows.iter().map(|row| row.label.as_str()).collect();
        labels.sort();
        labels.dedup();
        assert_eq!(labels.len(), 3, "labels must be pairwise distinct");
    }

    #[test]
    fn no_candidate_appears_twice() {
        let rows = diversify(&mixed_candidates(), &config_with(&["use_case", "brand"]));
        let mut ids: Vec<&str> = rows
            .iter()
            .flat_map(|row| row.items.iter().map(|item| item.id.as_str()))
            .collect();
        let before = ids.len();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), before);
    }

    #[test]
    fn chosen_axis_entropy_never_below_price_entropy() {
        // use_case splits 3/3/3 (max entropy); price tertiles also 3/3/3.
        // The chosen axis must never be worse than the price fallback.
        let candidates = mixed_candidates();
        let config = config_with(&["use_case", "brand"]);
        let rows = diversify(&candidates, &config);

        let price_values = price_bucket_values(&candidates, config.rows);
        let price_entropy = entropy(&price_values);
        let chosen_values: Vec<Option<String>> = if rows[0].dimension == PRICE_AXIS {
            price_values
        } else {
            candidates
                .iter()
                .map(|candidate| candidate.attr(&rows[0].dimension))
                .collect()
        };
        assert!(entropy(&chosen_values) >= price_entropy - 1e-9);
    }

    #[test]
    fn uniform_axis_falls_back_to_price() {
        // Single use_case value: entropy 0, below the floor.
        let candidates: Vec<ProductSummary> = (0..9)
            .map(|i| laptop(&format!("p{i}"), 80_000 + 10_000 * i as i64, "gaming", "Asus"))
            .collect();
        let rows = diversify(&candidates, &config_with(&["use_case"]));
        assert_eq!(rows[0].dimension, PRICE_AXIS);
        assert!(rows.iter().any(|row| row.label.starts_with("Budget-Friendly")));
        assert!(rows.iter().any(|row| row.label.starts_with("Premium")));
    }

    #[test]
    fn price_labels_carry_dollar_ranges() {
        let candidates: Vec<ProductSummary> = (0..9)
            .map(|i| laptop(&format!("p{i}"), 89_900 + 15_000 * i as i64, "gaming", "Asus"))
            .collect();
        let rows = diversify(&candidates, &config_with(&[]));
        let budget_row = rows
            .iter()
            .find(|row| row.label.starts_with("Budget-Friendly"))
            .unwrap();
        assert!(budget_row.label.contains('$'), "label: {}", budget_row.label);
    }

    #[test]
    fn short_candidate_list_yields_partial_grid() {
        let candidates = vec![
            laptop("a", 89_900, "gaming", "Asus"),
            laptop("b", 99_900, "work", "Dell"),
        ];
        let rows = diversify(&candidates, &config_with(&["use_case"]));
        assert!(!rows.is_empty());
        let total: usize = rows.iter().map(|row| row.items.len()).sum();
        assert_eq!(total, 2);
    }

    #[test]
    fn empty_input_yields_no_rows() {
        assert!(diversify(&[], &DiversifyConfig::default()).is_empty());
    }

    #[test]
    fn rank_order_preserved_within_rows() {
        let rows = diversify(&mixed_candidates(), &config_with(&["use_case"]));
        for row in &rows {
            let positions: Vec<usize> = row
                .items
                .iter()
                .map(|item| {
                    mixed_candidates()
                        .iter()
                        .position(|candidate| candidate.id == item.id)
                        .unwrap()
                })
                .collect();
            let mut sorted = positions.clone();
            sorted.sort_unstable();
            assert_eq!(positions, sorted, "row {} out of rank order", row.label);
        }
    }
}
