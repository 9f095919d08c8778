//! The search capability consumed by the dispatcher. Backends rank
//! internally however they like; candidates arrive already ordered.

use std::collections::BTreeMap;

use async_trait::async_trait;

use aisle_registry::{Domain, SlotValue, SoftPreferences};

use crate::product::ProductSummary;

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("backend for {0} is unavailable: {1}")]
    Unavailable(Domain, String),
    #[error("search timed out")]
    Timeout,
    #[error("backend error: {0}")]
    Backend(String),
}

/// A concrete search request: hard filters plus ranking-only preferences.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub domain: Domain,
    pub filters: BTreeMap<String, SlotValue>,
    pub soft_preferences: SoftPreferences,
}

impl SearchQuery {
    pub fn new(domain: Domain) -> Self {
        Self {
            domain,
            filters: BTreeMap::new(),
            soft_preferences: SoftPreferences::default(),
        }
    }
}

/// Ranked candidates plus a provenance label for the trace envelope.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub candidates: Vec<ProductSummary>,
    pub provenance: String,
}

#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn search(&self, query: &SearchQuery, limit: usize) -> Result<SearchOutcome, SearchError>;

    /// Cheap liveness label for the health endpoint.
    fn describe(&self) -> String {
        "unnamed backend".to_string()
    }
}
