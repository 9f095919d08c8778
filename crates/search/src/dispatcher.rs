//! Per-domain search routing with progressive filter relaxation.
//!
//! When a filtered query comes back short, LOW-priority filters are dropped
//! one at a time, then MEDIUM. HIGH filters are never relaxed.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use aisle_registry::{Domain, Registry, SlotPriority};

use crate::backend::{SearchBackend, SearchError, SearchOutcome, SearchQuery};
use crate::product::ProductSummary;

/// What the dispatcher did to satisfy the result-count threshold.
#[derive(Debug, Clone, Default)]
pub struct SearchTrace {
    /// Filter keys present in the final query.
    pub applied: Vec<String>,
    /// Filter keys dropped, in the order they were relaxed.
    pub relaxed: Vec<String>,
    pub notes: Vec<String>,
}

#[derive(Debug)]
pub struct DispatchResult {
    pub candidates: Vec<ProductSummary>,
    pub provenance: String,
    pub trace: SearchTrace,
}

struct Binding {
    backend: Arc<dyn SearchBackend>,
    permits: Arc<Semaphore>,
}

/// Routes a query to the backend registered for its domain.
pub struct Dispatcher {
    registry: Arc<Registry>,
    bindings: HashMap<Domain, Binding>,
    min_results: usize,
    fetch_limit: usize,
}

impl Dispatcher {
    pub fn new(registry: Arc<Registry>, min_results: usize) -> Self {
        Self {
            registry,
            bindings: HashMap::new(),
            min_results,
            fetch_limit: min_results.max(1) * 3,
        }
    }

    pub fn bind(&mut self, domain: Domain, backend: Arc<dyn SearchBackend>, concurrency: usize) {
        self.bindings.insert(
            domain,
            Binding {
                backend,
                permits: Arc::new(Semaphore::new(concurrency.max(1))),
            },
        );
    }

    pub fn bound_domains(&self) -> Vec<(Domain, String)> {
        self.bindings
            .iter()
            .map(|(domain, binding)| (*domain, binding.backend.describe()))
            .collect()
    }

    /// Issue the search, relaxing low-priority filters until the result
    /// count meets the threshold or nothing relaxable remains.
    pub async fn dispatch(&self, query: &SearchQuery) -> Result<DispatchResult, SearchError> {
        let binding = self.bindings.get(&query.domain).ok_or_else(|| {
            SearchError::Unavailable(query.domain, "no backend bound".to_string())
        })?;

        // Bounded concurrency per backend; waiting here is the backpressure.
        let _permit = binding
            .permits
            .acquire()
            .await
            .map_err(|_| SearchError::Backend("backend semaphore closed".to_string()))?;

        let mut working = query.clone();
        let mut trace = SearchTrace::default();
        let mut outcome = binding.backend.search(&working, self.fetch_limit).await?;
        debug!(
            domain = %query.domain,
            filters = working.filters.len(),
            hits = outcome.candidates.len(),
            "initial search"
        );

        while outcome.candidates.len() < self.min_results {
            let Some(next_key) = self.next_relaxable(&working) else {
                trace.notes.push("no relaxable filters remain".to_string());
                break;
            };

            working.filters.remove(&next_key);
            let retried = binding.backend.search(&working, self.fetch_limit).await?;
            info!(
                domain = %query.domain,
                relaxed = %next_key,
                hits = retried.candidates.len(),
                "relaxed filter and re-queried"
            );

            if retried.candidates.len() <= outcome.candidates.len() {
                trace
                    .notes
                    .push(format!("relaxing {next_key} yielded no additional candidates"));
                trace.relaxed.push(next_key);
                outcome = retried;
                break;
            }

            trace.relaxed.push(next_key);
            outcome = retried;
        }

        if outcome.candidates.is_empty() {
            warn!(domain = %query.domain, "search empty after max relaxation");
        }

        trace.applied = working.filters.keys().cloned().collect();
        Ok(DispatchResult {
            candidates: outcome.candidates,
            provenance: outcome.provenance,
            trace,
        })
    }

    /// The lowest-priority filter still applied: LOW before MEDIUM,
    /// registry order within a tier. HIGH is never returned.
    fn next_relaxable(&self, query: &SearchQuery) -> Option<String> {
        let mut candidates: Vec<(SlotPriority, usize, String)> = Vec::new();
        for (index, slot) in self.registry.slots(query.domain).iter().enumerate() {
            if slot.priority == SlotPriority::High {
                continue;
            }
            if query.filters.contains_key(&slot.key) {
                candidates.push((slot.priority, index, slot.key.clone()));
            }
        }
        // Reverse tier order (Low first), registry order within a tier.
        candidates.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        candidates.into_iter().next().map(|(_, _, key)| key)
    }
}
