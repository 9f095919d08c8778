//! Optional product-research collaborator. When none is bound, the
//! orchestrator renders a comparison from the products already on screen.

use anyhow::Result;
use async_trait::async_trait;

#[async_trait]
pub trait ResearchService: Send + Sync {
    /// Enriched information for the given product ids, already formatted
    /// for display.
    async fn lookup(&self, product_ids: &[String]) -> Result<String>;
}
