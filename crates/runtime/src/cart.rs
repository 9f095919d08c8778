//! Thin pass-through to the cart collaborator. The core only tracks
//! favorites in session; signed-in versus guest semantics stay with the
//! collaborator.

use std::collections::BTreeSet;

use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::Deserialize;

/// A cart/favorite action submitted alongside a chat message. Actions are
/// applied in submission order before the pipeline runs.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UserAction {
    Favorite { product_id: String },
    Unfavorite { product_id: String },
    AddToCart { product_id: String },
    RemoveFromCart { product_id: String },
    Checkout,
}

#[async_trait]
pub trait CartService: Send + Sync {
    async fn favorite(&self, session_id: &str, product_id: &str) -> Result<()>;
    async fn unfavorite(&self, session_id: &str, product_id: &str) -> Result<()>;
    async fn add(&self, session_id: &str, product_id: &str) -> Result<()>;
    async fn remove(&self, session_id: &str, product_id: &str) -> Result<()>;
    async fn checkout(&self, session_id: &str) -> Result<String>;
}

/// Process-local cart, used by the demo wiring and tests.
#[derive(Default)]
pub struct InMemoryCart {
    items: DashMap<String, BTreeSet<String>>,
}

impl InMemoryCart {
    pub fn contents(&self, session_id: &str) -> Vec<String> {
        self.items
            .get(session_id)
            .map(|items| items.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl CartService for InMemoryCart {
    async fn favorite(&self, _session_id: &str, _product_id: &str) -> Result<()> {
        Ok(())
    }

    async fn unfavorite(&self, _session_id: &str, _product_id: &str) -> Result<()> {
        Ok(())
    }

    async fn add(&self, session_id: &str, product_id: &str) -> Result<()> {
        self.items
            .entry(session_id.to_string())
            .or_default()
            .insert(product_id.to_string());
        Ok(())
    }

    async fn remove(&self, session_id: &str, product_id: &str) -> Result<()> {
        if let Some(mut items) = self.items.get_mut(session_id) {
            items.remove(product_id);
        }
        Ok(())
    }

    async fn checkout(&self, session_id: &str) -> Result<String> {
        let count = self.items.get(session_id).map(|items| items.len()).unwrap_or(0);
        self.items.remove(session_id);
        Ok(format!("Checkout started for {count} item(s)."))
    }
}
