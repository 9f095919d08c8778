//! Persistence contract for session snapshots. The store is written, never
//! polled; only a cold-session miss reads from it.

use async_trait::async_trait;

use crate::state::SessionState;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store transport: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("store returned {0}")]
    Status(u16),
    #[error("snapshot decode: {0}")]
    Decode(#[from] serde_json::Error),
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, session_id: &str) -> Result<Option<SessionState>, StoreError>;
    async fn put(&self, state: &SessionState) -> Result<(), StoreError>;
    async fn list(&self) -> Result<Vec<String>, StoreError>;
}

/// HTTP key-value mirror: `PUT/GET {base}/sessions/{id}` with JSON bodies.
pub struct RemoteSessionStore {
    client: reqwest::Client,
    base_url: String,
}

impl RemoteSessionStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, session_id: &str) -> String {
        format!("{}/sessions/{}", self.base_url, session_id)
    }
}

#[async_trait]
impl SessionStore for RemoteSessionStore {
    async fn get(&self, session_id: &str) -> Result<Option<SessionState>, StoreError> {
        let response = self.client.get(self.url(session_id)).send().await?;
        if response.status().as_u16() == 404 {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(StoreError::Status(response.status().as_u16()));
        }
        let state = response.json().await?;
        Ok(Some(state))
    }

    async fn put(&self, state: &SessionState) -> Result<(), StoreError> {
        let response = self
            .client
            .put(self.url(&state.session_id))
            .json(state)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(StoreError::Status(response.status().as_u16()));
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>, StoreError> {
        let response = self
            .client
            .get(format!("{}/sessions", self.base_url))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(StoreError::Status(response.status().as_u16()));
        }
        Ok(response.json().await?)
    }
}
