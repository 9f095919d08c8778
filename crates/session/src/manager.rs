//! In-memory session map with write-through mirroring and per-session
//! advisory locks.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

use crate::state::SessionState;
use crate::store::SessionStore;

pub struct SessionManager {
    sessions: DashMap<String, SessionState>,
    locks: DashMap<String, Arc<Mutex<()>>>,
    mirror: Option<Arc<dyn SessionStore>>,
    mirror_warned: AtomicBool,
    default_k_limit: u32,
}

impl SessionManager {
    pub fn new(default_k_limit: u32, mirror: Option<Arc<dyn SessionStore>>) -> Self {
        Self {
            sessions: DashMap::new(),
            locks: DashMap::new(),
            mirror,
            mirror_warned: AtomicBool::new(false),
            default_k_limit,
        }
    }

    /// Advisory lock for one session. Turns for the same session serialize
    /// on this; turns for different sessions run in parallel.
    pub async fn lock(&self, session_id: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    /// Fetch a working copy, hydrating from the mirror on a cold miss and
    /// creating the session lazily when nothing is known about it.
    pub async fn load(&self, session_id: &str) -> SessionState {
        if let Some(state) = self.sessions.get(session_id) {
            return state.clone();
        }
        if let Some(recalled) = self.recall(session_id).await {
            self.sessions.insert(session_id.to_string(), recalled.clone());
            return recalled;
        }
        debug!(session_id, "creating new session");
        let state = SessionState::new(session_id, self.default_k_limit);
        self.sessions.insert(session_id.to_string(), state.clone());
        state
    }

    /// Rebuild a session from a persisted snapshot. Only the durable
    /// identity fields are hydrated; transcript and results start fresh.
    async fn recall(&self, session_id: &str) -> Option<SessionState> {
        let mirror = self.mirror.as_ref()?;
        match mirror.get(session_id).await {
            Ok(Some(snapshot)) => {
                debug!(session_id, "hydrating session from mirror");
                let mut state = SessionState::new(session_id, self.default_k_limit);
                state.active_domain = snapshot.active_domain;
                state.filters = snapshot.filters;
                state.session_intent = snapshot.session_intent;
                state.step_intent = snapshot.step_intent;
                // Results are never hydrated, so a recommendations-stage
                // snapshot re-enters the interview to keep the stage
                // invariant (RECOMMENDATIONS implies non-empty results).
                state.stage = match snapshot.stage {
                    crate::Stage::Recommendations => crate::Stage::Interview,
                    other => other,
                };
                state.favorites = snapshot.favorites;
                state.created_at = snapshot.created_at;
                Some(state)
            }
            Ok(None) => None,
            Err(error) => {
                self.warn_mirror_once(&error.to_string());
                None
            }
        }
    }

    /// Stamp and publish a snapshot. Mirror failures degrade to in-memory
    /// only; the first failure is logged, the rest stay quiet.
    pub async fn save(&self, mut state: SessionState) {
        state.updated_at = Utc::now();
        self.sessions.insert(state.session_id.clone(), state.clone());
        if let Some(mirror) = &self.mirror {
            if let Err(error) = mirror.put(&state).await {
                self.warn_mirror_once(&error.to_string());
            }
        }
    }

    pub fn peek(&self, session_id: &str) -> Option<SessionState> {
        self.sessions.get(session_id).map(|state| state.clone())
    }

    pub fn reset(&self, session_id: &str) -> bool {
        self.sessions.remove(session_id).is_some()
    }

    pub fn session_ids(&self) -> Vec<String> {
        self.sessions.iter().map(|entry| entry.key().clone()).collect()
    }

    fn warn_mirror_once(&self, error: &str) {
        if !self.mirror_warned.swap(true, Ordering::Relaxed) {
            warn!(error, "session mirror unavailable, continuing in-memory only");
        }
    }
}
