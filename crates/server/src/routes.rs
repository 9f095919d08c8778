//! The four public endpoints. Everything interesting happens in the
//! orchestrator; handlers translate between HTTP and `handle_turn`.

use std::collections::BTreeMap;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use aisle_registry::{Domain, SlotValue};
use aisle_runtime::{TurnRequest, TurnResult, UserAction};
use aisle_session::{SessionIntent, SessionState, Stage, StepIntent};

use crate::error::ApiError;
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/chat", post(chat))
        .route("/session/{id}", get(get_session))
        .route("/session/reset", post(reset_session))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    message: String,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    k: Option<u32>,
    #[serde(default)]
    user_actions: Vec<UserAction>,
}

async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<TurnResult>, ApiError> {
    let result = state
        .orchestrator
        .handle_turn(TurnRequest {
            message: request.message,
            session_id: request.session_id,
            k_limit: request.k,
            user_actions: request.user_actions,
        })
        .await?;
    Ok(Json(result))
}

/// Session inspection payload: state minus the transcript text and the
/// full product records.
#[derive(Debug, Serialize)]
pub struct SessionView {
    session_id: String,
    stage: Stage,
    active_domain: Option<Domain>,
    filters: BTreeMap<String, SlotValue>,
    question_count: u32,
    k_limit: u32,
    favorites: Vec<String>,
    session_intent: Option<SessionIntent>,
    step_intent: Option<StepIntent>,
    conversation_turns: usize,
    last_results_count: usize,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl SessionView {
    fn redact(state: &SessionState) -> Self {
        Self {
            session_id: state.session_id.clone(),
            stage: state.stage,
            active_domain: state.active_domain,
            filters: state.filters.clone(),
            question_count: state.question_count,
            k_limit: state.k_limit,
            favorites: state.favorites.iter().cloned().collect(),
            session_intent: state.session_intent,
            step_intent: state.step_intent,
            conversation_turns: state.conversation.len(),
            last_results_count: state.last_results.as_ref().map(Vec::len).unwrap_or(0),
            created_at: state.created_at,
            updated_at: state.updated_at,
        }
    }
}

async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionView>, ApiError> {
    state
        .orchestrator
        .sessions()
        .peek(&session_id)
        .map(|session| Json(SessionView::redact(&session)))
        .ok_or_else(|| ApiError::validation(format!("unknown session {session_id}")))
}

#[derive(Debug, Deserialize)]
pub struct ResetRequest {
    session_id: String,
}

async fn reset_session(
    State(state): State<AppState>,
    Json(request): Json<ResetRequest>,
) -> Json<serde_json::Value> {
    state.orchestrator.sessions().reset(&request.session_id);
    Json(serde_json::json!({ "ok": true }))
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let backends: BTreeMap<String, String> = state
        .orchestrator
        .backends()
        .into_iter()
        .map(|(domain, label)| (domain.to_string(), label))
        .collect();
    Json(serde_json::json!({ "status": "ok", "backends": backends }))
}
