//! `handle_turn`: one chat message in, one envelope out. Transient stage
//! failures take their deterministic fallback and the turn completes; only
//! structural failures (unbound backend, broken session invariant) abort
//! with a [`TurnError`].

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use aisle_agents::{
    AgentStages, DomainDetection, ExtractedSignals, InterviewAction, RefinementDecision,
    RefinementIntent, Validation, correct_domain_terms, decide_interview, domain_quick_replies,
    validate,
};
use aisle_config::AppConfig;
use aisle_registry::{Domain, Registry, SlotValue};
use aisle_search::{
    DispatchResult, Dispatcher, DiversifyConfig, ProductSummary, RecommendationRow, SearchError,
    SearchQuery, diversify,
};
use aisle_session::{ChatRole, SessionManager, SessionState, Stage, StepIntent};

use crate::cart::{CartService, UserAction};
use crate::envelope::{ResponseType, Trace, TurnResult};
use crate::research::ResearchService;

/// How many transcript turns each prompt sees.
const PROMPT_TAIL: usize = 6;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub conversation_cap: usize,
    pub turn_budget: Duration,
    pub rows: usize,
    pub per_row: usize,
    pub entropy_floor: f64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            conversation_cap: 12,
            turn_budget: Duration::from_millis(30_000),
            rows: 3,
            per_row: 3,
            entropy_floor: 0.5,
        }
    }
}

impl OrchestratorConfig {
    pub fn from_app(config: &AppConfig) -> Self {
        Self {
            conversation_cap: config.interview.conversation_cap,
            turn_budget: Duration::from_millis(config.turn.budget_ms),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TurnRequest {
    pub message: String,
    pub session_id: Option<String>,
    pub k_limit: Option<u32>,
    pub user_actions: Vec<UserAction>,
}

/// Wall-clock budget shared by every external call in one turn.
struct TurnBudget {
    deadline: Instant,
}

impl TurnBudget {
    fn start(total: Duration) -> Self {
        Self { deadline: Instant::now() + total }
    }

    fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}

/// Structural failures that abort the turn instead of degrading. Transient
/// trouble (LLM timeouts, slow searches) never lands here; these are
/// deployment or programmer errors the caller must see. The trace carries
/// the request id so the failure can be correlated with logs.
#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error("no search backend is bound for {domain}")]
    BackendUnavailable { domain: Domain, trace: Trace },
    #[error("session invariant violated: {message}")]
    Internal { message: String, trace: Trace },
}

impl TurnError {
    pub fn trace(&self) -> &Trace {
        match self {
            TurnError::BackendUnavailable { trace, .. } => trace,
            TurnError::Internal { trace, .. } => trace,
        }
    }
}

/// Abort reason raised inside the turn, before the trace is attached.
enum TurnAbort {
    BackendUnavailable(Domain),
    Internal(String),
}

impl TurnAbort {
    fn into_error(self, trace: Trace) -> TurnError {
        match self {
            TurnAbort::BackendUnavailable(domain) => {
                TurnError::BackendUnavailable { domain, trace }
            }
            TurnAbort::Internal(message) => TurnError::Internal { message, trace },
        }
    }
}

/// Intermediate turn output before the envelope is assembled.
struct TurnOutcome {
    response_type: ResponseType,
    message: String,
    rows: Option<Vec<RecommendationRow>>,
    quick_replies: Option<Vec<String>>,
    provenance: Option<String>,
}

impl TurnOutcome {
    fn message(text: impl Into<String>) -> Self {
        Self {
            response_type: ResponseType::Message,
            message: text.into(),
            rows: None,
            quick_replies: None,
            provenance: None,
        }
    }

    fn with_quick_replies(mut self, replies: Vec<String>) -> Self {
        self.quick_replies = Some(replies);
        self
    }
}

pub struct Orchestrator {
    registry: Arc<Registry>,
    sessions: Arc<SessionManager>,
    stages: AgentStages,
    dispatcher: Arc<Dispatcher>,
    cart: Arc<dyn CartService>,
    research: Option<Arc<dyn ResearchService>>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<Registry>,
        sessions: Arc<SessionManager>,
        stages: AgentStages,
        dispatcher: Arc<Dispatcher>,
        cart: Arc<dyn CartService>,
        research: Option<Arc<dyn ResearchService>>,
        config: OrchestratorConfig,
    ) -> Self {
        Self { registry, sessions, stages, dispatcher, cart, research, config }
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn backends(&self) -> Vec<(Domain, String)> {
        self.dispatcher.bound_domains()
    }

    #[instrument(skip(self, request), fields(session_id))]
    pub async fn handle_turn(&self, request: TurnRequest) -> Result<TurnResult, TurnError> {
        let session_id = request
            .session_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        tracing::Span::current().record("session_id", session_id.as_str());

        // Turns for one session serialize here; other sessions proceed.
        let _guard = self.sessions.lock(&session_id).await;
        let budget = TurnBudget::start(self.config.turn_budget);
        let mut trace = Trace::new();

        let mut state = self.sessions.load(&session_id).await;
        if let Some(k_limit) = request.k_limit {
            state.k_limit = k_limit;
        }

        self.apply_user_actions(&mut state, &request.user_actions).await;

        let message = request.message.trim().to_string();
        state.record_turn(ChatRole::User, &message, self.config.conversation_cap);

        let outcome = match validate(&message) {
            Validation::Invalid(reason) => {
                debug!(?reason, "message rejected by validator");
                Ok(TurnOutcome::message(
                    "I didn't quite catch that. Tell me what you're shopping for, like \
                     a laptop for school or a family SUV.",
                )
                .with_quick_replies(domain_quick_replies(&self.registry)))
            }
            Validation::Greeting => Ok(TurnOutcome::message(
                "Hi! I can help you shop for vehicles, laptops, or books. What are you \
                 looking for today?",
            )
            .with_quick_replies(domain_quick_replies(&self.registry))),
            Validation::Valid { .. } => {
                let corrected = correct_domain_terms(&message, &self.registry)
                    .unwrap_or_else(|| message.clone());
                match state.stage {
                    Stage::Interview => {
                        self.run_interview(&mut state, &corrected, &mut trace, &budget).await
                    }
                    Stage::Recommendations | Stage::Checkout => {
                        self.run_refinement(&mut state, &corrected, &mut trace, &budget).await
                    }
                }
            }
        };
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(abort) => {
                // Fatal path: nothing is saved, the session stays as it was.
                warn!(request_id = %trace.request_id, "turn aborted on structural failure");
                return Err(abort.into_error(trace));
            }
        };

        state.record_turn(ChatRole::Assistant, &outcome.message, self.config.conversation_cap);

        trace.backend_provenance = outcome.provenance;
        let result = TurnResult {
            response_type: outcome.response_type,
            message: outcome.message,
            domain: state.active_domain,
            bucket_labels: outcome
                .rows
                .as_ref()
                .map(|rows| rows.iter().map(|row| row.label.clone()).collect()),
            rows: outcome.rows,
            quick_replies: outcome.quick_replies,
            filters_snapshot: state.filters.clone(),
            question_count: state.question_count,
            session_id: session_id.clone(),
            trace,
        };
        self.sessions.save(state).await;
        Ok(result)
    }

    async fn apply_user_actions(&self, state: &mut SessionState, actions: &[UserAction]) {
        for action in actions {
            let applied = match action {
                UserAction::Favorite { product_id } => {
                    state.favorites.insert(product_id.clone());
                    self.cart.favorite(&state.session_id, product_id).await
                }
                UserAction::Unfavorite { product_id } => {
                    state.favorites.remove(product_id);
                    self.cart.unfavorite(&state.session_id, product_id).await
                }
                UserAction::AddToCart { product_id } => {
                    self.cart.add(&state.session_id, product_id).await
                }
                UserAction::RemoveFromCart { product_id } => {
                    self.cart.remove(&state.session_id, product_id).await
                }
                UserAction::Checkout => self.cart.checkout(&state.session_id).await.map(|_| ()),
            };
            if let Err(error) = applied {
                warn!(?error, "cart action failed; favorites stay in session");
            }
        }
    }

    // ── Interview ────────────────────────────────────────────────────────────

    async fn run_interview(
        &self,
        state: &mut SessionState,
        message: &str,
        trace: &mut Trace,
        budget: &TurnBudget,
    ) -> Result<TurnOutcome, TurnAbort> {
        let detection = {
            let tail = state.conversation_tail(PROMPT_TAIL);
            match trace
                .stage(
                    "detect_domain",
                    self.stages.detect_domain(message, &tail, state.active_domain, budget.remaining()),
                )
                .await
            {
                Ok(detection) => detection,
                Err(failure) => {
                    warn!(stage = failure.stage, "detection fell back to current domain");
                    DomainDetection {
                        domain: state.active_domain.unwrap_or(Domain::Unknown),
                        confidence: 0.0,
                    }
                }
            }
        };

        if detection.domain != Domain::Unknown && state.active_domain != Some(detection.domain) {
            info!(from = ?state.active_domain, to = %detection.domain, "domain switch");
            state.switch_domain(detection.domain);
        }
        let Some(domain) = state.active_domain else {
            return Ok(TurnOutcome::message(
                "What are you shopping for today? I can help with vehicles, laptops, and books.",
            )
            .with_quick_replies(domain_quick_replies(&self.registry)));
        };

        let signals = match trace
            .stage(
                "extract_signals",
                self.stages.extract_signals(message, domain, budget.remaining()),
            )
            .await
        {
            Ok(signals) => signals,
            Err(failure) => {
                warn!(stage = failure.stage, "extraction fell back to no-op");
                ExtractedSignals::default()
            }
        };
        state.filters.extend(signals.filters.clone());
        self.registry.sanitize_filters(domain, &mut state.filters);
        state.soft_preferences.merge(&signals.soft_preferences);

        match decide_interview(&self.registry, state, &signals, message) {
            InterviewAction::Ask(slot) => {
                let generated = {
                    let tail = state.conversation_tail(PROMPT_TAIL);
                    match trace
                        .stage(
                            "generate_question",
                            self.stages.generate_question(
                                domain,
                                &slot,
                                &state.filters,
                                &tail,
                                budget.remaining(),
                            ),
                        )
                        .await
                    {
                        Ok(generated) => generated,
                        Err(failure) => {
                            warn!(stage = failure.stage, "question generation fell back to script");
                            self.stages.fallback_question(&slot)
                        }
                    }
                };
                state.questions_asked.push(slot.key.clone());
                state.question_count += 1;
                Ok(TurnOutcome {
                    response_type: ResponseType::Question,
                    message: generated.question,
                    rows: None,
                    quick_replies: Some(generated.quick_replies),
                    provenance: None,
                })
            }
            InterviewAction::Search => self.run_search(state, trace, budget).await,
        }
    }

    // ── Search and presentation ──────────────────────────────────────────────

    async fn run_search(
        &self,
        state: &mut SessionState,
        trace: &mut Trace,
        budget: &TurnBudget,
    ) -> Result<TurnOutcome, TurnAbort> {
        let Some(domain) = state.active_domain else {
            return Ok(TurnOutcome::message(
                "Tell me what you're shopping for first: vehicles, laptops, or books.",
            )
            .with_quick_replies(domain_quick_replies(&self.registry)));
        };
        let query = SearchQuery {
            domain,
            filters: state.filters.clone(),
            soft_preferences: state.soft_preferences.clone(),
        };

        let dispatched: Result<DispatchResult, SearchError> = trace
            .stage("search", async {
                match tokio::time::timeout(budget.remaining(), self.dispatcher.dispatch(&query)).await
                {
                    Ok(result) => result,
                    Err(_) => Err(SearchError::Timeout),
                }
            })
            .await;

        let result = match dispatched {
            Ok(result) => result,
            // No binding for the domain is a deployment gap, not a flaky
            // call; it surfaces as BACKEND_UNAVAILABLE instead of degrading.
            Err(SearchError::Unavailable(domain, reason)) => {
                warn!(%domain, %reason, "no backend bound for domain");
                return Err(TurnAbort::BackendUnavailable(domain));
            }
            Err(SearchError::Timeout) => {
                return Ok(TurnOutcome::message(
                    "That search is taking longer than expected. Please try again in a moment.",
                ));
            }
            Err(error) => {
                warn!(?error, "search dispatch failed");
                return Ok(TurnOutcome::message(
                    "I couldn't reach the product catalog just now. Please try again shortly.",
                ));
            }
        };

        if result.candidates.is_empty() {
            state.stage = Stage::Interview;
            state.last_results = None;
            let message = if result.trace.relaxed.is_empty() {
                "I couldn't find anything matching those preferences. Want to adjust your \
                 budget or another requirement?"
                    .to_string()
            } else {
                format!(
                    "I couldn't find matches even after setting aside {}. Want to adjust your \
                     budget or another requirement?",
                    result.trace.relaxed.join(", ")
                )
            };
            return Ok(TurnOutcome::message(message));
        }

        let diversify_config = DiversifyConfig {
            rows: self.config.rows,
            per_row: self.config.per_row,
            entropy_floor: self.config.entropy_floor,
            axes: self.registry.categorical_keys(domain),
        };
        let rows = diversify(&result.candidates, &diversify_config);
        let shown: Vec<ProductSummary> = rows
            .iter()
            .flat_map(|row| row.items.iter().cloned())
            .collect();

        let explanation = {
            let top: Vec<ProductSummary> = shown.iter().take(3).cloned().collect();
            match trace
                .stage(
                    "explain",
                    self.stages.explain(
                        &top,
                        &state.filters,
                        &state.soft_preferences.notes,
                        budget.remaining(),
                    ),
                )
                .await
            {
                Ok(explanation) => explanation,
                Err(failure) => {
                    warn!(stage = failure.stage, "explanation fell back to template");
                    self.stages.fallback_explanation()
                }
            }
        };

        state.last_results = Some(shown);
        state.stage = Stage::Recommendations;
        Ok(TurnOutcome {
            response_type: ResponseType::Recommendations,
            message: explanation,
            rows: Some(rows),
            quick_replies: None,
            provenance: Some(result.provenance),
        })
    }

    // ── Post-recommendation refinement ───────────────────────────────────────

    async fn run_refinement(
        &self,
        state: &mut SessionState,
        message: &str,
        trace: &mut Trace,
        budget: &TurnBudget,
    ) -> Result<TurnOutcome, TurnAbort> {
        // The stage machine guarantees results exist here; a bare
        // recommendations stage is a broken session, not a user error.
        let last_results = match (state.stage, &state.last_results) {
            (Stage::Recommendations, None) => {
                return Err(TurnAbort::Internal(
                    "recommendations stage with no stored results".to_string(),
                ));
            }
            (_, results) => results.clone().unwrap_or_default(),
        };
        let decision = match trace
            .stage(
                "classify_refinement",
                self.stages.classify_refinement(
                    message,
                    &last_results,
                    &state.filters,
                    budget.remaining(),
                ),
            )
            .await
        {
            Ok(decision) => decision,
            Err(failure) => {
                warn!(stage = failure.stage, "refinement fell back to chat");
                RefinementDecision::chat()
            }
        };
        debug!(intent = ?decision.intent, "refinement classified");

        match decision.intent {
            RefinementIntent::FilterChange => {
                self.apply_filter_delta(state, &decision.filter_delta);
                self.run_search(state, trace, budget).await
            }
            RefinementIntent::DomainSwitch => {
                let target = decision
                    .target_domain
                    .as_deref()
                    .map(Domain::parse)
                    .unwrap_or(Domain::Unknown);
                if target != Domain::Unknown {
                    state.switch_domain(target);
                } else {
                    // Let detection pick the new domain from the message.
                    state.active_domain = None;
                    state.clear_filters();
                }
                self.run_interview(state, message, trace, budget).await
            }
            RefinementIntent::NewSearch => {
                state.clear_filters();
                self.run_interview(state, message, trace, budget).await
            }
            RefinementIntent::Research => {
                state.step_intent = Some(StepIntent::Research);
                let targets = resolve_targets(&decision.target_product_ids, &last_results);
                if let Some(research) = &self.research {
                    let ids: Vec<String> =
                        targets.iter().map(|product| product.id.clone()).collect();
                    match trace.stage("research", research.lookup(&ids)).await {
                        Ok(info) => return Ok(TurnOutcome::message(info)),
                        Err(error) => warn!(?error, "research collaborator failed"),
                    }
                }
                Ok(TurnOutcome::message(render_details(&targets)))
            }
            RefinementIntent::Compare => {
                state.step_intent = Some(StepIntent::Compare);
                let targets = resolve_targets(&decision.target_product_ids, &last_results);
                Ok(TurnOutcome::message(render_comparison(&targets)))
            }
            RefinementIntent::Cart => Ok(self.apply_cart_intent(state, &decision).await),
            RefinementIntent::Chat => {
                let tail = state.conversation_tail(PROMPT_TAIL);
                match trace
                    .stage("chat_reply", self.stages.chat_reply(message, &tail, budget.remaining()))
                    .await
                {
                    Ok(reply) => Ok(TurnOutcome::message(reply)),
                    Err(_) => Ok(TurnOutcome::message(self.stages.fallback_chat_reply())),
                }
            }
        }
    }

    /// Merge a refinement delta: nulls clear a filter, everything else is
    /// coerced and snapped exactly like first-pass extraction.
    fn apply_filter_delta(
        &self,
        state: &mut SessionState,
        delta: &BTreeMap<String, serde_json::Value>,
    ) {
        let Some(domain) = state.active_domain else { return };
        let mut additions = BTreeMap::new();
        for (key, value) in delta {
            if value.is_null() {
                state.filters.remove(key);
            } else {
                additions.insert(key.clone(), value.clone());
            }
        }
        let coerced = ExtractedSignals::from_raw_filters(additions, &self.registry, domain);
        state.filters.extend(coerced);
        self.registry.sanitize_filters(domain, &mut state.filters);
    }

    async fn apply_cart_intent(
        &self,
        state: &mut SessionState,
        decision: &RefinementDecision,
    ) -> TurnOutcome {
        use aisle_agents::CartOp;

        let op = decision.cart_op.unwrap_or(CartOp::Add);
        let targets = decision.target_product_ids.clone();
        if targets.is_empty() && !matches!(op, CartOp::Checkout) {
            return TurnOutcome::message(
                "Which of the products on screen did you mean? You can say the name or \
                 \"the first one\".",
            );
        }

        let mut failed = false;
        for product_id in &targets {
            let applied = match op {
                CartOp::Favorite => {
                    state.favorites.insert(product_id.clone());
                    self.cart.favorite(&state.session_id, product_id).await
                }
                CartOp::Unfavorite => {
                    state.favorites.remove(product_id);
                    self.cart.unfavorite(&state.session_id, product_id).await
                }
                CartOp::Add => self.cart.add(&state.session_id, product_id).await,
                CartOp::Remove => self.cart.remove(&state.session_id, product_id).await,
                CartOp::Checkout => Ok(()),
            };
            if let Err(error) = applied {
                warn!(?error, %product_id, "cart operation failed");
                failed = true;
            }
        }

        if matches!(op, CartOp::Checkout) {
            return match self.cart.checkout(&state.session_id).await {
                Ok(receipt) => {
                    state.stage = Stage::Checkout;
                    TurnOutcome::message(receipt)
                }
                Err(error) => {
                    warn!(?error, "checkout failed");
                    TurnOutcome::message(
                        "Checkout isn't available right now. Your favorites are saved; \
                         please try again shortly.",
                    )
                }
            };
        }

        let verb = match op {
            CartOp::Favorite => "Saved to your favorites",
            CartOp::Unfavorite => "Removed from your favorites",
            CartOp::Add => "Added to your cart",
            CartOp::Remove => "Removed from your cart",
            CartOp::Checkout => unreachable!("handled above"),
        };
        if failed {
            TurnOutcome::message(format!(
                "{verb}, though part of that didn't go through. Anything else?"
            ))
        } else {
            TurnOutcome::message(format!("{verb}. Anything else you'd like to look at?"))
        }
    }
}

fn resolve_targets(ids: &[String], last_results: &[ProductSummary]) -> Vec<ProductSummary> {
    if ids.is_empty() {
        return last_results.iter().take(3).cloned().collect();
    }
    last_results
        .iter()
        .filter(|product| ids.contains(&product.id))
        .cloned()
        .collect()
}

fn render_comparison(targets: &[ProductSummary]) -> String {
    if targets.is_empty() {
        return "I don't have those products on screen anymore. Run a new search and I'll \
                compare from there."
            .to_string();
    }
    let mut lines = vec!["Here's how they stack up:".to_string()];
    for product in targets {
        lines.push(format!(
            "- {} ({}): {}, rated {:.1} across {} reviews",
            product.name,
            product.brand,
            aisle_registry::format_price(product.price),
            product.rating,
            product.reviews_count,
        ));
    }
    lines.join("\n")
}

fn render_details(targets: &[ProductSummary]) -> String {
    if targets.is_empty() {
        return "I don't have those products on screen anymore. Run a new search and ask \
                again."
            .to_string();
    }
    let mut lines = Vec::new();
    for product in targets {
        lines.push(format!(
            "{} by {} at {}: {}",
            product.name,
            product.brand,
            aisle_registry::format_price(product.price),
            if product.description.is_empty() { "no details on file" } else { &product.description },
        ));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use serde_json::json;

    use aisle_llm::{CompletionError, StructuredCompletion};
    use aisle_search::{SearchBackend, SearchOutcome, StaticCatalog};
    use aisle_session::SessionManager;

    use crate::cart::InMemoryCart;

    /// Scripted completion: an entry fires when the prompt contains both
    /// needles (stage marker + message fragment). Unmatched prompts error,
    /// which exercises the fallback paths.
    struct ScriptedCompletion {
        script: Vec<(&'static str, &'static str, serde_json::Value)>,
    }

    #[async_trait]
    impl StructuredCompletion for ScriptedCompletion {
        async fn complete(
            &self,
            prompt: &str,
            _schema: &serde_json::Value,
            _deadline: Duration,
        ) -> Result<serde_json::Value, CompletionError> {
            for (stage, fragment, value) in &self.script {
                if prompt.contains(stage) && prompt.contains(fragment) {
                    return Ok(value.clone());
                }
            }
            Err(CompletionError::NoJson)
        }
    }

    const DETECT: &str = "Classify the shopping domain";
    const EXTRACT: &str = "Extract shopping preferences";
    const QUESTION: &str = "Write the next interview question";
    const EXPLAIN: &str = "Summarize why these recommendations fit";
    const REFINE: &str = "Classify the follow-up message";

    fn harness(script: Vec<(&'static str, &'static str, serde_json::Value)>) -> Orchestrator {
        let registry = Arc::new(Registry::builtin());
        let sessions = Arc::new(SessionManager::new(3, None));
        let stages = AgentStages::new(Arc::new(ScriptedCompletion { script }), registry.clone());
        let mut dispatcher = Dispatcher::new(registry.clone(), 3);
        for domain in Domain::known() {
            dispatcher.bind(*domain, Arc::new(StaticCatalog::sample(*domain)), 4);
        }
        Orchestrator::new(
            registry,
            sessions,
            stages,
            Arc::new(dispatcher),
            Arc::new(InMemoryCart::default()),
            None,
            OrchestratorConfig {
                turn_budget: Duration::from_secs(5),
                ..Default::default()
            },
        )
    }

    fn turn(message: &str, session_id: &str) -> TurnRequest {
        TurnRequest {
            message: message.to_string(),
            session_id: Some(session_id.to_string()),
            ..Default::default()
        }
    }

    // Needles must match message/conversation text only, never prompt
    // boilerplate (slot lists mention "gaming", the domain line mentions
    // "laptops"). More specific entries come first.
    fn laptop_script() -> Vec<(&'static str, &'static str, serde_json::Value)> {
        vec![
            (DETECT, "I want a laptop", json!({"domain": "laptops", "confidence": 0.95})),
            (DETECT, "just show me", json!({"domain": "laptops", "confidence": 0.9})),
            (
                EXTRACT,
                "nvidia",
                json!({
                    "filters": {"budget": 1500, "gpu_vendor": "NVIDIA"},
                    "impatience": false,
                    "asks_for_recommendations": false
                }),
            ),
            (
                EXTRACT,
                "just show me",
                json!({"filters": {}, "impatience": true, "asks_for_recommendations": true}),
            ),
            (
                EXTRACT,
                "I want a laptop",
                json!({
                    "filters": {"use_case": "gaming"},
                    "impatience": false,
                    "asks_for_recommendations": false
                }),
            ),
            (
                QUESTION,
                "I want a laptop",
                json!({
                    "question": "What budget are you working with?",
                    "quick_replies": ["Under $1,000", "$1,000-$2,000"],
                    "slot_key": "budget"
                }),
            ),
            (
                EXPLAIN,
                "TOP CANDIDATES",
                json!({"message": "The Legion 5 stands out for gaming at this budget; the rows group strong NVIDIA picks by brand."}),
            ),
        ]
    }

    // S1: budget laptop interview, three turns, k = 3.

    #[tokio::test]
    async fn s1_interview_then_impatience_search() {
        let orchestrator = harness(laptop_script());

        let first = orchestrator
            .handle_turn(turn("I want a laptop for gaming", "s1"))
            .await.unwrap();
        assert_eq!(first.response_type, ResponseType::Question);
        assert_eq!(first.domain, Some(Domain::Laptops));
        assert_eq!(first.question_count, 1);
        assert!(first.filters_snapshot.contains_key("use_case"));
        assert!(first.quick_replies.is_some());

        let second = orchestrator
            .handle_turn(turn("under $1500, nvidia gpu", "s1"))
            .await.unwrap();
        assert_eq!(second.response_type, ResponseType::Question);
        assert_eq!(second.question_count, 2);
        assert_eq!(
            second.filters_snapshot.get("budget"),
            Some(&SlotValue::Price(aisle_registry::PriceBand::up_to(150_000)))
        );
        assert_eq!(
            second.filters_snapshot.get("gpu_vendor"),
            Some(&SlotValue::Text("NVIDIA".to_string()))
        );

        let third = orchestrator.handle_turn(turn("just show me", "s1")).await.unwrap();
        assert_eq!(third.response_type, ResponseType::Recommendations);
        let rows = third.rows.as_ref().unwrap();
        assert_eq!(rows.len(), 3);
        for row in rows {
            assert!((1..=3).contains(&row.items.len()));
            for item in &row.items {
                assert!(item.price <= 150_000, "{} over budget", item.name);
                assert_eq!(item.attr("gpu_vendor").as_deref(), Some("NVIDIA"));
            }
        }
        assert_eq!(third.bucket_labels.as_ref().unwrap().len(), 3);
        assert_eq!(third.question_count, 2);
        assert_eq!(
            third.trace.backend_provenance.as_deref(),
            Some("static-catalog/laptops")
        );
        assert!(third.message.contains("Legion 5"));

        let state = orchestrator.sessions().peek("s1").unwrap();
        assert_eq!(state.stage, Stage::Recommendations);
        assert!(state.last_results.as_ref().is_some_and(|results| !results.is_empty()));
        assert!(state.question_count <= state.k_limit);
    }

    // Property 5: k_limit = 0 bypasses the interview entirely.

    #[tokio::test]
    async fn k_zero_transitions_directly_to_recommendations() {
        let orchestrator = harness(vec![
            (DETECT, "mystery", json!({"domain": "books", "confidence": 0.9})),
            (
                EXTRACT,
                "mystery",
                json!({
                    "filters": {"genre": "mystery"},
                    "impatience": false,
                    "asks_for_recommendations": false
                }),
            ),
        ]);

        let result = orchestrator
            .handle_turn(TurnRequest {
                message: "mystery books please".to_string(),
                session_id: Some("k0".to_string()),
                k_limit: Some(0),
                user_actions: Vec::new(),
            })
            .await.unwrap();

        assert_eq!(result.response_type, ResponseType::Recommendations);
        assert_eq!(result.question_count, 0);
        assert_eq!(result.domain, Some(Domain::Books));
        // Explanation fell back to the template; the turn still completed.
        assert!(result.message.contains("match your needs"));
        let state = orchestrator.sessions().peek("k0").unwrap();
        assert_eq!(state.stage, Stage::Recommendations);
    }

    // S2: domain switch out of RECOMMENDATIONS re-enters the interview.

    #[tokio::test]
    async fn s2_domain_switch_restarts_interview() {
        // Book-specific entries first so the seed turn's transcript (which
        // still mentions the laptop search) cannot shadow them.
        let script = vec![
            (
                REFINE,
                "mystery novel",
                json!({"intent": "domain_switch", "target_domain": "books"}),
            ),
            (DETECT, "mystery novel", json!({"domain": "books", "confidence": 0.92})),
            (
                EXTRACT,
                "mystery novel",
                json!({
                    "filters": {"genre": "mystery"},
                    "impatience": false,
                    "asks_for_recommendations": false
                }),
            ),
            (
                QUESTION,
                "genre: mystery",
                json!({
                    "question": "How much would you like to spend on it?",
                    "quick_replies": ["Under $15", "Under $30"],
                    "slot_key": "budget"
                }),
            ),
            (DETECT, "gaming laptop", json!({"domain": "laptops", "confidence": 0.95})),
            (
                EXTRACT,
                "gaming laptop",
                json!({"filters": {}, "impatience": true, "asks_for_recommendations": true}),
            ),
            (
                EXPLAIN,
                "TOP CANDIDATES",
                json!({"message": "Strong gaming picks across brands."}),
            ),
        ];
        let orchestrator = harness(script);

        // Seed: straight to laptop recommendations with k = 0.
        let seeded = orchestrator
            .handle_turn(TurnRequest {
                message: "just show me a gaming laptop".to_string(),
                session_id: Some("s2".to_string()),
                k_limit: Some(0),
                user_actions: Vec::new(),
            })
            .await.unwrap();
        assert_eq!(seeded.response_type, ResponseType::Recommendations);

        let switched = orchestrator
            .handle_turn(TurnRequest {
                message: "actually, recommend me a mystery novel".to_string(),
                session_id: Some("s2".to_string()),
                k_limit: Some(3),
                user_actions: Vec::new(),
            })
            .await.unwrap();

        assert_eq!(switched.response_type, ResponseType::Question);
        assert_eq!(switched.domain, Some(Domain::Books));
        assert!(switched.message.to_lowercase().contains("spend"));

        let state = orchestrator.sessions().peek("s2").unwrap();
        assert_eq!(state.stage, Stage::Interview);
        assert_eq!(state.active_domain, Some(Domain::Books));
        assert!(state.last_results.is_none(), "old laptop results must clear");
        assert_eq!(state.filters.len(), 1, "only the fresh genre filter survives");
        assert!(state.filters.contains_key("genre"));
    }

    // S3: gibberish short-circuits before the pipeline.

    #[tokio::test]
    async fn s3_gibberish_is_rejected_without_pipeline() {
        let orchestrator = harness(Vec::new());
        let result = orchestrator.handle_turn(turn("asdfghjk", "s3")).await.unwrap();

        assert_eq!(result.response_type, ResponseType::Message);
        assert!(result.message.contains("shopping for"));
        assert!(result.trace.stages.is_empty(), "no stage may run on invalid input");
        assert_eq!(result.domain, None);

        let state = orchestrator.sessions().peek("s3").unwrap();
        assert_eq!(state.stage, Stage::Interview);
        assert!(state.filters.is_empty());
        assert_eq!(state.question_count, 0);
        assert_eq!(state.conversation.len(), 2);
    }

    // S4: empty search after relaxation keeps the interview open.

    struct EmptyBackend;

    #[async_trait]
    impl SearchBackend for EmptyBackend {
        async fn search(
            &self,
            _query: &SearchQuery,
            _limit: usize,
        ) -> Result<SearchOutcome, SearchError> {
            Ok(SearchOutcome { candidates: Vec::new(), provenance: "empty".to_string() })
        }

        fn describe(&self) -> String {
            "empty".to_string()
        }
    }

    #[tokio::test]
    async fn s4_empty_search_reports_relaxed_filters_and_stays_in_interview() {
        let registry = Arc::new(Registry::builtin());
        let sessions = Arc::new(SessionManager::new(3, None));
        let script = vec![
            (DETECT, "hybrid", json!({"domain": "vehicles", "confidence": 0.9})),
            (
                EXTRACT,
                "hybrid",
                json!({
                    "filters": {"body_style": "suv", "fuel_type": "hybrid", "color": "blue"},
                    "impatience": true,
                    "asks_for_recommendations": true
                }),
            ),
        ];
        let stages = AgentStages::new(Arc::new(ScriptedCompletion { script }), registry.clone());
        let mut dispatcher = Dispatcher::new(registry.clone(), 9);
        dispatcher.bind(Domain::Vehicles, Arc::new(EmptyBackend), 4);
        let orchestrator = Orchestrator::new(
            registry,
            sessions,
            stages,
            Arc::new(dispatcher),
            Arc::new(InMemoryCart::default()),
            None,
            OrchestratorConfig { turn_budget: Duration::from_secs(5), ..Default::default() },
        );

        let result = orchestrator
            .handle_turn(turn("a blue hybrid suv, just show me", "s4"))
            .await.unwrap();

        assert_eq!(result.response_type, ResponseType::Message);
        assert!(result.message.contains("fuel_type"), "message: {}", result.message);
        let state = orchestrator.sessions().peek("s4").unwrap();
        assert_eq!(state.stage, Stage::Interview);
        assert!(state.last_results.is_none());
    }

    // S5: greeting gets the domain picker and mutates nothing.

    #[tokio::test]
    async fn s5_greeting_offers_domains() {
        let orchestrator = harness(Vec::new());
        let result = orchestrator.handle_turn(turn("hi", "s5")).await.unwrap();

        assert_eq!(result.response_type, ResponseType::Message);
        assert_eq!(
            result.quick_replies.as_ref().unwrap(),
            &vec!["Vehicles".to_string(), "Laptops".to_string(), "Books".to_string()]
        );
        assert_eq!(result.domain, None);
        assert!(result.trace.stages.is_empty());
    }

    // S6: fuzzy correction lets detection see the intended domain.

    #[tokio::test]
    async fn s6_fuzzy_corrected_domain_reaches_detection() {
        let orchestrator = harness(vec![
            (DETECT, "books", json!({"domain": "books", "confidence": 0.9})),
            (
                EXTRACT,
                "books",
                json!({"filters": {}, "impatience": false, "asks_for_recommendations": false}),
            ),
        ]);

        let result = orchestrator.handle_turn(turn("boks", "s6")).await.unwrap();

        assert_eq!(result.domain, Some(Domain::Books));
        // Question generation had no script entry, so the genre slot's
        // scripted prompt is used.
        assert_eq!(result.response_type, ResponseType::Question);
        assert!(result.message.to_lowercase().contains("genre"));
    }

    // Refinement: filter change re-dispatches and stays in recommendations.

    #[tokio::test]
    async fn filter_change_redispatches_in_place() {
        let mut script = laptop_script();
        script.push((
            REFINE,
            "under $1000",
            json!({"intent": "filter_change", "filter_delta": {"budget": 1000}}),
        ));
        let orchestrator = harness(script);

        orchestrator
            .handle_turn(TurnRequest {
                message: "just show me a gaming laptop".to_string(),
                session_id: Some("fc".to_string()),
                k_limit: Some(0),
                user_actions: Vec::new(),
            })
            .await.unwrap();

        let refined = orchestrator.handle_turn(turn("only under $1000", "fc")).await.unwrap();

        assert_eq!(refined.response_type, ResponseType::Recommendations);
        for row in refined.rows.as_ref().unwrap() {
            for item in &row.items {
                assert!(item.price <= 100_000, "{} over the new cap", item.name);
            }
        }
        let state = orchestrator.sessions().peek("fc").unwrap();
        assert_eq!(state.stage, Stage::Recommendations);
    }

    // Property 7: a no-op refinement leaves everything but the transcript
    // and timestamp untouched.

    #[tokio::test]
    async fn noop_refinement_is_state_invariant() {
        let orchestrator = harness(laptop_script());
        orchestrator
            .handle_turn(TurnRequest {
                message: "just show me a gaming laptop".to_string(),
                session_id: Some("noop".to_string()),
                k_limit: Some(0),
                user_actions: Vec::new(),
            })
            .await.unwrap();
        let before = orchestrator.sessions().peek("noop").unwrap();

        // No REFINE entry matches "ok", so classification falls back to chat.
        let result = orchestrator.handle_turn(turn("ok thanks", "noop")).await.unwrap();
        assert_eq!(result.response_type, ResponseType::Message);

        let after = orchestrator.sessions().peek("noop").unwrap();
        assert_eq!(after.stage, before.stage);
        assert_eq!(after.filters, before.filters);
        assert_eq!(after.question_count, before.question_count);
        assert_eq!(after.favorites, before.favorites);
        assert_eq!(
            after.last_results.as_ref().map(|results| results.len()),
            before.last_results.as_ref().map(|results| results.len())
        );
        assert!(after.updated_at >= before.updated_at);
        assert_eq!(after.conversation.len(), before.conversation.len() + 2);
    }

    // Property 8: favoriting twice is idempotent.

    #[tokio::test]
    async fn favorite_actions_are_idempotent() {
        let orchestrator = harness(Vec::new());
        let favorite = UserAction::Favorite { product_id: "lp-03".to_string() };
        orchestrator
            .handle_turn(TurnRequest {
                message: "hi".to_string(),
                session_id: Some("fav".to_string()),
                k_limit: None,
                user_actions: vec![favorite.clone(), favorite],
            })
            .await.unwrap();

        let state = orchestrator.sessions().peek("fav").unwrap();
        assert_eq!(state.favorites.len(), 1);
        assert!(state.favorites.contains("lp-03"));
    }

    // A search that outlives the turn budget returns a retry message and
    // leaves the stage unchanged.

    struct SlowBackend;

    #[async_trait]
    impl SearchBackend for SlowBackend {
        async fn search(
            &self,
            _query: &SearchQuery,
            _limit: usize,
        ) -> Result<SearchOutcome, SearchError> {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(SearchOutcome { candidates: Vec::new(), provenance: "slow".to_string() })
        }

        fn describe(&self) -> String {
            "slow".to_string()
        }
    }

    #[tokio::test]
    async fn search_timeout_degrades_to_retry_message() {
        let registry = Arc::new(Registry::builtin());
        let sessions = Arc::new(SessionManager::new(3, None));
        let script = vec![
            (DETECT, "laptop", json!({"domain": "laptops", "confidence": 0.95})),
            (
                EXTRACT,
                "laptop",
                json!({"filters": {}, "impatience": true, "asks_for_recommendations": true}),
            ),
        ];
        let stages = AgentStages::new(Arc::new(ScriptedCompletion { script }), registry.clone());
        let mut dispatcher = Dispatcher::new(registry.clone(), 3);
        dispatcher.bind(Domain::Laptops, Arc::new(SlowBackend), 4);
        let orchestrator = Orchestrator::new(
            registry,
            sessions,
            stages,
            Arc::new(dispatcher),
            Arc::new(InMemoryCart::default()),
            None,
            OrchestratorConfig { turn_budget: Duration::from_millis(80), ..Default::default() },
        );

        let result = orchestrator.handle_turn(turn("any laptop, just show me", "slow")).await.unwrap();

        assert_eq!(result.response_type, ResponseType::Message);
        assert!(result.message.contains("try again"), "message: {}", result.message);
        let state = orchestrator.sessions().peek("slow").unwrap();
        assert_eq!(state.stage, Stage::Interview);
    }

    // Missing session id: one is minted and returned.

    #[tokio::test]
    async fn missing_session_id_is_minted() {
        let orchestrator = harness(Vec::new());
        let result = orchestrator
            .handle_turn(TurnRequest { message: "hi".to_string(), ..Default::default() })
            .await.unwrap();
        assert!(!result.session_id.is_empty());
        assert!(orchestrator.sessions().peek(&result.session_id).is_some());
    }

    // Cart refinement updates favorites and confirms.

    #[tokio::test]
    async fn cart_refinement_saves_favorite() {
        let mut script = laptop_script();
        script.push((
            REFINE,
            "save the legion",
            json!({
                "intent": "cart",
                "cart_op": "favorite",
                "target_product_ids": ["lp-04"]
            }),
        ));
        let orchestrator = harness(script);

        orchestrator
            .handle_turn(TurnRequest {
                message: "just show me a gaming laptop".to_string(),
                session_id: Some("cart".to_string()),
                k_limit: Some(0),
                user_actions: Vec::new(),
            })
            .await.unwrap();
        let result = orchestrator.handle_turn(turn("save the legion for me", "cart")).await.unwrap();

        assert_eq!(result.response_type, ResponseType::Message);
        assert!(result.message.contains("favorites"));
        let state = orchestrator.sessions().peek("cart").unwrap();
        assert!(state.favorites.contains("lp-04"));
        assert_eq!(state.stage, Stage::Recommendations, "cart ops keep the stage");
    }

    // A domain with no bound backend is a deployment gap and surfaces as a
    // structural error, not a friendly chat message.

    #[tokio::test]
    async fn unbound_backend_aborts_with_backend_unavailable() {
        let registry = Arc::new(Registry::builtin());
        let sessions = Arc::new(SessionManager::new(3, None));
        let script = vec![
            (DETECT, "mystery", json!({"domain": "books", "confidence": 0.9})),
            (
                EXTRACT,
                "mystery",
                json!({"filters": {}, "impatience": true, "asks_for_recommendations": true}),
            ),
        ];
        let stages = AgentStages::new(Arc::new(ScriptedCompletion { script }), registry.clone());
        // Laptops only; books never gets a binding.
        let mut dispatcher = Dispatcher::new(registry.clone(), 3);
        dispatcher.bind(Domain::Laptops, Arc::new(StaticCatalog::sample(Domain::Laptops)), 4);
        let orchestrator = Orchestrator::new(
            registry,
            sessions,
            stages,
            Arc::new(dispatcher),
            Arc::new(InMemoryCart::default()),
            None,
            OrchestratorConfig { turn_budget: Duration::from_secs(5), ..Default::default() },
        );

        let error = orchestrator
            .handle_turn(turn("mystery books please", "nobackend"))
            .await
            .unwrap_err();

        match &error {
            TurnError::BackendUnavailable { domain, trace } => {
                assert_eq!(*domain, Domain::Books);
                assert!(
                    trace.stages.iter().any(|stage| stage.name == "search" && !stage.ok),
                    "trace must record the failed search stage"
                );
            }
            other => panic!("expected BackendUnavailable, got {other:?}"),
        }
        // The aborted turn is never saved.
        let state = orchestrator.sessions().peek("nobackend").unwrap();
        assert!(state.conversation.is_empty());
    }

    // A recommendations-stage session with no stored results is a broken
    // invariant and surfaces as an internal error.

    #[tokio::test]
    async fn broken_recommendations_state_aborts_with_internal() {
        let orchestrator = harness(Vec::new());
        let mut broken = SessionState::new("broken", 3);
        broken.active_domain = Some(Domain::Laptops);
        broken.stage = Stage::Recommendations;
        orchestrator.sessions().save(broken).await;

        let error = orchestrator
            .handle_turn(turn("cheaper please", "broken"))
            .await
            .unwrap_err();

        match &error {
            TurnError::Internal { message, trace } => {
                assert!(message.contains("no stored results"));
                assert!(!trace.request_id.is_nil());
            }
            other => panic!("expected Internal, got {other:?}"),
        }
    }
}
