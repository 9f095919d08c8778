//! The LLM-backed stages. Each returns `Err(StageFailure)` on timeout or
//! malformed output; deterministic fallbacks live next to the stage that
//! needs them so the orchestrator can always finish the turn.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument};

use aisle_llm::{CompletionError, StructuredCompletion};
use aisle_registry::{Domain, Registry, Slot, SlotValue};
use aisle_search::ProductSummary;
use aisle_session::ChatTurn;

use crate::error::StageFailure;
use crate::prompts;
use crate::signals::{
    DomainDetection, ExtractedSignals, GeneratedQuestion, RawDomainDetection, RawExtraction,
    RefinementDecision,
};

pub struct AgentStages {
    completion: Arc<dyn StructuredCompletion>,
    registry: Arc<Registry>,
}

impl AgentStages {
    pub fn new(completion: Arc<dyn StructuredCompletion>, registry: Arc<Registry>) -> Self {
        Self { completion, registry }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        stage: &'static str,
        prompt: String,
        schema: serde_json::Value,
        deadline: Duration,
    ) -> Result<T, StageFailure> {
        let value = self
            .completion
            .complete(&prompt, &schema, deadline)
            .await
            .map_err(|cause| StageFailure::new(stage, cause))?;
        serde_json::from_value(value)
            .map_err(|_| StageFailure::new(stage, CompletionError::NoJson))
    }

    // ── Stage 1: domain detection ────────────────────────────────────────────

    #[instrument(skip_all, fields(active = ?active_domain))]
    pub async fn detect_domain(
        &self,
        message: &str,
        tail: &[&ChatTurn],
        active_domain: Option<Domain>,
        deadline: Duration,
    ) -> Result<DomainDetection, StageFailure> {
        let prompt = prompts::domain_detection_prompt(message, tail, active_domain, &self.registry);
        let raw: RawDomainDetection = self
            .call("detect_domain", prompt, prompts::domain_detection_schema(), deadline)
            .await?;
        let detection = DomainDetection::from_raw(raw);
        debug!(domain = %detection.domain, confidence = detection.confidence, "domain detected");
        Ok(detection)
    }

    // ── Stage 2: slot extraction ─────────────────────────────────────────────

    #[instrument(skip_all, fields(domain = %domain))]
    pub async fn extract_signals(
        &self,
        message: &str,
        domain: Domain,
        deadline: Duration,
    ) -> Result<ExtractedSignals, StageFailure> {
        let prompt = prompts::slot_extraction_prompt(message, domain, &self.registry);
        let raw: RawExtraction = self
            .call("extract_signals", prompt, prompts::slot_extraction_schema(), deadline)
            .await?;
        let signals = ExtractedSignals::from_raw(raw, &self.registry, domain);
        debug!(filters = signals.filters.len(), "signals extracted");
        Ok(signals)
    }

    // ── Stage 4: question generation ─────────────────────────────────────────

    pub async fn generate_question(
        &self,
        domain: Domain,
        slot: &Slot,
        filters: &BTreeMap<String, SlotValue>,
        tail: &[&ChatTurn],
        deadline: Duration,
    ) -> Result<GeneratedQuestion, StageFailure> {
        let prompt = prompts::question_prompt(domain, &slot.key, filters, tail);
        let mut generated: GeneratedQuestion = self
            .call("generate_question", prompt, prompts::question_schema(), deadline)
            .await?;
        if generated.question.trim().is_empty() {
            return Err(StageFailure::new("generate_question", CompletionError::NoJson));
        }
        generated.slot_key = slot.key.clone();
        generated.question = ensure_open_invitation(generated.question);
        if generated.quick_replies.is_empty() {
            generated.quick_replies = slot.example_replies.clone();
        }
        Ok(generated)
    }

    /// Scripted question used when generation is unavailable.
    pub fn fallback_question(&self, slot: &Slot) -> GeneratedQuestion {
        GeneratedQuestion {
            question: slot.example_prompt.clone(),
            quick_replies: slot.example_replies.clone(),
            slot_key: slot.key.clone(),
        }
    }

    // ── Stage 5: recommendation explanation ──────────────────────────────────

    pub async fn explain(
        &self,
        top: &[ProductSummary],
        filters: &BTreeMap<String, SlotValue>,
        soft_notes: &str,
        deadline: Duration,
    ) -> Result<String, StageFailure> {
        let prompt = prompts::explanation_prompt(top, filters, soft_notes);
        let value: serde_json::Value = self
            .call("explain", prompt, prompts::explanation_schema(), deadline)
            .await?;
        let message = value
            .get("message")
            .and_then(|message| message.as_str())
            .unwrap_or("")
            .trim()
            .to_string();
        if message.is_empty() {
            return Err(StageFailure::new("explain", CompletionError::NoJson));
        }
        Ok(message)
    }

    pub fn fallback_explanation(&self) -> String {
        "Here are some options I think match your needs. Tell me if you'd like to \
         narrow them down or see something different."
            .to_string()
    }

    // ── Stage 6: post-recommendation refinement ──────────────────────────────

    pub async fn classify_refinement(
        &self,
        message: &str,
        last_results: &[ProductSummary],
        filters: &BTreeMap<String, SlotValue>,
        deadline: Duration,
    ) -> Result<RefinementDecision, StageFailure> {
        let prompt = prompts::refinement_prompt(message, last_results, filters);
        self.call("classify_refinement", prompt, prompts::refinement_schema(), deadline)
            .await
    }

    // ── Small talk ───────────────────────────────────────────────────────────

    pub async fn chat_reply(
        &self,
        message: &str,
        tail: &[&ChatTurn],
        deadline: Duration,
    ) -> Result<String, StageFailure> {
        let prompt = prompts::chat_reply_prompt(message, tail);
        let value: serde_json::Value = self
            .call("chat_reply", prompt, prompts::chat_reply_schema(), deadline)
            .await?;
        let reply = value
            .get("message")
            .and_then(|message| message.as_str())
            .unwrap_or("")
            .trim()
            .to_string();
        if reply.is_empty() {
            return Err(StageFailure::new("chat_reply", CompletionError::NoJson));
        }
        Ok(reply)
    }

    pub fn fallback_chat_reply(&self) -> String {
        "Happy to help! Let me know if you want to adjust the results or look at \
         something else."
            .to_string()
    }
}

/// Interview questions always end with an open-ended invitation.
fn ensure_open_invitation(question: String) -> String {
    let lowered = question.to_lowercase();
    if lowered.contains("anything else") || lowered.contains("share anything") {
        return question;
    }
    let trimmed = question.trim_end_matches(['?', '!', '.', ' ']).to_string();
    format!("{trimmed}, or feel free to share anything else you care about?")
}
