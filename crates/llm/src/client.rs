//! OpenAI-compatible chat-completions client.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, warn};

use aisle_config::{LlmConfig, ReasoningEffort};

use crate::{CompletionError, StructuredCompletion, extract_json};

/// One reqwest client reused for every call; providers that honor
/// `response_format` return clean JSON, the rest go through [`extract_json`].
#[derive(Debug, Clone)]
pub struct ChatCompletionsClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    reasoning_effort: ReasoningEffort,
    api_key: Option<String>,
}

impl ChatCompletionsClient {
    pub fn new(config: &LlmConfig, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            reasoning_effort: config.reasoning_effort,
            api_key,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn payload(&self, prompt: &str, schema: &serde_json::Value) -> serde_json::Value {
        json!({
            "model": self.model,
            "reasoning_effort": self.reasoning_effort.as_str(),
            "messages": [
                {
                    "role": "system",
                    "content": "Reply with a single JSON object matching the provided schema. No prose, no code fences."
                },
                { "role": "user", "content": prompt }
            ],
            "response_format": {
                "type": "json_schema",
                "json_schema": { "name": "stage_output", "schema": schema }
            }
        })
    }
}

#[async_trait]
impl StructuredCompletion for ChatCompletionsClient {
    async fn complete(
        &self,
        prompt: &str,
        schema: &serde_json::Value,
        deadline: Duration,
    ) -> Result<serde_json::Value, CompletionError> {
        let endpoint = format!("{}/chat/completions", self.base_url);
        let mut request = self.client.post(&endpoint).json(&self.payload(prompt, schema));
        if let Some(key) = self.api_key.as_deref().filter(|key| !key.trim().is_empty()) {
            request = request.bearer_auth(key);
        }

        let response = tokio::time::timeout(deadline, request.send())
            .await
            .map_err(|_| CompletionError::Timeout(deadline))??;

        let status = response.status();
        let body: serde_json::Value = tokio::time::timeout(deadline, response.json())
            .await
            .map_err(|_| CompletionError::Timeout(deadline))??;

        if !status.is_success() {
            warn!(status = status.as_u16(), "completion provider error");
            return Err(CompletionError::Provider {
                status: status.as_u16(),
                body: body.to_string(),
            });
        }

        let content = body
            .get("choices")
            .and_then(|choices| choices.get(0))
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(|content| content.as_str())
            .unwrap_or("");

        debug!(reply_len = content.len(), "completion reply received");
        extract_json(content).ok_or(CompletionError::NoJson)
    }
}
