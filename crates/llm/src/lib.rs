//! Structured LLM access. One capability trait, one HTTP implementation
//! against any OpenAI-compatible chat-completions endpoint, and the JSON
//! salvage path for providers that ignore `response_format`.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

mod client;
mod extract;

pub use client::ChatCompletionsClient;
pub use extract::extract_json;

/// Why a structured completion did not produce a usable object.
#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("completion deadline of {0:?} expired")]
    Timeout(Duration),
    #[error("transport: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("provider returned {status}: {body}")]
    Provider { status: u16, body: String },
    #[error("no JSON object found in model reply")]
    NoJson,
}

/// Capability consumed by every pipeline stage: a prompt plus a JSON schema
/// in, a parsed JSON object out. Implementations must be internally
/// thread-safe; callers hold only `Arc<dyn StructuredCompletion>`.
#[async_trait]
pub trait StructuredCompletion: Send + Sync {
    async fn complete(
        &self,
        prompt: &str,
        schema: &serde_json::Value,
        deadline: Duration,
    ) -> Result<serde_json::Value, CompletionError>;
}

/// Complete and deserialize into a closed record type. Unknown fields in
/// the model output are dropped by serde, never propagated.
pub async fn complete_typed<T: DeserializeOwned>(
    completion: &dyn StructuredCompletion,
    prompt: &str,
    schema: &serde_json::Value,
    deadline: Duration,
) -> Result<T, CompletionError> {
    let value = completion.complete(prompt, schema, deadline).await?;
    serde_json::from_value(value).map_err(|_| CompletionError::NoJson)
}
