use aisle_llm::CompletionError;

/// A pipeline stage that could not produce a usable structured output.
/// The orchestrator converts these into deterministic fallbacks; they are
/// never surfaced to the user as errors.
#[derive(Debug, thiserror::Error)]
#[error("stage {stage} failed: {cause}")]
pub struct StageFailure {
    pub stage: &'static str,
    #[source]
    pub cause: CompletionError,
}

impl StageFailure {
    pub fn new(stage: &'static str, cause: CompletionError) -> Self {
        Self { stage, cause }
    }
}
