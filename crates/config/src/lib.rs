use std::env;
use std::fs;
use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// How much reasoning the model is asked to spend per structured call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    Low,
    #[default]
    Medium,
    High,
}

impl ReasoningEffort {
    pub fn as_str(self) -> &'static str {
        match self {
            ReasoningEffort::Low => "low",
            ReasoningEffort::Medium => "medium",
            ReasoningEffort::High => "high",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "low" => Some(ReasoningEffort::Low),
            "medium" => Some(ReasoningEffort::Medium),
            "high" => Some(ReasoningEffort::High),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Model identifier used for every structured stage.
    pub model: String,
    pub reasoning_effort: ReasoningEffort,
    /// OpenAI-compatible chat-completions base URL.
    pub base_url: String,
    /// Name of the environment variable holding the API key.
    /// The key itself is never stored in config files.
    pub api_key_env: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            reasoning_effort: ReasoningEffort::Medium,
            base_url: "https://api.openai.com/v1".to_string(),
            api_key_env: "AISLE_LLM_API_KEY".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InterviewConfig {
    /// Max interview questions per session. 0 bypasses the interview.
    pub default_k_limit: u32,
    /// Per-session transcript cap; older turns are dropped, not summarized.
    pub conversation_cap: usize,
}

impl Default for InterviewConfig {
    fn default() -> Self {
        Self {
            default_k_limit: 3,
            conversation_cap: 12,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnConfig {
    /// Total wall-clock budget for a single turn, shared by all external calls.
    pub budget_ms: u64,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self { budget_ms: 30_000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Result count below which the dispatcher starts relaxing filters.
    pub min_results: usize,
    /// Concurrent in-flight searches allowed per backend.
    pub backend_concurrency: usize,
    pub vehicles_url: Option<String>,
    pub laptops_url: Option<String>,
    pub books_url: Option<String>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            min_results: 9,
            backend_concurrency: 8,
            vehicles_url: None,
            laptops_url: None,
            books_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SessionConfig {
    /// Remote key-value mirror. In-memory stays authoritative either way.
    pub store_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Immutable process-wide configuration, loaded once at startup.
///
/// Precedence: defaults < TOML file < environment. Nothing deeper in the
/// call stack reads environment variables.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub interview: InterviewConfig,
    pub turn: TurnConfig,
    pub search: SearchConfig,
    pub session: SessionConfig,
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    /// Load from an optional TOML file, then apply environment overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::default();
        if let Ok(raw) = fs::read_to_string(path) {
            config = toml::from_str(&raw)?;
        }
        config.apply_env(|key| env::var(key).ok());
        Ok(config)
    }

    /// Build purely from the environment.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env(|key| env::var(key).ok());
        config
    }

    /// Apply the recognized environment keys through a lookup closure.
    /// Taking a closure keeps this testable without mutating process env.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(value) = lookup("LLM_MODEL").filter(|v| !v.is_empty()) {
            self.llm.model = value;
        }
        if let Some(effort) = lookup("LLM_REASONING_EFFORT").and_then(|v| ReasoningEffort::parse(&v)) {
            self.llm.reasoning_effort = effort;
        }
        if let Some(value) = lookup("LLM_BASE_URL").filter(|v| !v.is_empty()) {
            self.llm.base_url = value;
        }
        if let Some(value) = lookup("DEFAULT_K_LIMIT").and_then(|v| v.trim().parse().ok()) {
            self.interview.default_k_limit = value;
        }
        if let Some(value) = lookup("TURN_BUDGET_MS").and_then(|v| v.trim().parse().ok()) {
            self.turn.budget_ms = value;
        }
        if let Some(value) = lookup("SEARCH_MIN_RESULTS").and_then(|v| v.trim().parse().ok()) {
            self.search.min_results = value;
        }
        if let Some(value) = lookup("SESSION_STORE_URL").filter(|v| !v.is_empty()) {
            self.session.store_url = Some(value);
        }
        if let Some(value) = lookup("VEHICLES_BACKEND_URL").filter(|v| !v.is_empty()) {
            self.search.vehicles_url = Some(value);
        }
        if let Some(value) = lookup("LAPTOPS_BACKEND_URL").filter(|v| !v.is_empty()) {
            self.search.laptops_url = Some(value);
        }
        if let Some(value) = lookup("BOOKS_BACKEND_URL").filter(|v| !v.is_empty()) {
            self.search.books_url = Some(value);
        }
        if let Some(value) = lookup("AISLE_LOG_LEVEL").filter(|v| !v.is_empty()) {
            self.telemetry.log_level = value;
        }
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        let rendered = toml::to_string_pretty(self)?;
        fs::write(path, rendered)?;
        Ok(())
    }
}
