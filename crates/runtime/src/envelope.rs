//! The per-turn response envelope and its trace.

use std::collections::BTreeMap;
use std::time::Instant;

use serde::Serialize;
use uuid::Uuid;

use aisle_registry::{Domain, SlotValue};
use aisle_search::RecommendationRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    Question,
    Recommendations,
    Message,
}

#[derive(Debug, Clone, Serialize)]
pub struct StageTiming {
    pub name: String,
    pub ms: u64,
    pub ok: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Trace {
    pub request_id: Uuid,
    pub stages: Vec<StageTiming>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend_provenance: Option<String>,
}

impl Trace {
    pub fn new() -> Self {
        Self {
            request_id: Uuid::new_v4(),
            stages: Vec::new(),
            backend_provenance: None,
        }
    }

    /// Run a stage future, recording its wall time and outcome.
    pub async fn stage<T, E>(
        &mut self,
        name: &str,
        fut: impl Future<Output = Result<T, E>>,
    ) -> Result<T, E> {
        let start = Instant::now();
        let outcome = fut.await;
        self.stages.push(StageTiming {
            name: name.to_string(),
            ms: start.elapsed().as_millis() as u64,
            ok: outcome.is_ok(),
        });
        outcome
    }
}

impl Default for Trace {
    fn default() -> Self {
        Self::new()
    }
}

/// What one `chat` call returns.
#[derive(Debug, Clone, Serialize)]
pub struct TurnResult {
    pub response_type: ResponseType,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<Domain>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<Vec<RecommendationRow>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket_labels: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quick_replies: Option<Vec<String>>,
    pub filters_snapshot: BTreeMap<String, SlotValue>,
    pub question_count: u32,
    pub session_id: String,
    pub trace: Trace,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stage_records_timing_and_outcome() {
        let mut trace = Trace::new();
        let ok: Result<u32, &str> = trace.stage("alpha", async { Ok(7) }).await;
        let err: Result<u32, &str> = trace.stage("beta", async { Err("nope") }).await;

        assert_eq!(ok.unwrap(), 7);
        assert!(err.is_err());
        assert_eq!(trace.stages.len(), 2);
        assert!(trace.stages[0].ok);
        assert!(!trace.stages[1].ok);
        assert_eq!(trace.stages[1].name, "beta");
    }

    #[test]
    fn response_type_serializes_lowercase() {
        let json = serde_json::to_string(&ResponseType::Recommendations).unwrap();
        assert_eq!(json, "\"recommendations\"");
    }
}
