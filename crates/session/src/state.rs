//! The mutable per-session record.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use aisle_registry::{Domain, SlotValue, SoftPreferences};
use aisle_search::ProductSummary;

/// High-level phase of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Stage {
    #[default]
    Interview,
    Recommendations,
    Checkout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub text: String,
}

/// What the user is here to accomplish overall.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionIntent {
    Explore,
    DecideToday,
    ExecutePurchase,
}

/// What the current step is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepIntent {
    Research,
    Compare,
    Negotiate,
    Schedule,
    Return,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: String,
    pub stage: Stage,
    pub active_domain: Option<Domain>,
    pub filters: BTreeMap<String, SlotValue>,
    pub soft_preferences: SoftPreferences,
    /// Slot keys asked so far, in asked order. A slot is asked at most once
    /// per session unless the domain changes.
    pub questions_asked: Vec<String>,
    /// Follow-up questions emitted this session; never exceeds `k_limit`.
    pub question_count: u32,
    pub k_limit: u32,
    pub conversation: VecDeque<ChatTurn>,
    pub last_results: Option<Vec<ProductSummary>>,
    pub favorites: BTreeSet<String>,
    pub session_intent: Option<SessionIntent>,
    pub step_intent: Option<StepIntent>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionState {
    pub fn new(session_id: impl Into<String>, k_limit: u32) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            stage: Stage::Interview,
            active_domain: None,
            filters: BTreeMap::new(),
            soft_preferences: SoftPreferences::default(),
            questions_asked: Vec::new(),
            question_count: 0,
            k_limit,
            conversation: VecDeque::new(),
            last_results: None,
            favorites: BTreeSet::new(),
            session_intent: None,
            step_intent: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Point the session at a new domain. Filters, interview progress, and
    /// previous results belong to the old domain and are cleared with it.
    pub fn switch_domain(&mut self, domain: Domain) {
        self.active_domain = Some(domain);
        self.filters.clear();
        self.questions_asked.clear();
        self.question_count = 0;
        self.last_results = None;
        self.stage = Stage::Interview;
    }

    /// Drop accumulated filters but keep the domain (a fresh open query).
    pub fn clear_filters(&mut self) {
        self.filters.clear();
        self.last_results = None;
        self.stage = Stage::Interview;
    }

    /// Append a turn, dropping the oldest entries beyond `cap`.
    pub fn record_turn(&mut self, role: ChatRole, text: impl Into<String>, cap: usize) {
        self.conversation.push_back(ChatTurn { role, text: text.into() });
        while self.conversation.len() > cap {
            self.conversation.pop_front();
        }
    }

    /// The last `n` turns, oldest first, for LLM context.
    pub fn conversation_tail(&self, n: usize) -> Vec<&ChatTurn> {
        let start = self.conversation.len().saturating_sub(n);
        self.conversation.iter().skip(start).collect()
    }

    pub fn has_asked(&self, slot_key: &str) -> bool {
        self.questions_asked.iter().any(|asked| asked == slot_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aisle_registry::PriceBand;

    fn session() -> SessionState {
        SessionState::new("sess-1", 3)
    }

    #[test]
    fn new_session_starts_in_interview() {
        let state = session();
        assert_eq!(state.stage, Stage::Interview);
        assert!(state.active_domain.is_none());
        assert_eq!(state.question_count, 0);
    }

    #[test]
    fn switch_domain_clears_interview_progress() {
        let mut state = session();
        state.active_domain = Some(Domain::Laptops);
        state.filters.insert(
            "budget".to_string(),
            SlotValue::Price(PriceBand::up_to(150_000)),
        );
        state.questions_asked.push("budget".to_string());
        state.question_count = 2;
        state.stage = Stage::Recommendations;
        state.last_results = Some(vec![ProductSummary::default()]);

        state.switch_domain(Domain::Books);

        assert_eq!(state.active_domain, Some(Domain::Books));
        assert!(state.filters.is_empty());
        assert!(state.questions_asked.is_empty());
        assert_eq!(state.question_count, 0);
        assert!(state.last_results.is_none());
        assert_eq!(state.stage, Stage::Interview);
    }

    #[test]
    fn conversation_is_capped() {
        let mut state = session();
        for index in 0..20 {
            state.record_turn(ChatRole::User, format!("turn {index}"), 12);
        }
        assert_eq!(state.conversation.len(), 12);
        assert_eq!(state.conversation.front().unwrap().text, "turn 8");
        assert_eq!(state.conversation.back().unwrap().text, "turn 19");
    }

    #[test]
    fn conversation_tail_returns_most_recent() {
        let mut state = session();
        for index in 0..6 {
            state.record_turn(ChatRole::User, format!("turn {index}"), 12);
        }
        let tail = state.conversation_tail(2);
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].text, "turn 4");
        assert_eq!(tail[1].text, "turn 5");
    }

    #[test]
    fn favorites_are_a_set() {
        let mut state = session();
        state.favorites.insert("lp-1".to_string());
        state.favorites.insert("lp-1".to_string());
        assert_eq!(state.favorites.len(), 1);
    }

    #[test]
    fn serde_round_trip_preserves_stage() {
        let mut state = session();
        state.stage = Stage::Recommendations;
        let json = serde_json::to_string(&state).unwrap();
        assert!(json.contains("RECOMMENDATIONS"));
        let back: SessionState = serde_json::from_str(&json).unwrap();
        assert_eq!(back.stage, Stage::Recommendations);
    }
}
