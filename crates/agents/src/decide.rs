//! The deterministic ask-or-search rule applied after extraction.

use aisle_registry::{Registry, Slot};
use aisle_session::SessionState;

use crate::signals::ExtractedSignals;
use crate::validator::impatience_phrase;

#[derive(Debug, Clone, PartialEq)]
pub enum InterviewAction {
    /// Ask about this slot next.
    Ask(Slot),
    Search,
}

/// Search when the user asked for recommendations, ran out of patience, hit
/// the question cap, or every required slot is filled. Otherwise ask about
/// the highest-priority slot not yet asked and not yet filled.
pub fn decide_interview(
    registry: &Registry,
    state: &SessionState,
    signals: &ExtractedSignals,
    message: &str,
) -> InterviewAction {
    let Some(domain) = state.active_domain else {
        return InterviewAction::Search;
    };

    if signals.asks_for_recommendations
        || signals.impatience
        || impatience_phrase(message)
        || state.question_count >= state.k_limit
    {
        return InterviewAction::Search;
    }

    let required_filled = registry
        .slots(domain)
        .iter()
        .filter(|slot| slot.required_for_search)
        .all(|slot| state.filters.contains_key(&slot.key));
    if required_filled {
        return InterviewAction::Search;
    }

    for slot in registry.interview_order(domain) {
        if state.has_asked(&slot.key) || state.filters.contains_key(&slot.key) {
            continue;
        }
        return InterviewAction::Ask(slot.clone());
    }

    // Every slot is asked or filled; nothing left to interview about.
    InterviewAction::Search
}

#[cfg(test)]
mod tests {
    use super::*;
    use aisle_registry::{Domain, PriceBand, SlotValue};

    fn laptop_session(k_limit: u32) -> SessionState {
        let mut state = SessionState::new("s", k_limit);
        state.active_domain = Some(Domain::Laptops);
        state
    }

    fn no_signals() -> ExtractedSignals {
        ExtractedSignals::default()
    }

    #[test]
    fn first_question_targets_a_high_slot() {
        let registry = Registry::builtin();
        let state = laptop_session(3);
        match decide_interview(&registry, &state, &no_signals(), "gaming laptop please") {
            InterviewAction::Ask(slot) => {
                assert!(["budget", "use_case"].contains(&slot.key.as_str()));
            }
            InterviewAction::Search => panic!("expected a question"),
        }
    }

    #[test]
    fn zero_k_limit_searches_immediately() {
        let registry = Registry::builtin();
        let state = laptop_session(0);
        assert_eq!(
            decide_interview(&registry, &state, &no_signals(), "a laptop"),
            InterviewAction::Search
        );
    }

    #[test]
    fn question_cap_forces_search() {
        let registry = Registry::builtin();
        let mut state = laptop_session(3);
        state.question_count = 3;
        assert_eq!(
            decide_interview(&registry, &state, &no_signals(), "hmm"),
            InterviewAction::Search
        );
    }

    #[test]
    fn impatience_phrase_forces_search() {
        let registry = Registry::builtin();
        let state = laptop_session(3);
        assert_eq!(
            decide_interview(&registry, &state, &no_signals(), "just show me"),
            InterviewAction::Search
        );
    }

    #[test]
    fn llm_impatience_flag_forces_search() {
        let registry = Registry::builtin();
        let state = laptop_session(3);
        let signals = ExtractedSignals { impatience: true, ..Default::default() };
        assert_eq!(
            decide_interview(&registry, &state, &signals, "fine"),
            InterviewAction::Search
        );
    }

    #[test]
    fn all_required_filled_forces_search() {
        let registry = Registry::builtin();
        let mut state = laptop_session(3);
        state.filters.insert(
            "budget".to_string(),
            SlotValue::Price(PriceBand::up_to(150_000)),
        );
        for (key, value) in [("use_case", "gaming"), ("brand", "Asus"), ("gpu_vendor", "NVIDIA")] {
            state
                .filters
                .insert(key.to_string(), SlotValue::Text(value.to_string()));
        }
        assert_eq!(
            decide_interview(&registry, &state, &no_signals(), "anything else?"),
            InterviewAction::Search
        );
    }

    #[test]
    fn partially_filled_required_keeps_interviewing() {
        let registry = Registry::builtin();
        let mut state = laptop_session(3);
        state.filters.insert(
            "budget".to_string(),
            SlotValue::Price(PriceBand::up_to(150_000)),
        );
        state
            .filters
            .insert("use_case".to_string(), SlotValue::Text("gaming".to_string()));
        match decide_interview(&registry, &state, &no_signals(), "sounds good") {
            InterviewAction::Ask(slot) => assert_eq!(slot.key, "brand"),
            InterviewAction::Search => panic!("expected the brand question"),
        }
    }

    #[test]
    fn filled_slots_are_skipped_when_asking() {
        let registry = Registry::builtin();
        let mut state = laptop_session(3);
        state.filters.insert(
            "budget".to_string(),
            SlotValue::Price(PriceBand::up_to(150_000)),
        );
        match decide_interview(&registry, &state, &no_signals(), "a laptop") {
            InterviewAction::Ask(slot) => assert_eq!(slot.key, "use_case"),
            InterviewAction::Search => panic!("expected use_case question"),
        }
    }

    #[test]
    fn asked_slots_are_not_repeated() {
        let registry = Registry::builtin();
        let mut state = laptop_session(3);
        state.questions_asked.push("budget".to_string());
        state.question_count = 1;
        match decide_interview(&registry, &state, &no_signals(), "not sure") {
            InterviewAction::Ask(slot) => assert_eq!(slot.key, "use_case"),
            InterviewAction::Search => panic!("expected use_case question"),
        }
    }
}
