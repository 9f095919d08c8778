//! Pre-pipeline input screening: price patterns pass, greetings get the
//! domain picker, gibberish is rejected before any LLM spend. Near-miss
//! domain words ("boks", "labtop") are corrected in place.

use std::sync::LazyLock;

use regex::Regex;
use strsim::levenshtein;

use aisle_registry::{Domain, Registry};

static PRICE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(\$\s*\d[\d,]*(\.\d+)?)|(\b\d[\d,]*\s*k\b)|\b(under|over|below|above|between|less than|up to|at most|around)\s+\$?\d",
    )
    .expect("price pattern compiles")
});

const GREETINGS: &[&str] = &[
    "hi", "hello", "hey", "yo", "howdy", "sup", "hiya", "good morning", "good afternoon",
    "good evening",
];

const IMPATIENCE_PHRASES: &[&str] = &[
    "just show me",
    "show me now",
    "skip the questions",
    "enough questions",
    "stop asking",
    "just give me",
    "surprise me",
    "whatever you have",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidReason {
    TooShort,
    DigitsOnly,
    PunctuationOnly,
    Gibberish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validation {
    /// Message should run through the pipeline. `price_intent` marks
    /// messages that matched the price pattern.
    Valid { price_intent: bool },
    /// A bare greeting: answer with the domain picker, run nothing.
    Greeting,
    Invalid(InvalidReason),
}

/// Rules checked in order: price pattern, greeting, degenerate input,
/// vowel-ratio gibberish heuristic.
pub fn validate(message: &str) -> Validation {
    let trimmed = message.trim();

    if PRICE_PATTERN.is_match(trimmed) {
        return Validation::Valid { price_intent: true };
    }

    let lowered = trimmed.to_lowercase();
    if GREETINGS.contains(&lowered.as_str()) {
        return Validation::Greeting;
    }

    if trimmed.chars().count() < 2 {
        return Validation::Invalid(InvalidReason::TooShort);
    }
    if trimmed.chars().all(|c| c.is_ascii_digit()) {
        return Validation::Invalid(InvalidReason::DigitsOnly);
    }
    if !trimmed.chars().any(|c| c.is_alphanumeric()) {
        return Validation::Invalid(InvalidReason::PunctuationOnly);
    }

    let letters: Vec<char> = lowered.chars().filter(|c| c.is_alphabetic()).collect();
    if !letters.is_empty() {
        let vowels = letters
            .iter()
            .filter(|c| matches!(c, 'a' | 'e' | 'i' | 'o' | 'u'))
            .count();
        let ratio = vowels as f64 / letters.len() as f64;
        if !(0.2..=0.7).contains(&ratio) {
            return Validation::Invalid(InvalidReason::Gibberish);
        }
    }

    Validation::Valid { price_intent: false }
}

/// The quick replies offered with greetings and validation failures.
pub fn domain_quick_replies(registry: &Registry) -> Vec<String> {
    registry
        .domains()
        .map(|domain| {
            let name = domain.as_str();
            let mut chars = name.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

/// Explicit "stop interviewing me" phrasing, one of the two impatience
/// heuristics (the other is the extractor's flag).
pub fn impatience_phrase(message: &str) -> bool {
    let lowered = message.to_lowercase();
    IMPATIENCE_PHRASES.iter().any(|phrase| lowered.contains(phrase))
}

/// Edit-distance tolerance for a word of the given length.
fn tolerance(len: usize) -> usize {
    match len {
        3..=5 => 2,
        6..=8 => 3,
        _ if len >= 9 => 3,
        _ => 0,
    }
}

/// Ordinary words that sit one edit away from a domain keyword. Correcting
/// these corrupts real sentences ("add to cart" must not become "cars").
const CORRECTION_STOPLIST: &[&str] = &[
    "cart", "carts", "care", "cares", "look", "looks", "cook", "cooks", "level", "hotel",
    "model", "models", "booked", "booking",
];

/// Replace near-miss domain keywords ("boks" -> "books") so detection sees
/// the intended term. Returns `Some(corrected)` only when something changed.
pub fn correct_domain_terms(message: &str, registry: &Registry) -> Option<String> {
    let keywords = registry.keyword_table();
    let mut changed = false;

    let corrected: Vec<String> = message
        .split_whitespace()
        .map(|word| {
            let stripped: String = word
                .chars()
                .filter(|c| c.is_alphabetic())
                .collect::<String>()
                .to_lowercase();
            // Three-letter words sit one edit from too much of English.
            if stripped.len() < 4 || CORRECTION_STOPLIST.contains(&stripped.as_str()) {
                return word.to_string();
            }

            let mut best: Option<(usize, &str)> = None;
            for (keyword, _domain) in &keywords {
                let distance = levenshtein(&stripped, keyword);
                if distance == 0 {
                    return word.to_string();
                }
                let max_len = stripped.len().max(keyword.len());
                let similarity = 1.0 - distance as f64 / max_len as f64;
                if distance <= tolerance(stripped.len())
                    && similarity >= 0.6
                    && best.map(|(d, _)| distance < d).unwrap_or(true)
                {
                    best = Some((distance, keyword.as_str()));
                }
            }

            match best {
                Some((_, keyword)) => {
                    changed = true;
                    keyword.to_string()
                }
                None => word.to_string(),
            }
        })
        .collect();

    changed.then(|| corrected.join(" "))
}

/// Used to resolve a corrected keyword back to its domain.
pub fn keyword_domain(word: &str, registry: &Registry) -> Option<Domain> {
    registry
        .keyword_table()
        .into_iter()
        .find(|(keyword, _)| keyword == &word.to_lowercase())
        .map(|(_, domain)| domain)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_messages_are_valid() {
        for message in ["under $1500", "$20k", "between 800 and 1200", "around $30"] {
            assert_eq!(
                validate(message),
                Validation::Valid { price_intent: true },
                "{message}"
            );
        }
    }

    #[test]
    fn greetings_get_the_domain_picker() {
        for message in ["hi", "Hello", "HEY", "good morning"] {
            assert_eq!(validate(message), Validation::Greeting, "{message}");
        }
    }

    #[test]
    fn degenerate_inputs_are_invalid() {
        assert_eq!(validate("x"), Validation::Invalid(InvalidReason::TooShort));
        assert_eq!(validate(""), Validation::Invalid(InvalidReason::TooShort));
        assert_eq!(validate("12345"), Validation::Invalid(InvalidReason::DigitsOnly));
        assert_eq!(
            validate("?!?!"),
            Validation::Invalid(InvalidReason::PunctuationOnly)
        );
    }

    #[test]
    fn keyboard_mash_fails_the_vowel_heuristic() {
        assert_eq!(
            validate("asdfghjk"),
            Validation::Invalid(InvalidReason::Gibberish)
        );
        assert_eq!(
            validate("zzzzxxxx"),
            Validation::Invalid(InvalidReason::Gibberish)
        );
    }

    #[test]
    fn ordinary_sentences_pass() {
        assert_eq!(
            validate("I want a laptop for gaming"),
            Validation::Valid { price_intent: false }
        );
        assert_eq!(
            validate("recommend me a mystery novel"),
            Validation::Valid { price_intent: false }
        );
    }

    #[test]
    fn fuzzy_corrects_misspelled_domains() {
        let registry = Registry::builtin();
        assert_eq!(
            correct_domain_terms("boks", &registry).as_deref(),
            Some("books")
        );
        assert_eq!(
            correct_domain_terms("i need a labtop", &registry).as_deref(),
            Some("i need a laptop")
        );
    }

    #[test]
    fn fuzzy_leaves_clean_messages_alone() {
        let registry = Registry::builtin();
        assert_eq!(correct_domain_terms("I want a laptop", &registry), None);
        assert_eq!(correct_domain_terms("hello there", &registry), None);
    }

    #[test]
    fn fuzzy_requires_sixty_percent_similarity() {
        let registry = Registry::builtin();
        // "cool" is distance 2 from "book" but only 50% similar.
        assert_eq!(correct_domain_terms("cool", &registry), None);
    }

    #[test]
    fn fuzzy_never_touches_stoplisted_words() {
        let registry = Registry::builtin();
        assert_eq!(correct_domain_terms("add it to my cart", &registry), None);
        assert_eq!(correct_domain_terms("let me look around", &registry), None);
    }

    #[test]
    fn impatience_phrases_match_case_insensitively() {
        assert!(impatience_phrase("Just SHOW me"));
        assert!(impatience_phrase("ok enough questions already"));
        assert!(!impatience_phrase("what would you ask next?"));
    }

    #[test]
    fn quick_replies_cover_known_domains() {
        let replies = domain_quick_replies(&Registry::builtin());
        assert_eq!(replies, vec!["Vehicles", "Laptops", "Books"]);
    }

    #[test]
    fn keyword_domain_resolves() {
        let registry = Registry::builtin();
        assert_eq!(keyword_domain("books", &registry), Some(Domain::Books));
        assert_eq!(keyword_domain("suv", &registry), Some(Domain::Vehicles));
        assert_eq!(keyword_domain("toaster", &registry), None);
    }
}
