// src/matching/validator.rs
//
// Closes the oracle's output over the candidate list it was offered.
use crate::models::matching::{MatchDecision, NO_MATCH};
use crate::utils::logging::{Stage, StageLogger};

const NULL_TOKENS: [&str; 5] = ["none", "null", "n/a", "na", ""];

/// Trims, strips one layer of wrapping quotes, and folds null-like tokens
/// into the sentinel.
pub fn normalize_prediction(raw: &str) -> String {
    let mut cleaned = raw.trim();
    for quote in ['"', '\''] {
        if cleaned.len() >= 2 && cleaned.starts_with(quote) && cleaned.ends_with(quote) {
            cleaned = cleaned[1..cleaned.len() - 1].trim();
            break;
        }
    }
    if NULL_TOKENS.contains(&cleaned.to_lowercase().as_str()) {
        NO_MATCH.to_string()
    } else {
        cleaned.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accepted(String),
    /// The oracle explicitly declined to match.
    Declined,
    /// Cleaned answer that is not among the candidates.
    Rejected(String),
}

impl Verdict {
    pub fn into_decision(self) -> MatchDecision {
        match self {
            Verdict::Accepted(name) => MatchDecision::Matched(name),
            Verdict::Declined | Verdict::Rejected(_) => MatchDecision::NoMatch,
        }
    }
}

pub fn classify_response(raw: &str, candidates: &[String]) -> Verdict {
    let cleaned = normalize_prediction(raw);
    if cleaned == NO_MATCH {
        return Verdict::Declined;
    }
    if candidates.iter().any(|c| *c == cleaned) {
        Verdict::Accepted(cleaned)
    } else {
        Verdict::Rejected(cleaned)
    }
}

/// Final decision for one oracle answer. Out-of-pool answers are logged and
/// become `NoMatch`.
pub fn validate_response(input_name: &str, raw: &str, candidates: &[String]) -> MatchDecision {
    let verdict = classify_response(raw, candidates);
    if let Verdict::Rejected(_) = &verdict {
        StageLogger::new(Stage::Validate).log_rejection(input_name, raw);
    }
    verdict.into_decision()
}
