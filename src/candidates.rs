use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Longest candidate, in code points, that can still be a single letter plus noise
pub const MAX_CANDIDATE_LEN: usize = 2;

/// One recognizer hypothesis for a drawing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub text: String,
    pub confidence: f64,
}

impl Candidate {
    pub fn new(text: impl Into<String>, confidence: f64) -> Self {
        Self {
            text: text.into(),
            confidence,
        }
    }
}

/// Whether `text` could be a drawn letter at all: one or two alphabetic code points
pub fn is_letter_like(text: &str) -> bool {
    let len = text.chars().count();
    (1..=MAX_CANDIDATE_LEN).contains(&len) && text.chars().all(char::is_alphabetic)
}

/// Pick the most confident letter-like candidate strictly above `threshold`.
///
/// The returned candidate's text is uppercased. Candidates with equal
/// confidence keep the recognizer's order.
pub fn best_candidate(candidates: &[Candidate], threshold: f64) -> Option<Candidate> {
    let best = candidates
        .iter()
        .sorted_by(|a, b| b.confidence.total_cmp(&a.confidence))
        .filter(|c| is_letter_like(&c.text))
        .find(|c| c.confidence > threshold)
        .map(|c| Candidate::new(c.text.to_uppercase(), c.confidence));

    debug!(
        candidates = candidates.len(),
        threshold,
        best = ?best.as_ref().map(|c| &c.text),
        "filtered recognizer candidates"
    );
    best
}
