//! Intent anchoring.
//!
//! The anchor is a one-sentence task statement fixed at session start.
//! Candidate instructions are scored against it with a token-set Jaccard
//! overlap; a score below the configured threshold is a drift warning.
//! The threshold is heuristic — it gates nothing by itself, the caller
//! decides whether to abort.

use chrono::{DateTime, Utc};
use std::collections::HashSet;

use super::hash::sha256_hex;

/// Function words excluded from overlap scoring.
const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "from", "in", "into", "is",
    "it", "its", "of", "on", "or", "our", "that", "the", "their", "then", "this", "to", "was",
    "we", "were", "will", "with", "you", "your",
];

/// Immutable task statement plus its hash.
#[derive(Debug, Clone)]
pub struct Anchor {
    text: String,
    sha256: String,
    created_at: DateTime<Utc>,
}

/// Outcome of a drift check. `ok == false` means the candidate's overlap
/// with the anchor fell below the threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriftCheck {
    pub ok: bool,
    pub overlap: f64,
    pub threshold: f64,
}

impl Anchor {
    pub fn create(text: &str, created_at: DateTime<Utc>) -> Self {
        Self {
            text: text.to_string(),
            sha256: sha256_hex(text.as_bytes()),
            created_at,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn sha256(&self) -> &str {
        &self.sha256
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Score a candidate instruction against the anchor.
    ///
    /// Jaccard overlap on lowercased, stop-word-filtered token sets.
    /// Two empty token sets agree perfectly; exactly one empty set is
    /// total drift.
    pub fn check(&self, candidate: &str, threshold: f64) -> DriftCheck {
        let anchor_tokens = significant_tokens(&self.text);
        let candidate_tokens = significant_tokens(candidate);

        let overlap = match (anchor_tokens.is_empty(), candidate_tokens.is_empty()) {
            (true, true) => 1.0,
            (true, false) | (false, true) => 0.0,
            (false, false) => {
                let intersection = anchor_tokens.intersection(&candidate_tokens).count();
                let union = anchor_tokens.union(&candidate_tokens).count();
                intersection as f64 / union as f64
            }
        };

        DriftCheck {
            ok: overlap >= threshold,
            overlap,
            threshold,
        }
    }
}

fn significant_tokens(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
        .filter(|t| !t.is_empty() && !STOP_WORDS.contains(&t.as_str()))
        .collect()
}
