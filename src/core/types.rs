// src/core/types.rs
use serde::{Deserialize, Serialize};

/// Reserved context marking the beginning of a sentence.
pub const START_TOKEN: &str = "<START>";

/// Position of a key's centre on a keyboard layout, in key-width units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KeyPosition {
    pub x: f64,
    pub y: f64,
}

impl KeyPosition {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &KeyPosition) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// One evaluated alternative for a sentence position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedCandidate {
    pub candidate: String,
    /// Raw transition log-probability from the chosen previous word.
    pub context_score: f64,
    /// Raw emission log-probability for the typed word.
    pub keyboard_score: f64,
    /// Best cumulative path score reaching this candidate.
    pub total_score: f64,
}

/// Explanation of the decision taken at one sentence position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub position: usize,
    pub original: String,
    pub chosen: String,
    /// Descending by `total_score`, bounded by the configured audit size.
    pub ranking: Vec<RankedCandidate>,
}

/// Output of a decode call. Always one audit entry per input word.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionResult {
    pub corrected_text: String,
    pub best_score: f64,
    pub audit: Vec<AuditEntry>,
}

impl CorrectionResult {
    pub fn empty() -> Self {
        Self {
            corrected_text: String::new(),
            best_score: 0.0,
            audit: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.audit.is_empty()
    }

    /// Positions where the chosen word differs from what was typed.
    pub fn corrections(&self) -> impl Iterator<Item = &AuditEntry> {
        self.audit.iter().filter(|entry| entry.original != entry.chosen)
    }
}

/// A result tagged with the identifier its session assigned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identified<T> {
    pub id: u64,
    #[serde(flatten)]
    pub value: T,
}

/// Lowercases and trims a word the way every model indexes it.
pub fn normalize_word(word: &str) -> String {
    word.trim().to_lowercase()
}
