// File: src/core/language.rs
use crate::config::LanguageConfig;
use crate::core::types::START_TOKEN;
use crate::error::{KeyboardError, Result};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

/// Contextual side of the HMM.
pub trait TransitionModel {
    /// `log P(curr | prev)`. `prev` may be [`START_TOKEN`].
    fn transition_log_prob(&self, prev: &str, curr: &str) -> f64;
}

impl<T: TransitionModel + ?Sized> TransitionModel for Arc<T> {
    fn transition_log_prob(&self, prev: &str, curr: &str) -> f64 {
        (**self).transition_log_prob(prev, curr)
    }
}

impl<T: TransitionModel + ?Sized> TransitionModel for &T {
    fn transition_log_prob(&self, prev: &str, curr: &str) -> f64 {
        (**self).transition_log_prob(prev, curr)
    }
}

/// Bigram probabilities `P(curr | prev)` as produced by the offline builder,
/// stored as plain probabilities in `(0, 1]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransitionTable {
    rows: HashMap<String, HashMap<String, f64>>,
}

impl TransitionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rows(rows: HashMap<String, HashMap<String, f64>>) -> Self {
        Self { rows }
    }

    pub fn insert(&mut self, prev: &str, curr: &str, probability: f64) {
        self.rows
            .entry(prev.to_string())
            .or_default()
            .insert(curr.to_string(), probability);
    }

    pub fn get(&self, prev: &str, curr: &str) -> Option<f64> {
        self.rows.get(prev)?.get(curr).copied()
    }

    pub fn rows(&self) -> impl Iterator<Item = (&str, &HashMap<String, f64>)> {
        self.rows.iter().map(|(prev, row)| (prev.as_str(), row))
    }

    /// Number of stored bigrams.
    pub fn len(&self) -> usize {
        self.rows.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.values().all(HashMap::is_empty)
    }
}

/// Read-only bigram model in log space.
#[derive(Debug, Clone)]
pub struct LanguageModel {
    bigram_log_probs: HashMap<String, HashMap<String, f64>>,
    vocab_size: usize,
    start_log_prob: f64,
    config: LanguageConfig,
}

impl LanguageModel {
    /// Converts a probability table to log space. Zero probabilities fall back
    /// to the unseen-bigram value; anything outside `[0, 1]` is rejected.
    ///
    /// Keys that only differ by case or surrounding whitespace collapse into
    /// one entry. Raw keys are applied in byte order and the last one wins, so
    /// an already-lowercase key overrides its capitalised variants.
    pub fn new(table: &TransitionTable, config: LanguageConfig) -> Result<Self> {
        let mut bigram_log_probs: HashMap<String, HashMap<String, f64>> = HashMap::new();
        let mut vocab: HashSet<String> = HashSet::new();
        let mut zero_probs = 0usize;

        let mut rows: Vec<(&str, &HashMap<String, f64>)> = table.rows().collect();
        rows.sort_unstable_by_key(|&(prev, _)| prev);

        for (prev, row) in rows {
            let prev = prev.trim().to_lowercase();
            let inner = bigram_log_probs.entry(prev.clone()).or_default();
            let mut entries: Vec<(&String, &f64)> = row.iter().collect();
            entries.sort_unstable_by_key(|&(curr, _)| curr);
            for (curr, &p) in entries {
                if !p.is_finite() || !(0.0..=1.0).contains(&p) {
                    return Err(KeyboardError::invalid_model(format!(
                        "P({curr} | {prev}) = {p} is not a probability"
                    )));
                }
                let log_p = if p == 0.0 {
                    zero_probs += 1;
                    config.unk_log_prob
                } else {
                    p.ln()
                };
                let curr = curr.trim().to_lowercase();
                vocab.insert(curr.clone());
                inner.insert(curr, log_p);
            }
            if !inner.is_empty() {
                vocab.insert(prev);
            }
        }

        if zero_probs > 0 {
            tracing::warn!(count = zero_probs, "zero probabilities replaced by the unseen-bigram fallback");
        }

        // Uniform start distribution over the known vocabulary.
        let start_log_prob = if vocab.is_empty() {
            config.unk_log_prob
        } else {
            -(vocab.len() as f64).ln()
        };

        tracing::debug!(
            contexts = bigram_log_probs.len(),
            vocab = vocab.len(),
            start_log_prob,
            "language model built"
        );

        Ok(Self {
            bigram_log_probs,
            vocab_size: vocab.len(),
            start_log_prob,
            config,
        })
    }

    /// Loads a JSON transition matrix. A missing file is a fatal
    /// [`KeyboardError::ModelUnavailable`].
    pub fn from_path(path: &Path, config: LanguageConfig) -> Result<Self> {
        let table = crate::persistence::load_transition_table(path)?;
        Self::new(&table, config)
    }

    pub fn start_log_prob(&self) -> f64 {
        self.start_log_prob
    }

    pub fn unk_log_prob(&self) -> f64 {
        self.config.unk_log_prob
    }

    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    pub fn transition_log_prob(&self, prev: &str, curr: &str) -> f64 {
        if prev.trim().eq_ignore_ascii_case(START_TOKEN) {
            return self.start_log_prob;
        }
        let prev = normalized(prev);
        let curr = normalized(curr);
        self.bigram_log_probs
            .get(prev.as_ref())
            .and_then(|row| row.get(curr.as_ref()))
            .copied()
            .unwrap_or(self.config.unk_log_prob)
    }
}

impl TransitionModel for LanguageModel {
    fn transition_log_prob(&self, prev: &str, curr: &str) -> f64 {
        LanguageModel::transition_log_prob(self, prev, curr)
    }
}

/// Trimmed lowercase form, borrowing when the word already is one.
fn normalized(word: &str) -> Cow<'_, str> {
    let trimmed = word.trim();
    if trimmed.chars().any(char::is_uppercase) {
        Cow::Owned(trimmed.to_lowercase())
    } else {
        Cow::Borrowed(trimmed)
    }
}
