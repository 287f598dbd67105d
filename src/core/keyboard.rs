// File: src/core/keyboard.rs
use crate::config::KeyboardConfig;
use crate::core::types::{normalize_word, KeyPosition};
use crate::error::{KeyboardError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Emission score for pairs that cannot be compared at all (empty words).
pub const IMPOSSIBLE_LOG_PROB: f64 = -1e9;

/// Physical-plausibility side of the HMM: which intended words could have
/// produced a typed word, and how likely that typing error is.
pub trait EmissionModel {
    /// Plausible intended words for `typed`. Never empty for a non-empty word.
    fn candidates(&self, typed: &str) -> Vec<String>;

    /// `log P(typed | intended)`.
    fn emission_log_prob(&self, typed: &str, intended: &str) -> f64;
}

impl<T: EmissionModel + ?Sized> EmissionModel for Arc<T> {
    fn candidates(&self, typed: &str) -> Vec<String> {
        (**self).candidates(typed)
    }

    fn emission_log_prob(&self, typed: &str, intended: &str) -> f64 {
        (**self).emission_log_prob(typed, intended)
    }
}

impl<T: EmissionModel + ?Sized> EmissionModel for &T {
    fn candidates(&self, typed: &str) -> Vec<String> {
        (**self).candidates(typed)
    }

    fn emission_log_prob(&self, typed: &str, intended: &str) -> f64 {
        (**self).emission_log_prob(typed, intended)
    }
}

/// Character to key-centre map of a physical or virtual keyboard.
///
/// Serialized as the string-keyed map layout files use; deserializing goes
/// through [`KeyboardLayout::from_map`] so snapshots get the same checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "HashMap<String, KeyPosition>", into = "HashMap<String, KeyPosition>")]
pub struct KeyboardLayout {
    keys: HashMap<char, KeyPosition>,
}

impl KeyboardLayout {
    /// Builds a layout from string keys as found in layout JSON files.
    /// Every key must be exactly one character. Keys are lowercased, and two
    /// keys that lowercase to the same character are rejected.
    pub fn from_map(raw: HashMap<String, KeyPosition>) -> Result<Self> {
        let mut keys = HashMap::with_capacity(raw.len());
        for (key, position) in raw {
            let mut chars = key.chars();
            let c = match (chars.next(), chars.next()) {
                (Some(c), None) => fold_char(c),
                _ => {
                    return Err(KeyboardError::invalid_model(format!(
                        "layout key {key:?} is not a single character"
                    )))
                }
            };
            if !(position.x.is_finite() && position.y.is_finite()) {
                return Err(KeyboardError::invalid_model(format!(
                    "layout key {key:?} has a non-finite position"
                )));
            }
            if keys.insert(c, position).is_some() {
                return Err(KeyboardError::invalid_model(format!(
                    "layout key {key:?} collides with another key for {c:?}"
                )));
            }
        }
        if keys.is_empty() {
            return Err(KeyboardError::invalid_model("keyboard layout is empty"));
        }
        Ok(Self { keys })
    }

    /// Spanish QWERTY with the usual row stagger. Accented vowels sit on their
    /// base vowel's key.
    pub fn qwerty_es() -> Self {
        const ROWS: [(&str, f64); 3] = [("qwertyuiop", 0.0), ("asdfghjklñ", 0.25), ("zxcvbnm", 0.75)];
        let mut keys = HashMap::new();
        for (y, (row, offset)) in ROWS.iter().enumerate() {
            for (x, c) in row.chars().enumerate() {
                keys.insert(c, KeyPosition::new(x as f64 + offset, y as f64));
            }
        }
        for (accented, base) in [('á', 'a'), ('é', 'e'), ('í', 'i'), ('ó', 'o'), ('ú', 'u'), ('ü', 'u')] {
            if let Some(&position) = keys.get(&base) {
                keys.insert(accented, position);
            }
        }
        Self { keys }
    }

    pub fn position(&self, c: char) -> Option<KeyPosition> {
        self.keys.get(&fold_char(c)).copied()
    }

    /// Euclidean distance between two keys, if both are on the layout.
    pub fn distance(&self, a: char, b: char) -> Option<f64> {
        Some(self.position(a)?.distance(&self.position(b)?))
    }

    /// Keys within `max_distance` of `c`, nearest first (excluding `c`).
    pub fn nearby_keys(&self, c: char, max_distance: f64) -> Vec<(char, f64)> {
        let Some(origin) = self.position(c) else {
            return vec![];
        };
        let origin_char = fold_char(c);
        let mut nearby: Vec<(char, f64)> = self
            .keys
            .iter()
            .filter(|(&k, _)| k != origin_char)
            .map(|(&k, p)| (k, origin.distance(p)))
            .filter(|&(_, d)| d <= max_distance)
            .collect();
        nearby.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        nearby
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// String-keyed copy, the shape layout files use.
    pub fn to_map(&self) -> HashMap<String, KeyPosition> {
        self.keys.iter().map(|(c, p)| (c.to_string(), *p)).collect()
    }
}

impl TryFrom<HashMap<String, KeyPosition>> for KeyboardLayout {
    type Error = KeyboardError;

    fn try_from(raw: HashMap<String, KeyPosition>) -> Result<Self> {
        Self::from_map(raw)
    }
}

impl From<KeyboardLayout> for HashMap<String, KeyPosition> {
    fn from(layout: KeyboardLayout) -> Self {
        layout.to_map()
    }
}

/// Lowercases a single character when that does not expand it.
fn fold_char(c: char) -> char {
    let mut lower = c.to_lowercase();
    match (lower.next(), lower.next()) {
        (Some(l), None) => l,
        _ => c,
    }
}

/// Vocabulary plus geometry. Immutable after construction.
#[derive(Debug, Clone)]
pub struct KeyboardModel {
    layout: KeyboardLayout,
    config: KeyboardConfig,
    vocabulary: BTreeSet<String>,
    /// (first letter, length in chars) -> words of that shape, in lexicographic order.
    buckets: HashMap<(char, usize), Vec<String>>,
}

impl KeyboardModel {
    pub fn new<I, S>(vocabulary: I, layout: KeyboardLayout, config: KeyboardConfig) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let vocabulary: BTreeSet<String> = vocabulary
            .into_iter()
            .map(|w| normalize_word(w.as_ref()))
            .filter(|w| !w.is_empty())
            .collect();

        let mut buckets: HashMap<(char, usize), Vec<String>> = HashMap::new();
        for word in &vocabulary {
            if let Some(first) = word.chars().next() {
                // BTreeSet iteration keeps every bucket sorted.
                buckets
                    .entry((first, word.chars().count()))
                    .or_default()
                    .push(word.clone());
            }
        }

        tracing::debug!(
            words = vocabulary.len(),
            buckets = buckets.len(),
            keys = layout.len(),
            "keyboard model built"
        );

        Self { layout, config, vocabulary, buckets }
    }

    pub fn layout(&self) -> &KeyboardLayout {
        &self.layout
    }

    pub fn config(&self) -> &KeyboardConfig {
        &self.config
    }

    pub fn vocabulary(&self) -> impl Iterator<Item = &str> {
        self.vocabulary.iter().map(String::as_str)
    }

    pub fn vocabulary_len(&self) -> usize {
        self.vocabulary.len()
    }

    pub fn contains(&self, word: &str) -> bool {
        self.vocabulary.contains(&normalize_word(word))
    }

    /// Gaussian key-error model over positionally aligned characters, with a
    /// linear penalty on the length difference.
    pub fn emission_log_prob(&self, typed: &str, intended: &str) -> f64 {
        if typed.is_empty() || intended.is_empty() {
            return IMPOSSIBLE_LOG_PROB;
        }

        let two_variance = 2.0 * self.config.variance();
        let mut log_prob = 0.0;
        for (t, i) in typed.chars().zip(intended.chars()) {
            let Some(distance) = self.layout.distance(t, i) else {
                return self.config.unknown_char_penalty;
            };
            log_prob -= distance * distance / two_variance;
        }

        let len_diff = typed.chars().count().abs_diff(intended.chars().count());
        log_prob - self.config.length_penalty * len_diff as f64
    }

    /// Words sharing the first letter of `typed` whose length is within one
    /// character, best emission score first, at most `limit` of them. Falls
    /// back to the typed word itself when no bucket matches.
    pub fn get_candidates(&self, typed: &str, limit: usize) -> Vec<String> {
        let typed = normalize_word(typed);
        let Some(first) = typed.chars().next() else {
            return vec![];
        };
        let len = typed.chars().count();

        let mut pool: BTreeSet<&str> = BTreeSet::new();
        for shape_len in [Some(len), Some(len + 1), len.checked_sub(1)].into_iter().flatten() {
            if let Some(bucket) = self.buckets.get(&(first, shape_len)) {
                pool.extend(bucket.iter().map(String::as_str));
            }
        }

        if pool.is_empty() {
            tracing::trace!(word = %typed, "no bucket matches, keeping typed word");
            return vec![typed];
        }

        let mut scored: Vec<(&str, f64)> = pool
            .into_iter()
            .map(|word| (word, self.emission_log_prob(&typed, word)))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));

        scored
            .into_iter()
            .take(limit.max(1))
            .map(|(word, _)| word.to_string())
            .collect()
    }
}

impl EmissionModel for KeyboardModel {
    fn candidates(&self, typed: &str) -> Vec<String> {
        self.get_candidates(typed, self.config.candidate_limit)
    }

    fn emission_log_prob(&self, typed: &str, intended: &str) -> f64 {
        KeyboardModel::emission_log_prob(self, typed, intended)
    }
}
