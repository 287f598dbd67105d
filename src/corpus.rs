// File: src/corpus.rs
//! Offline construction of the bigram transition table from plain text.
//!
//! Text is lowercased and split on anything that is not a letter, so accented
//! letters and `ñ` stay inside words while digits and punctuation separate
//! them. Probabilities use Laplace smoothing:
//! `P(w2 | w1) = (count(w1, w2) + 1) / (count(w1) + V)`, with `V` the number
//! of distinct words seen.

use crate::core::language::TransitionTable;
use std::cmp::Reverse;
use std::collections::HashMap;
use std::io::BufRead;

const PROGRESS_EVERY: u64 = 1_000_000;

/// Lowercase alphabetic tokens of `text`, in order.
pub fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphabetic())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
}

#[derive(Debug, Clone, Default)]
pub struct BigramCounter {
    unigrams: HashMap<String, u64>,
    bigrams: HashMap<(String, String), u64>,
    tokens: u64,
}

impl BigramCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one document. Bigrams never span two documents.
    pub fn add_document(&mut self, text: &str) {
        let mut prev: Option<String> = None;
        for token in tokenize(text) {
            *self.unigrams.entry(token.clone()).or_insert(0) += 1;
            if let Some(prev) = prev.take() {
                *self.bigrams.entry((prev, token.clone())).or_insert(0) += 1;
            }
            prev = Some(token);

            self.tokens += 1;
            if self.tokens % PROGRESS_EVERY == 0 {
                tracing::info!(millions = self.tokens / PROGRESS_EVERY, "tokens counted");
            }
        }
    }

    /// Counts every line of `reader` as its own document.
    pub fn add_lines<R: BufRead>(&mut self, reader: R) -> std::io::Result<()> {
        for line in reader.lines() {
            self.add_document(&line?);
        }
        Ok(())
    }

    pub fn token_count(&self) -> u64 {
        self.tokens
    }

    pub fn vocab_size(&self) -> usize {
        self.unigrams.len()
    }

    pub fn bigram_count(&self) -> usize {
        self.bigrams.len()
    }

    pub fn unigram(&self, word: &str) -> u64 {
        self.unigrams.get(word).copied().unwrap_or(0)
    }

    /// The `n` most frequent words, ties in lexicographic order.
    pub fn top_words(&self, n: usize) -> Vec<String> {
        let mut words: Vec<(&String, u64)> = self.unigrams.iter().map(|(w, &c)| (w, c)).collect();
        words.sort_by_key(|&(word, count)| (Reverse(count), word));
        words.into_iter().take(n).map(|(word, _)| word.clone()).collect()
    }

    /// Laplace-smoothed table over every observed bigram.
    pub fn to_transition_table(&self) -> TransitionTable {
        let vocab = self.unigrams.len() as f64;
        let mut table = TransitionTable::new();
        for ((w1, w2), &count) in &self.bigrams {
            let count_w1 = self.unigram(w1) as f64;
            table.insert(w1, w2, (count as f64 + 1.0) / (count_w1 + vocab));
        }
        tracing::debug!(
            vocab = self.unigrams.len(),
            bigrams = self.bigrams.len(),
            "transition table computed"
        );
        table
    }
}
