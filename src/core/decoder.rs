// File: src/core/decoder.rs
use crate::config::DecoderConfig;
use crate::core::audit::{by_score_then_word, top_ranked};
use crate::core::keyboard::EmissionModel;
use crate::core::language::TransitionModel;
use crate::core::types::{AuditEntry, CorrectionResult, RankedCandidate, START_TOKEN};
use crate::error::{KeyboardError, Result};
use std::collections::HashSet;
use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, Ordering};

/// One lattice cell: best cumulative score reaching `word` at its time step
/// and the index of the predecessor cell achieving it.
#[derive(Debug, Clone)]
struct LatticeCell {
    word: String,
    emission: f64,
    score: f64,
    backpointer: Option<usize>,
}

/// First-order Viterbi decoder over per-word candidate sets.
///
/// Scores combine linearly as `alpha * transition + beta * emission`. The
/// first position is scored against [`START_TOKEN`] like every later position
/// is scored against its predecessor. Equal scores resolve to the
/// lexicographically smaller word, so output never depends on map order.
#[derive(Debug, Clone)]
pub struct ViterbiDecoder<L, K> {
    lm: L,
    km: K,
    config: DecoderConfig,
}

impl<L: TransitionModel, K: EmissionModel> ViterbiDecoder<L, K> {
    pub fn new(lm: L, km: K) -> Self {
        Self::with_config(lm, km, DecoderConfig::default())
    }

    pub fn with_config(lm: L, km: K, config: DecoderConfig) -> Self {
        Self { lm, km, config }
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    pub fn language_model(&self) -> &L {
        &self.lm
    }

    pub fn keyboard_model(&self) -> &K {
        &self.km
    }

    /// Most probable corrected sentence for `sentence`. Empty input yields an
    /// empty result.
    pub fn solve(&self, sentence: &str) -> CorrectionResult {
        match self.decode(sentence, |_| Ok::<(), Infallible>(())) {
            Ok(result) => result,
            Err(never) => match never {},
        }
    }

    /// Like [`solve`](Self::solve), but checks `cancel` before every sentence
    /// position and stops with [`KeyboardError::Cancelled`] once it is set.
    pub fn solve_cancellable(&self, sentence: &str, cancel: &AtomicBool) -> Result<CorrectionResult> {
        self.decode(sentence, |position| {
            if cancel.load(Ordering::Relaxed) {
                tracing::debug!(position, "decode cancelled");
                Err(KeyboardError::Cancelled { position })
            } else {
                Ok(())
            }
        })
    }

    fn decode<E>(
        &self,
        sentence: &str,
        mut checkpoint: impl FnMut(usize) -> std::result::Result<(), E>,
    ) -> std::result::Result<CorrectionResult, E> {
        let words: Vec<String> = sentence.split_whitespace().map(str::to_lowercase).collect();

        match words.len() {
            0 => Ok(CorrectionResult::empty()),
            1 => {
                checkpoint(0)?;
                Ok(self.solve_single(&words[0]))
            }
            _ => self.solve_sequence(&words, checkpoint),
        }
    }

    fn weighted(&self, transition: f64, emission: f64) -> f64 {
        self.config.alpha * transition + self.config.beta * emission
    }

    /// Distinct candidates in model order; the typed word itself when the
    /// model offers none.
    fn candidates_for(&self, typed: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut candidates: Vec<String> = self
            .km
            .candidates(typed)
            .into_iter()
            .filter(|c| seen.insert(c.clone()))
            .collect();
        if candidates.is_empty() {
            candidates.push(typed.to_string());
        }
        candidates
    }

    fn solve_single(&self, typed: &str) -> CorrectionResult {
        let mut ranking = Vec::new();
        let mut best: Option<(f64, String)> = None;

        for candidate in self.candidates_for(typed) {
            let context = self.lm.transition_log_prob(START_TOKEN, &candidate);
            let keyboard = self.km.emission_log_prob(typed, &candidate);
            let total = self.weighted(context, keyboard);

            let improves = match &best {
                None => true,
                Some((score, word)) => {
                    by_score_then_word((total, candidate.as_str()), (*score, word.as_str())).is_lt()
                }
            };
            if improves {
                best = Some((total, candidate.clone()));
            }

            ranking.push(RankedCandidate {
                candidate,
                context_score: context,
                keyboard_score: keyboard,
                total_score: total,
            });
        }

        let (best_score, chosen) = best.unwrap_or_else(|| (f64::NEG_INFINITY, typed.to_string()));
        tracing::trace!(typed, chosen = %chosen, best_score, "single word decoded");

        CorrectionResult {
            corrected_text: chosen.clone(),
            best_score,
            audit: vec![AuditEntry {
                position: 0,
                original: typed.to_string(),
                chosen,
                ranking: top_ranked(ranking, self.config.audit_size),
            }],
        }
    }

    fn solve_sequence<E>(
        &self,
        words: &[String],
        mut checkpoint: impl FnMut(usize) -> std::result::Result<(), E>,
    ) -> std::result::Result<CorrectionResult, E> {
        let mut lattice: Vec<Vec<LatticeCell>> = Vec::with_capacity(words.len());

        checkpoint(0)?;
        let first: Vec<LatticeCell> = self
            .candidates_for(&words[0])
            .into_iter()
            .map(|candidate| {
                let emission = self.km.emission_log_prob(&words[0], &candidate);
                let transition = self.lm.transition_log_prob(START_TOKEN, &candidate);
                LatticeCell {
                    score: self.weighted(transition, emission),
                    word: candidate,
                    emission,
                    backpointer: None,
                }
            })
            .collect();
        lattice.push(first);

        for (t, typed) in words.iter().enumerate().skip(1) {
            checkpoint(t)?;
            let prev_column = &lattice[t - 1];
            let candidates = self.candidates_for(typed);
            tracing::trace!(position = t, typed = %typed, candidates = candidates.len(), "lattice step");

            let mut column = Vec::with_capacity(candidates.len());
            for candidate in candidates {
                let emission = self.km.emission_log_prob(typed, &candidate);

                let mut best: Option<(usize, f64)> = None;
                for (idx, prev) in prev_column.iter().enumerate() {
                    let transition = self.lm.transition_log_prob(&prev.word, &candidate);
                    let total = prev.score + self.weighted(transition, emission);
                    let improves = match best {
                        None => true,
                        Some((best_idx, best_score)) => by_score_then_word(
                            (total, prev.word.as_str()),
                            (best_score, prev_column[best_idx].word.as_str()),
                        )
                        .is_lt(),
                    };
                    if improves {
                        best = Some((idx, total));
                    }
                }

                // The previous column is never empty, so `best` is always set.
                let (backpointer, score) = match best {
                    Some((idx, score)) => (Some(idx), score),
                    None => (None, f64::NEG_INFINITY),
                };
                column.push(LatticeCell { word: candidate, emission, score, backpointer });
            }
            lattice.push(column);
        }

        let path = Self::backtrack(&lattice);
        let best_score = match (lattice.last(), path.last()) {
            (Some(column), Some(&idx)) => column[idx].score,
            _ => f64::NEG_INFINITY,
        };
        let chosen: Vec<&str> = path
            .iter()
            .zip(&lattice)
            .map(|(&idx, column)| column[idx].word.as_str())
            .collect();

        let audit = self.audit(words, &lattice, &chosen);
        let corrected_text = chosen.join(" ");
        tracing::debug!(corrected = %corrected_text, best_score, "sentence decoded");

        Ok(CorrectionResult { corrected_text, best_score, audit })
    }

    /// Cell index per time step along the best path.
    fn backtrack(lattice: &[Vec<LatticeCell>]) -> Vec<usize> {
        let Some(last) = lattice.last() else {
            return vec![];
        };
        let Some(mut idx) = (0..last.len()).min_by(|&a, &b| {
            by_score_then_word(
                (last[a].score, last[a].word.as_str()),
                (last[b].score, last[b].word.as_str()),
            )
        }) else {
            return vec![];
        };

        let mut path = vec![0; lattice.len()];
        for t in (0..lattice.len()).rev() {
            path[t] = idx;
            match lattice[t][idx].backpointer {
                Some(prev) => idx = prev,
                None => break,
            }
        }
        path
    }

    /// Re-derives the score components of every retained candidate for display.
    /// Ranking follows the cumulative lattice score used for selection.
    fn audit(&self, words: &[String], lattice: &[Vec<LatticeCell>], chosen: &[&str]) -> Vec<AuditEntry> {
        lattice
            .iter()
            .enumerate()
            .map(|(t, column)| {
                let prev_word = if t == 0 { START_TOKEN } else { chosen[t - 1] };
                let ranking = column
                    .iter()
                    .map(|cell| RankedCandidate {
                        candidate: cell.word.clone(),
                        context_score: self.lm.transition_log_prob(prev_word, &cell.word),
                        keyboard_score: cell.emission,
                        total_score: cell.score,
                    })
                    .collect();
                AuditEntry {
                    position: t,
                    original: words[t].clone(),
                    chosen: chosen[t].to_string(),
                    ranking: top_ranked(ranking, self.config.audit_size),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// "el gato" is common, "el pato" less so.
    struct MockLm;

    impl TransitionModel for MockLm {
        fn transition_log_prob(&self, prev: &str, curr: &str) -> f64 {
            match (prev, curr) {
                (START_TOKEN, "el") => -0.1,
                ("el", "gato") => -0.5,
                ("el", "pato") => -3.0,
                _ => -10.0,
            }
        }
    }

    struct MockKm {
        candidates: HashMap<&'static str, Vec<&'static str>>,
    }

    impl MockKm {
        fn new() -> Self {
            let mut candidates = HashMap::new();
            candidates.insert("dl", vec!["el", "al"]);
            candidates.insert("gato", vec!["gato", "pato"]);
            Self { candidates }
        }
    }

    impl EmissionModel for MockKm {
        fn candidates(&self, typed: &str) -> Vec<String> {
            match self.candidates.get(typed) {
                Some(words) => words.iter().map(|w| w.to_string()).collect(),
                None => vec![typed.to_string()],
            }
        }

        fn emission_log_prob(&self, typed: &str, intended: &str) -> f64 {
            match (typed, intended) {
                _ if typed == intended => 0.0,
                ("dl", "el") => -1.0,
                ("dl", "al") => -2.0,
                _ => -5.0,
            }
        }
    }

    fn decoder() -> ViterbiDecoder<MockLm, MockKm> {
        ViterbiDecoder::new(MockLm, MockKm::new())
    }

    #[test]
    fn test_two_word_sentence_uses_context() {
        let result = decoder().solve("dl gato");
        assert_eq!(result.corrected_text, "el gato");
        // 1*(-0.1) + 2*(-1.0) + 1*(-0.5) + 2*0.0
        assert!((result.best_score - (-2.6)).abs() < 1e-9);
    }

    #[test]
    fn test_empty_input_gives_empty_result() {
        let result = decoder().solve("   ");
        assert_eq!(result.corrected_text, "");
        assert!(result.audit.is_empty());
        assert_eq!(result.best_score, 0.0);
    }

    #[test]
    fn test_single_word_applies_start_transition() {
        let result = decoder().solve("dl");
        assert_eq!(result.corrected_text, "el");
        assert!((result.best_score - (-2.1)).abs() < 1e-9);

        let entry = &result.audit[0];
        assert_eq!(entry.original, "dl");
        assert_eq!(entry.chosen, "el");
        assert_eq!(entry.ranking[0].candidate, "el");
        assert_eq!(entry.ranking[0].context_score, -0.1);
        assert_eq!(entry.ranking[0].keyboard_score, -1.0);
    }

    #[test]
    fn test_single_and_multi_word_paths_agree_on_first_position() {
        let single = decoder().solve("dl");
        let multi = decoder().solve("dl xyz");
        assert_eq!(single.audit[0].ranking, multi.audit[0].ranking);
    }

    #[test]
    fn test_audit_has_one_entry_per_word() {
        let result = decoder().solve("dl gato come");
        assert_eq!(result.audit.len(), 3);
        assert_eq!(result.corrected_text.split_whitespace().count(), 3);
        for (i, entry) in result.audit.iter().enumerate() {
            assert_eq!(entry.position, i);
            assert!(!entry.ranking.is_empty());
            assert!(entry.ranking.windows(2).all(|w| w[0].total_score >= w[1].total_score));
        }
        assert_eq!(result.audit[1].chosen, "gato");
        // Context of position 1 is measured from the chosen "el"
        let gato = result.audit[1].ranking.iter().find(|r| r.candidate == "gato").unwrap();
        assert_eq!(gato.context_score, -0.5);
    }

    #[test]
    fn test_input_is_lowercased() {
        let result = decoder().solve("DL Gato");
        assert_eq!(result.corrected_text, "el gato");
        assert_eq!(result.audit[0].original, "dl");
    }

    #[test]
    fn test_decoding_is_deterministic() {
        let d = decoder();
        let first = d.solve("dl gato dl gato");
        for _ in 0..5 {
            assert_eq!(d.solve("dl gato dl gato"), first);
        }
    }

    #[test]
    fn test_corrected_output_is_stable() {
        let d = decoder();
        let once = d.solve("dl gato");
        let twice = d.solve(&once.corrected_text);
        assert_eq!(twice.corrected_text, once.corrected_text);
    }

    struct FlatLm;

    impl TransitionModel for FlatLm {
        fn transition_log_prob(&self, _prev: &str, _curr: &str) -> f64 {
            -1.0
        }
    }

    struct TieKm;

    impl EmissionModel for TieKm {
        fn candidates(&self, _typed: &str) -> Vec<String> {
            vec!["pato".to_string(), "gato".to_string(), "pato".to_string()]
        }

        fn emission_log_prob(&self, _typed: &str, _intended: &str) -> f64 {
            -1.0
        }
    }

    #[test]
    fn test_ties_resolve_lexicographically() {
        let d = ViterbiDecoder::new(FlatLm, TieKm);
        assert_eq!(d.solve("xato").corrected_text, "gato");
        let result = d.solve("xato xato");
        assert_eq!(result.corrected_text, "gato gato");
        // duplicate candidates collapse into one lattice cell
        assert_eq!(result.audit[0].ranking.len(), 2);
    }

    /// "ka" types close to "xa" but is a rare start; "ma" is the opposite.
    struct TradeoffLm;

    impl TransitionModel for TradeoffLm {
        fn transition_log_prob(&self, _prev: &str, curr: &str) -> f64 {
            if curr == "ka" { -5.0 } else { -1.0 }
        }
    }

    struct TradeoffKm;

    impl EmissionModel for TradeoffKm {
        fn candidates(&self, _typed: &str) -> Vec<String> {
            vec!["ka".to_string(), "ma".to_string()]
        }

        fn emission_log_prob(&self, _typed: &str, intended: &str) -> f64 {
            if intended == "ka" { -0.5 } else { -3.0 }
        }
    }

    #[test]
    fn test_larger_beta_favours_keyboard_proximity() {
        let weights = |beta| DecoderConfig { alpha: 1.0, beta, audit_size: 5 };
        let context_led = ViterbiDecoder::with_config(TradeoffLm, TradeoffKm, weights(1.0));
        let keyboard_led = ViterbiDecoder::with_config(TradeoffLm, TradeoffKm, weights(3.0));
        assert_eq!(context_led.solve("xa").corrected_text, "ma");
        assert_eq!(keyboard_led.solve("xa").corrected_text, "ka");
    }

    struct ManyKm;

    impl EmissionModel for ManyKm {
        fn candidates(&self, _typed: &str) -> Vec<String> {
            (0..12).map(|i| format!("w{i:02}")).collect()
        }

        fn emission_log_prob(&self, _typed: &str, intended: &str) -> f64 {
            -(intended[1..].parse::<f64>().unwrap_or(0.0))
        }
    }

    #[test]
    fn test_audit_ranking_is_bounded() {
        let d = ViterbiDecoder::new(FlatLm, ManyKm);
        let result = d.solve("a b c");
        for entry in &result.audit {
            assert_eq!(entry.ranking.len(), 5);
        }
        assert_eq!(result.corrected_text, "w00 w00 w00");
    }

    struct EmptyKm;

    impl EmissionModel for EmptyKm {
        fn candidates(&self, _typed: &str) -> Vec<String> {
            vec![]
        }

        fn emission_log_prob(&self, _typed: &str, _intended: &str) -> f64 {
            0.0
        }
    }

    #[test]
    fn test_model_without_candidates_keeps_typed_words() {
        let d = ViterbiDecoder::new(FlatLm, EmptyKm);
        assert_eq!(d.solve("hola mundo").corrected_text, "hola mundo");
    }

    #[test]
    fn test_cancellation_between_positions() {
        let d = decoder();
        let cancel = AtomicBool::new(true);
        let err = d.solve_cancellable("dl gato", &cancel).unwrap_err();
        assert!(matches!(err, KeyboardError::Cancelled { position: 0 }));

        cancel.store(false, Ordering::Relaxed);
        let result = d.solve_cancellable("dl gato", &cancel).unwrap();
        assert_eq!(result.corrected_text, "el gato");
    }

    /// Raises the cancel flag once it is asked about `trigger`.
    struct CancellingKm<'a> {
        cancel: &'a AtomicBool,
        trigger: &'static str,
    }

    impl EmissionModel for CancellingKm<'_> {
        fn candidates(&self, typed: &str) -> Vec<String> {
            if typed == self.trigger {
                self.cancel.store(true, Ordering::Relaxed);
            }
            vec![typed.to_string()]
        }

        fn emission_log_prob(&self, _typed: &str, _intended: &str) -> f64 {
            0.0
        }
    }

    #[test]
    fn test_cancellation_mid_sentence_stops_at_next_position() {
        let cancel = AtomicBool::new(false);
        let d = ViterbiDecoder::new(FlatLm, CancellingKm { cancel: &cancel, trigger: "b" });
        let err = d.solve_cancellable("a b c d", &cancel).unwrap_err();
        assert!(matches!(err, KeyboardError::Cancelled { position: 2 }));
    }

    #[test]
    fn test_cancellation_raised_on_last_word_still_completes() {
        let cancel = AtomicBool::new(false);
        let d = ViterbiDecoder::new(FlatLm, CancellingKm { cancel: &cancel, trigger: "d" });
        let result = d.solve_cancellable("a b c d", &cancel).unwrap();
        assert_eq!(result.corrected_text, "a b c d");
        assert!(cancel.load(Ordering::Relaxed));
    }
}
