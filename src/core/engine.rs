use crate::config::{DecoderConfig, EngineConfig};
use crate::core::decoder::ViterbiDecoder;
use crate::core::keyboard::{KeyboardLayout, KeyboardModel};
use crate::core::language::{LanguageModel, TransitionTable};
use crate::core::types::CorrectionResult;
use crate::error::Result;
use crate::persistence::{load_layout, load_snapshot, load_transition_table, load_vocabulary};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Where the engine's data providers live on disk.
#[derive(Debug, Clone)]
pub struct ModelPaths {
    pub vocabulary: PathBuf,
    pub transition_table: PathBuf,
    /// Built-in Spanish QWERTY when absent.
    pub layout: Option<PathBuf>,
}

// The engine composes the two read-only models behind a decoder. Cloning is
// cheap and clones share the models, so one engine can serve many threads.
#[derive(Debug, Clone)]
pub struct CorrectionEngine {
    decoder: ViterbiDecoder<Arc<LanguageModel>, Arc<KeyboardModel>>,
}

impl CorrectionEngine {
    /// Rejects decoder weights that `EngineConfig::validate` would reject.
    pub fn new(language_model: LanguageModel, keyboard_model: KeyboardModel, config: DecoderConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            decoder: ViterbiDecoder::with_config(Arc::new(language_model), Arc::new(keyboard_model), config),
        })
    }

    pub fn from_parts<I, S>(
        vocabulary: I,
        layout: KeyboardLayout,
        table: &TransitionTable,
        config: &EngineConfig,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        config.validate()?;
        let language_model = LanguageModel::new(table, config.language.clone())?;
        let keyboard_model = KeyboardModel::new(vocabulary, layout, config.keyboard.clone());
        Self::new(language_model, keyboard_model, config.decoder.clone())
    }

    /// Loads every data provider from disk. Any missing file aborts
    /// construction with `ModelUnavailable`.
    pub fn from_paths(paths: &ModelPaths, config: &EngineConfig) -> Result<Self> {
        let vocabulary = load_vocabulary(&paths.vocabulary)?;
        let table = load_transition_table(&paths.transition_table)?;
        let layout = match &paths.layout {
            Some(path) => load_layout(path)?,
            None => KeyboardLayout::qwerty_es(),
        };
        Self::from_parts(vocabulary, layout, &table, config)
    }

    pub fn from_snapshot(path: &Path, config: &EngineConfig) -> Result<Self> {
        let snapshot = load_snapshot(path)?;
        Self::from_parts(snapshot.vocabulary, snapshot.layout, &snapshot.table, config)
    }

    pub fn solve(&self, sentence: &str) -> CorrectionResult {
        self.decoder.solve(sentence)
    }

    pub fn solve_cancellable(&self, sentence: &str, cancel: &AtomicBool) -> Result<CorrectionResult> {
        self.decoder.solve_cancellable(sentence, cancel)
    }

    /// Decodes independent sentences in parallel. Results keep input order.
    pub fn solve_batch<S: AsRef<str> + Sync>(&self, sentences: &[S]) -> Vec<CorrectionResult> {
        sentences
            .par_iter()
            .map(|sentence| self.decoder.solve(sentence.as_ref()))
            .collect()
    }

    pub fn language_model(&self) -> &LanguageModel {
        self.decoder.language_model()
    }

    pub fn keyboard_model(&self) -> &KeyboardModel {
        self.decoder.keyboard_model()
    }

    pub fn decoder_config(&self) -> &DecoderConfig {
        self.decoder.config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::KeyboardError;
    use std::sync::atomic::Ordering;

    fn engine() -> CorrectionEngine {
        let mut table = TransitionTable::new();
        table.insert("el", "gato", 0.4);
        table.insert("el", "pato", 0.01);
        table.insert("gato", "come", 0.3);
        table.insert("pato", "come", 0.01);
        let vocabulary = ["el", "al", "gato", "pato", "come", "cine"];
        CorrectionEngine::from_parts(vocabulary, KeyboardLayout::qwerty_es(), &table, &EngineConfig::default())
            .unwrap()
    }

    #[test]
    fn test_adjacent_key_typo_corrected_in_context() {
        let result = engine().solve("el gsto come");
        assert_eq!(result.corrected_text, "el gato come");
        assert_eq!(result.corrections().count(), 1);
    }

    #[test]
    fn test_correct_sentence_is_a_fixed_point() {
        let engine = engine();
        let once = engine.solve("el gsto come");
        let twice = engine.solve(&once.corrected_text);
        assert_eq!(twice.corrected_text, once.corrected_text);
    }

    #[test]
    fn test_batch_keeps_input_order() {
        let engine = engine();
        let sentences = ["el gsto", "", "el gato come", "come"];
        let results = engine.solve_batch(&sentences);
        assert_eq!(results.len(), 4);
        for (sentence, result) in sentences.iter().zip(&results) {
            assert_eq!(result, &engine.solve(sentence));
        }
        assert_eq!(results[0].corrected_text, "el gato");
        assert!(results[1].is_empty());
    }

    #[test]
    fn test_engine_is_shareable_across_threads() {
        let engine = engine();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let engine = engine.clone();
                std::thread::spawn(move || engine.solve("el gsto come").corrected_text)
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), "el gato come");
        }
    }

    #[test]
    fn test_cancelled_engine_call() {
        let cancel = AtomicBool::new(false);
        cancel.store(true, Ordering::Relaxed);
        let err = engine().solve_cancellable("el gsto come", &cancel).unwrap_err();
        assert!(matches!(err, KeyboardError::Cancelled { .. }));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = EngineConfig::default();
        config.decoder.beta = f64::NAN;
        let err = CorrectionEngine::from_parts(["gato"], KeyboardLayout::qwerty_es(), &TransitionTable::new(), &config)
            .unwrap_err();
        assert!(matches!(err, KeyboardError::InvalidModel(_)));
    }

    #[test]
    fn test_new_rejects_invalid_decoder_weights() {
        let lm = LanguageModel::new(&TransitionTable::new(), Default::default()).unwrap();
        let km = KeyboardModel::new(["gato"], KeyboardLayout::qwerty_es(), Default::default());
        let config = DecoderConfig { alpha: -1.0, ..DecoderConfig::default() };
        let err = CorrectionEngine::new(lm.clone(), km.clone(), config).unwrap_err();
        assert!(matches!(err, KeyboardError::InvalidModel(_)));

        let engine = CorrectionEngine::new(lm, km, DecoderConfig::default()).unwrap();
        assert_eq!(engine.solve("gsto").corrected_text, "gato");
    }

    #[test]
    fn test_missing_table_aborts_construction() {
        let dir = tempfile::tempdir().unwrap();
        let vocab = dir.path().join("vocab.txt");
        std::fs::write(&vocab, "gato\n").unwrap();
        let paths = ModelPaths {
            vocabulary: vocab,
            transition_table: dir.path().join("missing.json"),
            layout: None,
        };
        let err = CorrectionEngine::from_paths(&paths, &EngineConfig::default()).unwrap_err();
        assert!(matches!(err, KeyboardError::ModelUnavailable { .. }));
    }
}
