// File: src/core/session.rs
use crate::core::engine::CorrectionEngine;
use crate::core::types::{CorrectionResult, Identified};

/// Caller-owned context that numbers the results it produces. Each session
/// counts independently; there is no process-wide counter.
#[derive(Debug, Clone, Default)]
pub struct Session {
    next_id: u64,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resumes numbering at `first_id`, e.g. after a restart.
    pub fn starting_at(first_id: u64) -> Self {
        Self { next_id: first_id }
    }

    pub fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Number of results issued so far by this session.
    pub fn issued(&self) -> u64 {
        self.next_id
    }

    pub fn solve(&mut self, engine: &CorrectionEngine, sentence: &str) -> Identified<CorrectionResult> {
        let value = engine.solve(sentence);
        Identified { id: self.next_id(), value }
    }

    /// Decodes in parallel, then numbers results in input order.
    pub fn solve_batch<S: AsRef<str> + Sync>(
        &mut self,
        engine: &CorrectionEngine,
        sentences: &[S],
    ) -> Vec<Identified<CorrectionResult>> {
        engine
            .solve_batch(sentences)
            .into_iter()
            .map(|value| Identified { id: self.next_id(), value })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::core::keyboard::KeyboardLayout;
    use crate::core::language::TransitionTable;

    fn engine() -> CorrectionEngine {
        let mut table = TransitionTable::new();
        table.insert("hola", "mundo", 0.5);
        CorrectionEngine::from_parts(["hola", "mundo"], KeyboardLayout::qwerty_es(), &table, &EngineConfig::default())
            .unwrap()
    }

    #[test]
    fn test_ids_increase_monotonically() {
        let engine = engine();
        let mut session = Session::new();
        let first = session.solve(&engine, "hola");
        let second = session.solve(&engine, "hola mundo");
        assert_eq!(first.id, 0);
        assert_eq!(second.id, 1);
        assert_eq!(session.issued(), 2);
    }

    #[test]
    fn test_sessions_count_independently() {
        let engine = engine();
        let mut a = Session::new();
        let mut b = Session::starting_at(100);
        a.solve(&engine, "hola");
        assert_eq!(b.solve(&engine, "hola").id, 100);
        assert_eq!(a.solve(&engine, "hola").id, 1);
    }

    #[test]
    fn test_batch_ids_follow_input_order() {
        let engine = engine();
        let mut session = Session::starting_at(5);
        let results = session.solve_batch(&engine, &["hola", "hola mundo", ""]);
        let ids: Vec<u64> = results.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![5, 6, 7]);
        assert_eq!(results[1].value.corrected_text, "hola mundo");
        assert!(results[2].value.is_empty());
    }
}
