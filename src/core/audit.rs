// File: src/core/audit.rs
//! Per-position ranking of evaluated candidates, kept for transparency.

use crate::core::types::{AuditEntry, RankedCandidate};
use std::cmp::Ordering;
use std::fmt;

/// Descending by score; equal scores resolve to the lexicographically
/// smaller word.
pub fn by_score_then_word(a: (f64, &str), b: (f64, &str)) -> Ordering {
    b.0.total_cmp(&a.0).then_with(|| a.1.cmp(b.1))
}

/// Sorts `ranking` best first and keeps the top `keep` entries.
pub fn top_ranked(mut ranking: Vec<RankedCandidate>, keep: usize) -> Vec<RankedCandidate> {
    ranking.sort_by(|a, b| {
        by_score_then_word(
            (a.total_score, a.candidate.as_str()),
            (b.total_score, b.candidate.as_str()),
        )
    });
    ranking.truncate(keep);
    ranking
}

/// Plain-text table of one audit entry.
pub struct AuditTable<'a>(pub &'a AuditEntry);

impl fmt::Display for AuditTable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entry = self.0;
        writeln!(f, "#{} {} -> {}", entry.position, entry.original, entry.chosen)?;
        writeln!(f, "  {:<18} {:>9} {:>9} {:>10}", "candidate", "context", "keyboard", "total")?;
        for ranked in &entry.ranking {
            let marker = if ranked.candidate == entry.chosen { '*' } else { ' ' };
            writeln!(
                f,
                "{marker} {:<18} {:>9.2} {:>9.2} {:>10.2}",
                ranked.candidate, ranked.context_score, ranked.keyboard_score, ranked.total_score
            )?;
        }
        Ok(())
    }
}
