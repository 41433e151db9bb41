use super::extract::RawRecord;

/// Settles `total_score` for the whole batch. One missing explicit total means
/// every total is recomputed from subject scores, so the ranking input stays
/// consistent. Returns whether recomputation happened.
pub fn aggregate_totals(records: &mut [RawRecord]) -> bool {
    let needs_recalc = records.iter().any(|r| r.explicit_total_score.is_none());
    for r in records.iter_mut() {
        r.total_score = match (needs_recalc, r.explicit_total_score) {
            (false, Some(explicit)) => explicit,
            _ => r.subjects.iter().map(|s| s.score.unwrap_or(0.0)).sum(),
        };
    }
    needs_recalc
}
