use super::extract::RawRecord;
use super::header::SubjectColumn;

/// Competition ranking ("1224"): ties share a rank, the next distinct score
/// takes its 1-based position. Absent scores sort last.
///
/// `ranks[i]` belongs to `scores[i]`; the input order is never disturbed.
pub fn assign_ranks(scores: &[Option<f64>]) -> Vec<u32> {
    let key = |i: usize| scores[i].unwrap_or(f64::NEG_INFINITY);

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| key(b).total_cmp(&key(a)));

    let mut ranks = vec![0u32; scores.len()];
    let mut rank = 1u32;
    for (pos, &idx) in order.iter().enumerate() {
        if pos > 0 && key(idx) < key(order[pos - 1]) {
            rank = pos as u32 + 1;
        }
        ranks[idx] = rank;
    }
    ranks
}

/// Ranks totals unless every record already carries an explicit total rank,
/// in which case those are kept verbatim. Returns whether ranks were computed.
pub fn rank_totals(records: &mut [RawRecord]) -> bool {
    let incomplete = records.iter().any(|r| r.explicit_total_rank.is_none());
    if incomplete {
        let scores: Vec<Option<f64>> = records.iter().map(|r| Some(r.total_score)).collect();
        for (r, rank) in records.iter_mut().zip(assign_ranks(&scores)) {
            r.total_rank = Some(rank);
        }
    } else {
        for r in records.iter_mut() {
            r.total_rank = r.explicit_total_rank;
        }
    }
    incomplete
}

/// Per subject, ranks the records holding that subject when any of them lacks
/// a rank. Returns the names of the subjects that were ranked.
pub fn rank_subjects(records: &mut [RawRecord], subjects: &[SubjectColumn]) -> Vec<String> {
    let mut ranked = Vec::new();
    for subject in subjects {
        // (record index, subject index) of every record holding this subject.
        let holders: Vec<(usize, usize)> = records
            .iter()
            .enumerate()
            .filter_map(|(ri, r)| {
                r.subjects
                    .iter()
                    .position(|s| s.name == subject.name)
                    .map(|si| (ri, si))
            })
            .collect();

        let incomplete = holders
            .iter()
            .any(|&(ri, si)| records[ri].subjects[si].rank.is_none());
        if !incomplete {
            continue;
        }

        let scores: Vec<Option<f64>> = holders
            .iter()
            .map(|&(ri, si)| records[ri].subjects[si].score)
            .collect();
        for (&(ri, si), rank) in holders.iter().zip(assign_ranks(&scores)) {
            records[ri].subjects[si].rank = Some(rank);
        }
        ranked.push(subject.name.clone());
    }
    ranked
}
