use crate::types::{RankedResult, RawResult};

/// Divides each raw score by its hypothesis length (empty hypotheses count as
/// length 1), orders ascending with a stable sort so ties keep beam order, and
/// keeps the first `nbest`. Only the best candidate's alignment survives.
pub fn rank_candidates(raw: RawResult, nbest: usize) -> RankedResult {
    let normalized: Vec<f32> = raw
        .hypotheses
        .iter()
        .zip(raw.scores.iter())
        .map(|(hyp, &score)| score / hyp.len().max(1) as f32)
        .collect();

    let mut order: Vec<usize> = (0..normalized.len()).collect();
    order.sort_by(|&a, &b| normalized[a].total_cmp(&normalized[b]));
    order.truncate(nbest);

    let best_alignment = match (raw.alignments, order.first()) {
        (Some(mut alignments), Some(&best)) if best < alignments.len() => {
            Some(alignments.swap_remove(best))
        }
        _ => None,
    };

    let mut hypotheses = raw.hypotheses;
    let ranked_hypotheses = order
        .iter()
        .map(|&idx| std::mem::take(&mut hypotheses[idx]))
        .collect();
    let ranked_scores = order.iter().map(|&idx| normalized[idx]).collect();

    RankedResult {
        sample_index: raw.sample_index,
        hypotheses: ranked_hypotheses,
        scores: ranked_scores,
        best_alignment,
    }
}
