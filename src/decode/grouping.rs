use crate::data::Vocabulary;
use crate::types::RankedResult;

const NEAR_TIE_EPS: f32 = 1e-4;

/// Reduces consecutive groups of `group_size` results to the sample index of
/// the single best hypothesis per group.
///
/// Within a group the lowest best-score wins; among candidates within
/// `NEAR_TIE_EPS` of it, the first one without an `<unk>` token is preferred.
pub fn reduce_pairs(results: &[RankedResult], group_size: usize) -> Vec<usize> {
    let group_size = group_size.max(1);
    results
        .chunks(group_size)
        .enumerate()
        .map(|(group, members)| group * group_size + select_in_group(members))
        .collect()
}

fn select_in_group(members: &[RankedResult]) -> usize {
    let scores: Vec<f32> = members
        .iter()
        .map(|r| r.best().map(|(_, score)| score).unwrap_or(f32::INFINITY))
        .collect();
    let best = scores.iter().copied().fold(f32::INFINITY, f32::min);

    let near_best: Vec<usize> = scores
        .iter()
        .enumerate()
        .filter(|(_, &score)| score <= best + NEAR_TIE_EPS)
        .map(|(idx, _)| idx)
        .collect();

    let without_unk = near_best.iter().copied().find(|&idx| {
        members[idx]
            .best()
            .map(|(hyp, _)| !Vocabulary::contains_unk(hyp))
            .unwrap_or(false)
    });

    let selected = without_unk.or_else(|| near_best.first().copied()).unwrap_or(0);
    tracing::debug!(
        selected,
        score = scores.get(selected).copied().unwrap_or(f32::INFINITY),
        candidates = near_best.len(),
        "pairs: selected group hypothesis"
    );
    selected
}
