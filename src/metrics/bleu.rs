use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::data::corpus::read_lines;
use crate::error::{ConfigError, TranslateError};
use crate::metrics::{MetricScore, Scorer};

pub const DEFAULT_MAX_ORDER: usize = 4;

/// Corpus-level BLEU statistics, `score` on a 0-100 scale.
#[derive(Debug, Clone, PartialEq)]
pub struct BleuStats {
    pub score: f64,
    pub precisions: Vec<f64>,
    pub brevity_penalty: f64,
    pub hypothesis_length: usize,
    pub reference_length: usize,
}

impl BleuStats {
    pub fn render(&self) -> String {
        let precisions = self
            .precisions
            .iter()
            .map(|p| format!("{:.1}", p * 100.0))
            .collect::<Vec<_>>()
            .join("/");
        let ratio = if self.reference_length == 0 {
            0.0
        } else {
            self.hypothesis_length as f64 / self.reference_length as f64
        };
        format!(
            "BLEU = {:.2}, {precisions} (BP={:.3}, ratio={ratio:.3}, hyp_len={}, ref_len={})",
            self.score, self.brevity_penalty, self.hypothesis_length, self.reference_length
        )
    }
}

#[derive(Debug, Clone)]
pub struct BleuScorer {
    max_order: usize,
}

impl BleuScorer {
    pub fn new(max_order: usize) -> Self {
        Self {
            max_order: max_order.max(1),
        }
    }
}

impl Default for BleuScorer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ORDER)
    }
}

impl Scorer for BleuScorer {
    fn score(
        &self,
        references: &[PathBuf],
        hypothesis: &Path,
    ) -> Result<Option<MetricScore>, TranslateError> {
        if references.is_empty() {
            return Ok(None);
        }
        let hypotheses = read_lines(hypothesis, "read hypotheses for BLEU")?;
        let mut reference_sets: Vec<Vec<String>> = vec![Vec::new(); hypotheses.len()];
        for path in references {
            let lines = read_lines(path, "read references for BLEU")?;
            if lines.len() != hypotheses.len() {
                return Err(ConfigError::ReferenceCountMismatch {
                    path: path.display().to_string(),
                    expected: hypotheses.len(),
                    found: lines.len(),
                }
                .into());
            }
            for (set, line) in reference_sets.iter_mut().zip(lines) {
                set.push(line);
            }
        }

        let hyp_tokens: Vec<Vec<&str>> = hypotheses
            .iter()
            .map(|line| line.split_whitespace().collect())
            .collect();
        let ref_tokens: Vec<Vec<Vec<&str>>> = reference_sets
            .iter()
            .map(|set| set.iter().map(|r| r.split_whitespace().collect()).collect())
            .collect();

        let stats = corpus_bleu(&hyp_tokens, &ref_tokens, self.max_order);
        Ok(Some(MetricScore {
            rendering: stats.render(),
            value: stats.score,
        }))
    }
}

/// Clipped n-gram precision with brevity penalty, accumulated over the corpus.
///
/// The effective reference length of a sentence is the reference length
/// closest to the hypothesis length, the shorter one on ties.
pub fn corpus_bleu<'a>(
    hypotheses: &[Vec<&'a str>],
    references: &[Vec<Vec<&'a str>>],
    max_order: usize,
) -> BleuStats {
    let mut matches = vec![0usize; max_order];
    let mut totals = vec![0usize; max_order];
    let mut hyp_len = 0usize;
    let mut ref_len = 0usize;

    for (hyp, refs) in hypotheses.iter().zip(references) {
        hyp_len += hyp.len();
        ref_len += closest_length(hyp.len(), refs);

        for order in 1..=max_order {
            let hyp_counts = ngram_counts(hyp, order);
            let mut max_ref_counts: HashMap<&[&str], usize> = HashMap::new();
            for reference in refs {
                for (gram, count) in ngram_counts(reference, order) {
                    let entry = max_ref_counts.entry(gram).or_insert(0);
                    *entry = (*entry).max(count);
                }
            }
            for (gram, count) in &hyp_counts {
                let clip = max_ref_counts.get(gram).copied().unwrap_or(0);
                matches[order - 1] += (*count).min(clip);
            }
            totals[order - 1] += hyp.len().saturating_sub(order - 1);
        }
    }

    let precisions: Vec<f64> = matches
        .iter()
        .zip(&totals)
        .map(|(&m, &t)| if t == 0 { 0.0 } else { m as f64 / t as f64 })
        .collect();

    let brevity_penalty = if hyp_len == 0 {
        0.0
    } else if hyp_len > ref_len {
        1.0
    } else {
        (1.0 - ref_len as f64 / hyp_len as f64).exp()
    };

    let score = if precisions.iter().any(|&p| p == 0.0) {
        0.0
    } else {
        let log_mean = precisions.iter().map(|p| p.ln()).sum::<f64>() / max_order as f64;
        brevity_penalty * log_mean.exp() * 100.0
    };

    BleuStats {
        score,
        precisions,
        brevity_penalty,
        hypothesis_length: hyp_len,
        reference_length: ref_len,
    }
}

fn closest_length(hyp_len: usize, references: &[Vec<&str>]) -> usize {
    references
        .iter()
        .map(Vec::len)
        .min_by_key(|&len| (len.abs_diff(hyp_len), len))
        .unwrap_or(0)
}

fn ngram_counts<'a, 'b>(tokens: &'b [&'a str], order: usize) -> HashMap<&'b [&'a str], usize> {
    let mut counts = HashMap::new();
    if order == 0 || tokens.len() < order {
        return counts;
    }
    for gram in tokens.windows(order) {
        *counts.entry(gram).or_insert(0) += 1;
    }
    counts
}
