use std::fmt;

/// Rows are target positions, columns are source positions.
pub type AttentionMatrix = Vec<Vec<f32>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WorkerId(pub usize);

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Payload {
    /// Whitespace-tokenized source sentence.
    pub source: Vec<String>,
    /// Auxiliary input such as pooled image features.
    pub features: Option<Vec<f32>>,
    /// Target sentence to score, only set for forced decoding.
    pub target: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub index: usize,
    pub payload: Payload,
    /// One entry per reference file, empty when no references were loaded.
    pub references: Vec<String>,
}

impl Sample {
    pub fn to_task(&self) -> Task {
        Task {
            sample_index: self.index,
            payload: self.payload.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub sample_index: usize,
    pub payload: Payload,
}

/// What a decode capability hands back for a single payload.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DecodeOutput {
    pub hypotheses: Vec<Vec<usize>>,
    pub scores: Vec<f32>,
    pub alignments: Option<Vec<AttentionMatrix>>,
}

impl DecodeOutput {
    pub fn into_raw(self, sample_index: usize) -> RawResult {
        RawResult {
            sample_index,
            hypotheses: self.hypotheses,
            scores: self.scores,
            alignments: self.alignments,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawResult {
    pub sample_index: usize,
    pub hypotheses: Vec<Vec<usize>>,
    pub scores: Vec<f32>,
    pub alignments: Option<Vec<AttentionMatrix>>,
}

/// Length-normalized candidates in ranked order, at most `nbest` of them.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedResult {
    pub sample_index: usize,
    pub hypotheses: Vec<Vec<usize>>,
    pub scores: Vec<f32>,
    pub best_alignment: Option<AttentionMatrix>,
}

impl RankedResult {
    pub fn best(&self) -> Option<(&[usize], f32)> {
        let hyp = self.hypotheses.first()?;
        let score = self.scores.first().copied()?;
        Some((hyp.as_slice(), score))
    }

    pub fn len(&self) -> usize {
        self.hypotheses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hypotheses.is_empty()
    }
}
