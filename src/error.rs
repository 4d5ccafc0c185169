use thiserror::Error;

use crate::types::WorkerId;

#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("I/O error while {context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("JSON error while {context}: {source}")]
    Json {
        context: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to spawn decode worker {worker}: {source}")]
    WorkerSpawn {
        worker: WorkerId,
        #[source]
        source: std::io::Error,
    },
    #[error("decode worker {worker} failed: {message}")]
    WorkerFailed { worker: WorkerId, message: String },
    #[error("result reassembly failed: {0}")]
    Integrity(#[from] ReassemblyError),
    #[error("{context}: {message}")]
    Decode {
        context: &'static str,
        message: String,
    },
    #[error("{0} channel closed while the run was still in progress")]
    ChannelClosed(&'static str),
    #[error("run interrupted before all results arrived")]
    Interrupted,
}

impl TranslateError {
    pub(crate) fn io(context: &'static str, source: std::io::Error) -> Self {
        Self::Io { context, source }
    }

    pub(crate) fn json(context: &'static str, source: serde_json::Error) -> Self {
        Self::Json { context, source }
    }

    pub fn decode(context: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Decode {
            context,
            message: err.to_string(),
        }
    }
}

/// Invalid argument combinations, reported before any worker starts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("forced decoding requires an explicit source file")]
    ForcedWithoutSource,
    #[error("forced decoding requires at least one explicit reference file")]
    ForcedWithoutReferences,
    #[error("at least one model file is required")]
    NoModels,
    #[error("nbest must be at least 1")]
    ZeroNbest,
    #[error("beam size must be at least 1")]
    ZeroBeam,
    #[error("nbest ({nbest}) cannot exceed beam size ({beam_size})")]
    NbestExceedsBeam { nbest: usize, beam_size: usize },
    #[error("decode mode '{mode}' yields a single hypothesis, nbest must be 1 (got {nbest})")]
    NbestNeedsBeamSearch { mode: &'static str, nbest: usize },
    #[error("pairs validation mode needs a group size of at least 1")]
    ZeroGroupSize,
    #[error("no source file given and no model provides a default one")]
    MissingSource,
    #[error("reference file '{path}' has {found} lines, expected {expected}")]
    ReferenceCountMismatch {
        path: String,
        expected: usize,
        found: usize,
    },
    #[error("{samples} samples cannot be matched with {references} references (group size {group_size})")]
    SampleReferenceMismatch {
        samples: usize,
        references: usize,
        group_size: usize,
    },
    #[error("unknown output filter '{0}'")]
    UnknownFilter(String),
    #[error("invalid job count '{0}', expected 'auto' or a positive integer")]
    InvalidJobCount(String),
}

/// Protocol violations detected while filling the output slots.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReassemblyError {
    #[error("sample index {index} out of range for {len} slots")]
    OutOfRange { index: usize, len: usize },
    #[error("sample index {index} delivered twice")]
    Duplicate { index: usize },
    #[error("{missing} output slots were never filled")]
    Incomplete { missing: usize },
}
