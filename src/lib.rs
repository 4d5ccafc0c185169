pub mod config;
pub mod data;
pub mod decode;
pub mod error;
pub mod metrics;
pub mod orchestrator;
pub mod output;
pub mod types;

pub use config::{DecodeConfig, DecodeMode, JobCount, OutputLayout, ValidationMode};
pub use data::{SampleSource, TextCorpus, Vocabulary};
pub use decode::{LexiconFactory, ReplicaFactory, SequenceDecoder};
pub use error::{ConfigError, ReassemblyError, TranslateError};
pub use metrics::{MetricScore, Scorer, ScorerRegistry, ScoreSummary};
pub use orchestrator::{RunReport, Throughput, TranslationRun, Translator, TranslatorBuilder};
pub use output::{FilterChain, FilterKind};
pub use types::{DecodeOutput, Payload, RankedResult, Sample, WorkerId};
