use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{ConfigError, TranslateError};
use crate::output::filters::FilterKind;

/// The four decoding strategies a replica can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeMode {
    BeamSearch,
    Forced,
    Sample,
    Argmax,
}

impl DecodeMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BeamSearch => "beamsearch",
            Self::Forced => "forced",
            Self::Sample => "sample",
            Self::Argmax => "argmax",
        }
    }

    pub fn yields_single_hypothesis(self) -> bool {
        !matches!(self, Self::BeamSearch)
    }
}

/// How samples relate to the reference set during validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationMode {
    /// Every sample is scored against every reference file.
    All,
    /// Consecutive groups of samples share one target; the best hypothesis per
    /// group is kept.
    Pairs,
    /// Only the first reference file is used.
    Single,
}

impl ValidationMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Pairs => "pairs",
            Self::Single => "single",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobCount {
    Auto,
    Fixed(usize),
}

impl JobCount {
    /// `auto` leaves half the machine plus one core to the orchestrator.
    pub fn resolve(self, available_cpus: usize) -> usize {
        match self {
            Self::Auto => (available_cpus / 2).saturating_sub(1).max(1),
            Self::Fixed(n) => n.max(1),
        }
    }
}

impl FromStr for JobCount {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.eq_ignore_ascii_case("auto") {
            return Ok(Self::Auto);
        }
        match trimmed.parse::<usize>() {
            Ok(n) if n > 0 => Ok(Self::Fixed(n)),
            _ => Err(ConfigError::InvalidJobCount(value.to_string())),
        }
    }
}

/// Layout of the hypothesis file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputLayout {
    Plain,
    Scored,
    Nbest,
}

#[derive(Debug, Clone)]
pub struct DecodeConfig {
    pub jobs: JobCount,
    pub beam_size: usize,
    pub nbest: usize,
    pub seed: u64,
    pub mode: DecodeMode,
    pub validation_mode: ValidationMode,
    pub pair_group_size: usize,
    pub metrics: Vec<String>,
    pub output_path: PathBuf,
    pub dump_scores: bool,
    pub export_visualization: bool,
    pub src_file: Option<PathBuf>,
    pub ref_files: Vec<PathBuf>,
    pub model_files: Vec<PathBuf>,
    pub filters: Vec<FilterKind>,
    /// `None` keeps the task channel unbounded.
    pub task_queue_capacity: Option<usize>,
    pub shutdown_grace: Duration,
}

impl DecodeConfig {
    pub const DEFAULT_BEAM_SIZE: usize = 12;
    pub const DEFAULT_SEED: u64 = 1234;
    pub const DEFAULT_PAIR_GROUP_SIZE: usize = 5;
    pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model_files.is_empty() {
            return Err(ConfigError::NoModels);
        }
        self.validate_options()
    }

    /// Every check except the presence of model files, for callers that
    /// supply their own decode capability.
    pub fn validate_options(&self) -> Result<(), ConfigError> {
        if let JobCount::Fixed(0) = self.jobs {
            return Err(ConfigError::InvalidJobCount("0".to_string()));
        }
        if self.beam_size == 0 {
            return Err(ConfigError::ZeroBeam);
        }
        if self.nbest == 0 {
            return Err(ConfigError::ZeroNbest);
        }
        if self.mode == DecodeMode::Forced {
            if self.src_file.is_none() {
                return Err(ConfigError::ForcedWithoutSource);
            }
            if self.ref_files.is_empty() {
                return Err(ConfigError::ForcedWithoutReferences);
            }
        }
        if self.mode.yields_single_hypothesis() && self.nbest > 1 {
            return Err(ConfigError::NbestNeedsBeamSearch {
                mode: self.mode.as_str(),
                nbest: self.nbest,
            });
        }
        if self.mode == DecodeMode::BeamSearch && self.nbest > self.beam_size {
            return Err(ConfigError::NbestExceedsBeam {
                nbest: self.nbest,
                beam_size: self.beam_size,
            });
        }
        if self.validation_mode == ValidationMode::Pairs && self.pair_group_size == 0 {
            return Err(ConfigError::ZeroGroupSize);
        }
        Ok(())
    }

    pub fn output_layout(&self) -> OutputLayout {
        if self.nbest > 1 {
            OutputLayout::Nbest
        } else if self.mode == DecodeMode::Forced || self.dump_scores {
            OutputLayout::Scored
        } else {
            OutputLayout::Plain
        }
    }

    /// Grouped reduction only applies to single-best pairs validation.
    pub fn reduces_pairs(&self) -> bool {
        self.validation_mode == ValidationMode::Pairs && self.nbest == 1
    }

    pub fn runs_metrics(&self, has_references: bool) -> bool {
        !self.metrics.is_empty()
            && self.nbest == 1
            && self.mode != DecodeMode::Forced
            && has_references
            && !self.dump_scores
    }

    pub fn visualization_path(&self) -> PathBuf {
        with_suffix(&self.output_path, "vis.json")
    }

    pub fn score_summary_path(&self) -> PathBuf {
        with_suffix(&self.output_path, "scores.json")
    }
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            jobs: JobCount::Auto,
            beam_size: Self::DEFAULT_BEAM_SIZE,
            nbest: 1,
            seed: Self::DEFAULT_SEED,
            mode: DecodeMode::BeamSearch,
            validation_mode: ValidationMode::All,
            pair_group_size: Self::DEFAULT_PAIR_GROUP_SIZE,
            metrics: Vec::new(),
            output_path: PathBuf::from("hyps.txt"),
            dump_scores: false,
            export_visualization: false,
            src_file: None,
            ref_files: Vec::new(),
            model_files: Vec::new(),
            filters: Vec::new(),
            task_queue_capacity: None,
            shutdown_grace: Self::DEFAULT_SHUTDOWN_GRACE,
        }
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

/// On-disk description of a lexical translation model.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct LexiconModelConfig {
    #[serde(default)]
    pub name: Option<String>,
    /// Source word to scored target phrases.
    pub lexicon: BTreeMap<String, Vec<(String, f32)>>,
    #[serde(default = "default_unk_prob")]
    pub unk_prob: f32,
    #[serde(default)]
    pub valid_src: Option<PathBuf>,
    #[serde(default)]
    pub valid_refs: Vec<PathBuf>,
}

fn default_unk_prob() -> f32 {
    1e-3
}

impl LexiconModelConfig {
    pub fn load(path: &Path) -> Result<Self, TranslateError> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| TranslateError::io("read model file", e))?;
        serde_json::from_str(&data).map_err(|e| TranslateError::json("parse model file", e))
    }

    pub fn display_name(&self, path: &Path) -> String {
        self.name.clone().unwrap_or_else(|| {
            path.file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn forced_config() -> DecodeConfig {
        DecodeConfig {
            mode: DecodeMode::Forced,
            model_files: vec![PathBuf::from("model.json")],
            ..DecodeConfig::default()
        }
    }

    #[test]
    fn decode_config_default() {
        let config = DecodeConfig::default();
        assert_eq!(config.beam_size, DecodeConfig::DEFAULT_BEAM_SIZE);
        assert_eq!(config.nbest, 1);
        assert_eq!(config.mode, DecodeMode::BeamSearch);
        assert_eq!(config.jobs, JobCount::Auto);
        assert!(config.task_queue_capacity.is_none());
        assert_eq!(config.output_layout(), OutputLayout::Plain);
    }

    #[test]
    fn auto_jobs_leave_headroom() {
        assert_eq!(JobCount::Auto.resolve(16), 7);
        assert_eq!(JobCount::Auto.resolve(4), 1);
        assert_eq!(JobCount::Auto.resolve(2), 1);
        assert_eq!(JobCount::Auto.resolve(1), 1);
        assert_eq!(JobCount::Fixed(3).resolve(64), 3);
    }

    #[test]
    fn job_count_parsing() {
        assert_eq!("auto".parse::<JobCount>(), Ok(JobCount::Auto));
        assert_eq!(" 4 ".parse::<JobCount>(), Ok(JobCount::Fixed(4)));
        assert!(matches!(
            "0".parse::<JobCount>(),
            Err(ConfigError::InvalidJobCount(_))
        ));
        assert!("many".parse::<JobCount>().is_err());
    }

    #[test]
    fn forced_requires_source_and_references() {
        let config = forced_config();
        assert_eq!(config.validate(), Err(ConfigError::ForcedWithoutSource));

        let config = DecodeConfig {
            src_file: Some(PathBuf::from("src.txt")),
            ..forced_config()
        };
        assert_eq!(config.validate(), Err(ConfigError::ForcedWithoutReferences));

        let config = DecodeConfig {
            src_file: Some(PathBuf::from("src.txt")),
            ref_files: vec![PathBuf::from("ref.txt")],
            ..forced_config()
        };
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.output_layout(), OutputLayout::Scored);
    }

    #[test]
    fn nbest_constraints() {
        let base = DecodeConfig {
            model_files: vec![PathBuf::from("model.json")],
            beam_size: 4,
            ..DecodeConfig::default()
        };
        let too_many = DecodeConfig {
            nbest: 5,
            ..base.clone()
        };
        assert_eq!(
            too_many.validate(),
            Err(ConfigError::NbestExceedsBeam {
                nbest: 5,
                beam_size: 4
            })
        );

        let greedy_nbest = DecodeConfig {
            nbest: 2,
            mode: DecodeMode::Argmax,
            ..base.clone()
        };
        assert!(matches!(
            greedy_nbest.validate(),
            Err(ConfigError::NbestNeedsBeamSearch { mode: "argmax", .. })
        ));

        let nbest = DecodeConfig { nbest: 3, ..base };
        assert_eq!(nbest.validate(), Ok(()));
        assert_eq!(nbest.output_layout(), OutputLayout::Nbest);
        assert!(!nbest.runs_metrics(true));
    }

    #[test]
    fn metrics_gating() {
        let config = DecodeConfig {
            metrics: vec!["bleu".to_string()],
            ..DecodeConfig::default()
        };
        assert!(config.runs_metrics(true));
        assert!(!config.runs_metrics(false));

        let dumping = DecodeConfig {
            dump_scores: true,
            ..config.clone()
        };
        assert!(!dumping.runs_metrics(true));
        assert_eq!(dumping.output_layout(), OutputLayout::Scored);
    }

    #[test]
    fn derived_output_paths() {
        let config = DecodeConfig {
            output_path: PathBuf::from("out/test.hyp"),
            ..DecodeConfig::default()
        };
        assert_eq!(
            config.visualization_path(),
            PathBuf::from("out/test.hyp.vis.json")
        );
        assert_eq!(
            config.score_summary_path(),
            PathBuf::from("out/test.hyp.scores.json")
        );
    }

    #[test]
    fn lexicon_model_config_parse() {
        let json = r#"{
            "name": "toy-en-de",
            "lexicon": {
                "a": [["ein", 0.6], ["eine", 0.4]],
                "house": [["haus", 0.9]]
            }
        }"#;
        let model: LexiconModelConfig = serde_json::from_str(json).expect("valid model json");
        assert_eq!(model.lexicon.len(), 2);
        assert!((model.unk_prob - 1e-3).abs() < 1e-9);
        assert!(model.valid_src.is_none());
        assert_eq!(model.display_name(Path::new("/m/other.json")), "toy-en-de");
    }
}
