use std::path::{Path, PathBuf};

use crate::config::ValidationMode;
use crate::error::{ConfigError, TranslateError};
use crate::types::{Payload, Sample};

/// Restartable, index-ordered stream of samples.
pub trait SampleSource {
    fn len(&self) -> usize;

    fn next_sample(&mut self) -> Option<Sample>;

    fn rewind(&mut self);

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Line-aligned source, reference and feature files held in memory.
#[derive(Debug, Clone)]
pub struct TextCorpus {
    sources: Vec<Vec<String>>,
    references: Vec<Vec<String>>,
    reference_paths: Vec<PathBuf>,
    features: Option<Vec<Vec<f32>>>,
    /// Number of consecutive samples sharing one reference line.
    reference_stride: usize,
    forced_targets: bool,
    cursor: usize,
}

impl TextCorpus {
    pub fn load(source_path: &Path, reference_paths: &[PathBuf]) -> Result<Self, TranslateError> {
        let sources = read_lines(source_path, "read source file")?;
        let mut references = Vec::with_capacity(reference_paths.len());
        for path in reference_paths {
            references.push(read_lines(path, "read reference file")?);
        }

        let mut corpus = Self::from_lines(sources, references);
        corpus.reference_paths = reference_paths.to_vec();
        corpus.check_reference_files()?;
        Ok(corpus)
    }

    pub fn from_lines(sources: Vec<String>, references: Vec<Vec<String>>) -> Self {
        Self {
            sources: sources.iter().map(|line| tokenize(line)).collect(),
            references,
            reference_paths: Vec::new(),
            features: None,
            reference_stride: 1,
            forced_targets: false,
            cursor: 0,
        }
    }

    pub fn with_features_file(mut self, path: &Path) -> Result<Self, TranslateError> {
        let mut features = Vec::new();
        for (line_no, line) in read_lines(path, "read feature file")?.iter().enumerate() {
            let row = line
                .split_whitespace()
                .map(str::parse::<f32>)
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| {
                    TranslateError::decode(
                        "parse feature file",
                        format!("{}:{}: {e}", path.display(), line_no + 1),
                    )
                })?;
            features.push(row);
        }
        if features.len() != self.sources.len() {
            return Err(TranslateError::decode(
                "load feature file",
                format!(
                    "{} feature rows for {} source sentences",
                    features.len(),
                    self.sources.len()
                ),
            ));
        }
        self.features = Some(features);
        Ok(self)
    }

    /// Attaches the first reference of each sample as the target to score.
    pub fn with_forced_targets(mut self) -> Self {
        self.forced_targets = true;
        self
    }

    /// Checks the sample/reference relationship the validation mode expects.
    pub fn with_validation_mode(
        mut self,
        mode: ValidationMode,
        group_size: usize,
    ) -> Result<Self, ConfigError> {
        if mode == ValidationMode::Single {
            self.references.truncate(1);
            self.reference_paths.truncate(1);
        }
        let Some(reference_lines) = self.references.first().map(Vec::len) else {
            return Ok(self);
        };

        let stride = match mode {
            ValidationMode::Pairs => group_size.max(1),
            ValidationMode::All | ValidationMode::Single => 1,
        };
        if self.sources.len() != reference_lines * stride {
            return Err(ConfigError::SampleReferenceMismatch {
                samples: self.sources.len(),
                references: reference_lines,
                group_size: stride,
            });
        }
        self.reference_stride = stride;
        Ok(self)
    }

    pub fn has_references(&self) -> bool {
        !self.references.is_empty()
    }

    pub fn reference_paths(&self) -> &[PathBuf] {
        &self.reference_paths
    }

    /// Reference lines of one file, in file order.
    pub fn reference_lines(&self, file: usize) -> Option<&[String]> {
        self.references.get(file).map(Vec::as_slice)
    }

    pub fn reference_line_count(&self) -> usize {
        self.references.first().map(Vec::len).unwrap_or(0)
    }

    /// All reference sentences that belong to one reference line index.
    pub fn references_at(&self, line: usize) -> Vec<String> {
        self.references
            .iter()
            .filter_map(|lines| lines.get(line).cloned())
            .collect()
    }

    pub fn reference_stride(&self) -> usize {
        self.reference_stride
    }

    fn check_reference_files(&self) -> Result<(), ConfigError> {
        let Some(expected) = self.references.first().map(Vec::len) else {
            return Ok(());
        };
        for (idx, lines) in self.references.iter().enumerate().skip(1) {
            if lines.len() != expected {
                let path = self
                    .reference_paths
                    .get(idx)
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| format!("#{idx}"));
                return Err(ConfigError::ReferenceCountMismatch {
                    path,
                    expected,
                    found: lines.len(),
                });
            }
        }
        Ok(())
    }

    fn sample_at(&self, index: usize) -> Option<Sample> {
        let source = self.sources.get(index)?.clone();
        let line = index / self.reference_stride;
        let references = self.references_at(line);
        let target = if self.forced_targets {
            references.first().map(|r| tokenize(r))
        } else {
            None
        };
        let features = self
            .features
            .as_ref()
            .and_then(|rows| rows.get(index).cloned());

        Some(Sample {
            index,
            payload: Payload {
                source,
                features,
                target,
            },
            references,
        })
    }
}

impl SampleSource for TextCorpus {
    fn len(&self) -> usize {
        self.sources.len()
    }

    fn next_sample(&mut self) -> Option<Sample> {
        let sample = self.sample_at(self.cursor)?;
        self.cursor += 1;
        Some(sample)
    }

    fn rewind(&mut self) {
        self.cursor = 0;
    }
}

pub fn tokenize(line: &str) -> Vec<String> {
    line.split_whitespace().map(str::to_string).collect()
}

pub(crate) fn read_lines(path: &Path, context: &'static str) -> Result<Vec<String>, TranslateError> {
    let data = std::fs::read_to_string(path).map_err(|e| TranslateError::io(context, e))?;
    Ok(data.lines().map(|l| l.trim_end().to_string()).collect())
}
