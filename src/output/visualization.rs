use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use serde::Serialize;

use crate::error::TranslateError;
use crate::types::AttentionMatrix;

#[derive(Debug, Clone, Serialize)]
pub struct VisualizationMeta {
    pub generated_at: String,
    pub models: Vec<String>,
    pub mode: String,
    pub beam_size: usize,
    pub sample_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisualizationRecord {
    pub index: usize,
    pub source: Vec<String>,
    pub hypothesis: Vec<String>,
    pub references: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attention: Option<AttentionMatrix>,
}

/// Hypothesis side of one visualized output line.
#[derive(Debug, Clone, Default)]
pub struct VisualizedHypothesis {
    pub tokens: Vec<String>,
    pub attention: Option<AttentionMatrix>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VisualizationExport {
    pub meta: VisualizationMeta,
    pub samples: Vec<VisualizationRecord>,
}

impl VisualizationExport {
    /// Pairs every output line with its source, references and attention.
    ///
    /// When fewer sources than outputs are given (several references scored
    /// against one source), sources are reused modulo their count.
    pub fn build(
        meta: VisualizationMeta,
        sources: &[Vec<String>],
        hypotheses: Vec<VisualizedHypothesis>,
        references: &[Vec<String>],
    ) -> Self {
        let samples = hypotheses
            .into_iter()
            .enumerate()
            .map(|(index, hyp)| VisualizationRecord {
                index,
                source: if sources.is_empty() {
                    Vec::new()
                } else {
                    sources[index % sources.len()].clone()
                },
                hypothesis: hyp.tokens,
                references: references.get(index).cloned().unwrap_or_default(),
                attention: hyp.attention,
            })
            .collect();
        Self { meta, samples }
    }

    pub fn write(&self, path: &Path) -> Result<(), TranslateError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| TranslateError::io("create visualization directory", e))?;
        }
        let mut file =
            File::create(path).map_err(|e| TranslateError::io("create visualization file", e))?;
        serde_json::to_writer_pretty(&mut file, self)
            .map_err(|e| TranslateError::json("serialize visualization", e))?;
        file.write_all(b"\n")
            .map_err(|e| TranslateError::io("finalize visualization file", e))?;
        tracing::info!(path = %path.display(), samples = self.samples.len(), "visualization exported");
        Ok(())
    }
}
