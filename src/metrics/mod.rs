pub mod bleu;

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::TranslateError;

pub use bleu::{corpus_bleu, BleuScorer, BleuStats};

#[derive(Debug, Clone, PartialEq)]
pub struct MetricScore {
    /// Human-readable line, printed as is.
    pub rendering: String,
    pub value: f64,
}

/// Scores a hypothesis file against one or more line-aligned reference files.
///
/// `Ok(None)` means the metric could not produce a value for this input.
pub trait Scorer: Send + Sync {
    fn score(
        &self,
        references: &[PathBuf],
        hypothesis: &Path,
    ) -> Result<Option<MetricScore>, TranslateError>;
}

/// Metric name to scorer, names compared case-insensitively.
pub struct ScorerRegistry {
    scorers: BTreeMap<String, Box<dyn Scorer>>,
}

impl ScorerRegistry {
    pub fn empty() -> Self {
        Self {
            scorers: BTreeMap::new(),
        }
    }

    pub fn register(&mut self, name: &str, scorer: Box<dyn Scorer>) {
        self.scorers.insert(name.to_ascii_lowercase(), scorer);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Scorer> {
        self.scorers
            .get(&name.to_ascii_lowercase())
            .map(|scorer| scorer.as_ref())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.scorers.keys().map(String::as_str)
    }
}

impl Default for ScorerRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register("bleu", Box::new(BleuScorer::default()));
        registry
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreSummary {
    pub renderings: BTreeMap<String, String>,
    pub values: BTreeMap<String, f64>,
}

impl ScoreSummary {
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn write(&self, path: &Path) -> Result<(), TranslateError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| TranslateError::io("create score directory", e))?;
        }
        let mut file =
            File::create(path).map_err(|e| TranslateError::io("create score summary", e))?;
        serde_json::to_writer_pretty(&mut file, self)
            .map_err(|e| TranslateError::json("serialize score summary", e))?;
        file.write_all(b"\n")
            .map_err(|e| TranslateError::io("finalize score summary", e))?;
        Ok(())
    }
}

/// Runs the requested metrics one after the other.
///
/// A metric that is unknown, fails or yields no value is logged and left out
/// of the summary; the remaining metrics still run.
pub struct MetricsPipeline<'a> {
    registry: &'a ScorerRegistry,
}

impl<'a> MetricsPipeline<'a> {
    pub fn new(registry: &'a ScorerRegistry) -> Self {
        Self { registry }
    }

    pub fn run(&self, metrics: &[String], references: &[PathBuf], hypothesis: &Path) -> ScoreSummary {
        let mut summary = ScoreSummary::default();
        for name in metrics {
            let key = name.to_ascii_lowercase();
            let Some(scorer) = self.registry.get(&key) else {
                tracing::warn!(metric = %name, "unknown metric, skipping");
                continue;
            };
            match scorer.score(references, hypothesis) {
                Ok(Some(score)) => {
                    tracing::info!(metric = %key, value = score.value, "{}", score.rendering);
                    summary.renderings.insert(key.clone(), score.rendering);
                    summary.values.insert(key, score.value);
                }
                Ok(None) => tracing::warn!(metric = %key, "metric produced no score"),
                Err(err) => tracing::warn!(metric = %key, error = %err, "metric failed, skipping"),
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    struct Fixed(Option<f64>, Arc<AtomicUsize>);

    impl Scorer for Fixed {
        fn score(&self, _: &[PathBuf], _: &Path) -> Result<Option<MetricScore>, TranslateError> {
            self.1.fetch_add(1, Ordering::SeqCst);
            Ok(self.0.map(|value| MetricScore {
                rendering: format!("FIXED = {value}"),
                value,
            }))
        }
    }

    struct Failing;

    impl Scorer for Failing {
        fn score(&self, _: &[PathBuf], _: &Path) -> Result<Option<MetricScore>, TranslateError> {
            Err(TranslateError::decode("score", "external tool missing"))
        }
    }

    #[test]
    fn default_registry_knows_bleu() {
        let registry = ScorerRegistry::default();
        assert!(registry.get("BLEU").is_some());
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["bleu"]);
    }

    #[test]
    fn failures_and_unknown_metrics_are_skipped() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = ScorerRegistry::empty();
        registry.register("fixed", Box::new(Fixed(Some(42.0), calls.clone())));
        registry.register("nothing", Box::new(Fixed(None, calls.clone())));
        registry.register("broken", Box::new(Failing));

        let metrics: Vec<String> = ["broken", "Fixed", "nothing", "meteor"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let summary = MetricsPipeline::new(&registry).run(&metrics, &[], Path::new("hyps.txt"));

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(summary.values.len(), 1);
        assert_eq!(summary.values["fixed"], 42.0);
        assert_eq!(summary.renderings["fixed"], "FIXED = 42");
    }

    #[test]
    fn summary_persists_as_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hyps.txt.scores.json");
        let mut summary = ScoreSummary::default();
        summary.values.insert("bleu".to_string(), 31.5);
        summary
            .renderings
            .insert("bleu".to_string(), "BLEU = 31.50".to_string());
        summary.write(&path).unwrap();

        let loaded: ScoreSummary =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded, summary);
    }
}
