use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use indicatif::ProgressBar;

use crate::config::DecodeConfig;
use crate::data::{SampleSource, TextCorpus};
use crate::decode::grouping::reduce_pairs;
use crate::decode::traits::ReplicaFactory;
use crate::error::{ReassemblyError, TranslateError};
use crate::metrics::{MetricsPipeline, ScoreSummary, ScorerRegistry};
use crate::orchestrator::pool::WorkerPool;
use crate::orchestrator::reassembler::{Reassembler, Throughput};
use crate::orchestrator::worker::WorkerSettings;
use crate::output::{
    FilterChain, OutputFormatter, VisualizationExport, VisualizationMeta, VisualizedHypothesis,
};
use crate::types::{RankedResult, Sample};

/// Decoded results of one run, in sample index order.
#[derive(Debug, Clone)]
pub struct TranslationRun {
    pub results: Vec<RankedResult>,
    /// Sample indices forming the single-best output, in output order.
    pub selected: Vec<usize>,
    pub n_jobs: usize,
    pub throughput: Throughput,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub run: TranslationRun,
    pub output_path: PathBuf,
    pub lines_written: usize,
    pub visualization_path: Option<PathBuf>,
    pub scores: Option<ScoreSummary>,
}

pub struct Translator {
    config: DecodeConfig,
    factory: Arc<dyn ReplicaFactory>,
    filters: FilterChain,
    scorers: ScorerRegistry,
    progress: ProgressBar,
    interrupt: Arc<AtomicBool>,
    available_cpus: usize,
}

pub(crate) struct TranslatorParts {
    pub config: DecodeConfig,
    pub factory: Arc<dyn ReplicaFactory>,
    pub filters: FilterChain,
    pub scorers: ScorerRegistry,
    pub progress: ProgressBar,
    pub interrupt: Arc<AtomicBool>,
    pub available_cpus: usize,
}

impl Translator {
    pub(crate) fn from_parts(parts: TranslatorParts) -> Self {
        Self {
            config: parts.config,
            factory: parts.factory,
            filters: parts.filters,
            scorers: parts.scorers,
            progress: parts.progress,
            interrupt: parts.interrupt,
            available_cpus: parts.available_cpus,
        }
    }

    pub fn config(&self) -> &DecodeConfig {
        &self.config
    }

    pub fn factory(&self) -> &dyn ReplicaFactory {
        self.factory.as_ref()
    }

    pub fn n_jobs(&self) -> usize {
        self.config.jobs.resolve(self.available_cpus)
    }

    /// Dispatches every sample of `source` to the worker pool and waits for
    /// all results.
    pub fn decode(&self, source: &mut dyn SampleSource) -> Result<TranslationRun, TranslateError> {
        let started = Instant::now();
        let n_jobs = self.n_jobs();
        let total = source.len();
        tracing::info!(
            samples = total,
            n_jobs,
            mode = self.config.mode.as_str(),
            beam_size = self.config.beam_size,
            nbest = self.config.nbest,
            "starting translation"
        );

        let results = if total == 0 {
            Vec::new()
        } else {
            self.decode_with_pool(source, total, n_jobs).map_err(|err| {
                self.progress.finish_and_clear();
                err
            })?
        };

        let selected: Vec<usize> = if self.config.reduces_pairs() {
            reduce_pairs(&results, self.config.pair_group_size)
        } else {
            (0..results.len()).collect()
        };

        let words = (self.config.nbest == 1).then(|| {
            selected
                .iter()
                .filter_map(|&idx| results.get(idx).and_then(RankedResult::best))
                .map(|(ids, _)| self.factory.vocabulary().decode(ids).len())
                .sum::<usize>()
        });
        let throughput = Throughput::new(results.len(), started.elapsed(), words);
        tracing::info!(
            samples = throughput.samples,
            secs = throughput.elapsed_secs,
            samples_per_sec = throughput.samples_per_sec,
            words_per_sec = ?throughput.words_per_sec,
            "translation finished"
        );

        Ok(TranslationRun {
            results,
            selected,
            n_jobs,
            throughput,
        })
    }

    fn decode_with_pool(
        &self,
        source: &mut dyn SampleSource,
        total: usize,
        n_jobs: usize,
    ) -> Result<Vec<RankedResult>, TranslateError> {
        let settings = WorkerSettings {
            mode: self.config.mode,
            beam_size: self.config.beam_size,
            nbest: self.config.nbest,
            seed: self.config.seed,
        };
        let (result_tx, result_rx) = crossbeam_channel::unbounded();
        let mut pool = WorkerPool::spawn(
            n_jobs,
            settings,
            Arc::clone(&self.factory),
            self.config.task_queue_capacity,
            result_tx,
            self.config.shutdown_grace,
        )?;

        source.rewind();
        let mut dispatched = 0usize;
        while let Some(sample) = source.next_sample() {
            if self.interrupt.load(Ordering::SeqCst) {
                return Err(TranslateError::Interrupted);
            }
            pool.dispatch(sample.to_task(), &self.interrupt)?;
            dispatched += 1;
        }
        if dispatched != total {
            return Err(ReassemblyError::Incomplete {
                missing: total.saturating_sub(dispatched),
            }
            .into());
        }
        tracing::debug!(dispatched, "all tasks queued");
        pool.send_stop(&self.interrupt)?;

        let mut reassembler = Reassembler::new(total, self.progress.clone());
        reassembler.collect(&result_rx, &mut pool, &self.interrupt)?;
        let results = reassembler.finish()?;
        pool.shutdown();
        Ok(results)
    }

    /// Decodes the corpus, writes the hypothesis file and runs the optional
    /// visualization export and metrics.
    pub fn run(&self, corpus: &mut TextCorpus) -> Result<RunReport, TranslateError> {
        let run = self.decode(corpus)?;

        let formatter = OutputFormatter::new(self.factory.vocabulary(), &self.filters);
        let lines_written = formatter.write_file(
            &self.config.output_path,
            self.config.output_layout(),
            &run.results,
            &run.selected,
        )?;

        let visualization_path = if self.config.export_visualization {
            let path = self.config.visualization_path();
            self.visualization(corpus, &run).write(&path)?;
            Some(path)
        } else {
            None
        };

        let scores = if self.config.runs_metrics(!corpus.reference_paths().is_empty()) {
            let summary = MetricsPipeline::new(&self.scorers).run(
                &self.config.metrics,
                corpus.reference_paths(),
                &self.config.output_path,
            );
            if !summary.is_empty() {
                summary.write(&self.config.score_summary_path())?;
            }
            Some(summary)
        } else {
            None
        };

        Ok(RunReport {
            run,
            output_path: self.config.output_path.clone(),
            lines_written,
            visualization_path,
            scores,
        })
    }

    /// Attention export for the selected outputs. Sources and references are
    /// re-read from `source` after rewinding it.
    pub fn visualization(
        &self,
        source: &mut dyn SampleSource,
        run: &TranslationRun,
    ) -> VisualizationExport {
        source.rewind();
        let samples: Vec<Sample> = std::iter::from_fn(|| source.next_sample()).collect();

        let vocabulary = self.factory.vocabulary();
        let mut sources = Vec::with_capacity(run.selected.len());
        let mut references = Vec::with_capacity(run.selected.len());
        let mut hypotheses = Vec::with_capacity(run.selected.len());
        for &idx in &run.selected {
            if let Some(sample) = samples.get(idx) {
                sources.push(sample.payload.source.clone());
                references.push(sample.references.clone());
            }
            let result = run.results.get(idx);
            hypotheses.push(VisualizedHypothesis {
                tokens: result
                    .and_then(RankedResult::best)
                    .map(|(ids, _)| {
                        vocabulary
                            .decode(ids)
                            .into_iter()
                            .map(str::to_string)
                            .collect::<Vec<_>>()
                    })
                    .unwrap_or_default(),
                attention: result.and_then(|r| r.best_alignment.clone()),
            });
        }

        let meta = VisualizationMeta {
            generated_at: chrono::Utc::now().to_rfc3339(),
            models: self.factory.model_names(),
            mode: self.config.mode.as_str().to_string(),
            beam_size: self.config.beam_size,
            sample_count: run.results.len(),
        };
        VisualizationExport::build(meta, &sources, hypotheses, &references)
    }
}
