use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use indicatif::ProgressBar;
use rand::rngs::StdRng;

use super::builder::TranslatorBuilder;
use crate::config::{DecodeConfig, DecodeMode, JobCount, ValidationMode};
use crate::data::{TextCorpus, Vocabulary};
use crate::decode::traits::{ReplicaFactory, SequenceDecoder};
use crate::error::TranslateError;
use crate::metrics::{MetricScore, Scorer, ScorerRegistry};
use crate::types::{DecodeOutput, Payload, WorkerId};

/// Copies the source words through the vocabulary. Sentences containing
/// `slow` take longer so results finish out of order, `boom` fails.
struct Copying {
    vocabulary: Arc<Vocabulary>,
}

impl Copying {
    fn output(&self, payload: &Payload) -> Result<DecodeOutput, TranslateError> {
        if payload.source.iter().any(|w| w == "boom") {
            return Err(TranslateError::decode("copy", "cannot decode boom"));
        }
        if payload.source.iter().any(|w| w == "slow") {
            std::thread::sleep(Duration::from_millis(40));
        }
        let ids = self.vocabulary.encode(payload.source.as_slice());
        let score = payload.source.len() as f32 * 0.5;
        Ok(DecodeOutput {
            hypotheses: vec![ids.clone(), ids],
            scores: vec![score, score * 2.0],
            alignments: None,
        })
    }
}

impl SequenceDecoder for Copying {
    fn beam_search(&mut self, payload: &Payload, _: usize) -> Result<DecodeOutput, TranslateError> {
        self.output(payload)
    }

    fn force(&mut self, payload: &Payload) -> Result<DecodeOutput, TranslateError> {
        self.output(payload)
    }

    fn sample(&mut self, payload: &Payload, _: &mut StdRng) -> Result<DecodeOutput, TranslateError> {
        self.output(payload)
    }

    fn argmax(&mut self, payload: &Payload) -> Result<DecodeOutput, TranslateError> {
        self.output(payload)
    }
}

struct CopyingFactory {
    vocabulary: Arc<Vocabulary>,
}

impl CopyingFactory {
    fn shared() -> Arc<dyn ReplicaFactory> {
        Arc::new(Self {
            vocabulary: Arc::new(Vocabulary::from_words([
                "a", "b", "c", "d", "e", "slow", "boom",
            ])),
        })
    }
}

impl ReplicaFactory for CopyingFactory {
    fn load_replica(&self, _: WorkerId) -> Result<Box<dyn SequenceDecoder>, TranslateError> {
        Ok(Box::new(Copying {
            vocabulary: Arc::clone(&self.vocabulary),
        }))
    }

    fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    fn model_names(&self) -> Vec<String> {
        vec!["copy".to_string()]
    }
}

struct Counting(Arc<AtomicUsize>);

impl Scorer for Counting {
    fn score(
        &self,
        references: &[PathBuf],
        hypothesis: &Path,
    ) -> Result<Option<MetricScore>, TranslateError> {
        self.0.fetch_add(1, Ordering::SeqCst);
        assert_eq!(references.len(), 1);
        assert!(hypothesis.exists());
        Ok(Some(MetricScore {
            rendering: "COUNT = 1".to_string(),
            value: 1.0,
        }))
    }
}

fn lines(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn config(jobs: usize) -> DecodeConfig {
    DecodeConfig {
        jobs: JobCount::Fixed(jobs),
        beam_size: 2,
        shutdown_grace: Duration::from_millis(200),
        ..DecodeConfig::default()
    }
}

#[test]
fn results_come_back_in_input_order() {
    let mut corpus = TextCorpus::from_lines(
        lines(&["slow a", "b", "slow c slow", "d", "e a", "a b c"]),
        Vec::new(),
    );
    let translator = TranslatorBuilder::new(config(3))
        .with_factory(CopyingFactory::shared())
        .build()
        .unwrap();

    let run = translator.decode(&mut corpus).unwrap();
    assert_eq!(run.n_jobs, 3);
    let indices: Vec<usize> = run.results.iter().map(|r| r.sample_index).collect();
    assert_eq!(indices, (0..6).collect::<Vec<_>>());
    assert_eq!(run.selected, (0..6).collect::<Vec<_>>());

    let vocab = translator.factory().vocabulary();
    let slow = run.results[2].best().unwrap().0;
    assert_eq!(vocab.decode_sentence(slow), "slow c slow");
    assert_eq!(run.throughput.samples, 6);
    assert!(run.throughput.words_per_sec.is_some());
}

#[test]
fn bounded_queue_with_single_worker() {
    let mut corpus = TextCorpus::from_lines(lines(&["a", "b", "c", "d", "e"]), Vec::new());
    let mut cfg = config(1);
    cfg.task_queue_capacity = Some(1);
    let translator = TranslatorBuilder::new(cfg)
        .with_factory(CopyingFactory::shared())
        .build()
        .unwrap();

    let run = translator.decode(&mut corpus).unwrap();
    assert_eq!(run.results.len(), 5);
}

#[test]
fn failing_worker_aborts_the_run() {
    let mut corpus = TextCorpus::from_lines(lines(&["a", "boom", "c"]), Vec::new());
    let progress = ProgressBar::hidden();
    let translator = TranslatorBuilder::new(config(2))
        .with_factory(CopyingFactory::shared())
        .with_progress_bar(progress.clone())
        .build()
        .unwrap();

    match translator.decode(&mut corpus) {
        Err(TranslateError::WorkerFailed { message, .. }) => {
            assert!(message.contains("cannot decode boom"));
        }
        other => panic!("expected worker failure, got {other:?}"),
    }
    assert!(progress.is_finished());
}

#[test]
fn interrupt_flag_abandons_the_run() {
    let mut corpus = TextCorpus::from_lines(lines(&["a", "b"]), Vec::new());
    let progress = ProgressBar::hidden();
    let translator = TranslatorBuilder::new(config(1))
        .with_factory(CopyingFactory::shared())
        .with_interrupt_flag(Arc::new(AtomicBool::new(true)))
        .with_progress_bar(progress.clone())
        .build()
        .unwrap();

    assert!(matches!(
        translator.decode(&mut corpus),
        Err(TranslateError::Interrupted)
    ));
    assert!(progress.is_finished());
}

#[test]
fn empty_source_spawns_nothing() {
    let mut corpus = TextCorpus::from_lines(Vec::new(), Vec::new());
    let translator = TranslatorBuilder::new(config(2))
        .with_factory(CopyingFactory::shared())
        .build()
        .unwrap();

    let run = translator.decode(&mut corpus).unwrap();
    assert!(run.results.is_empty());
    assert!(run.selected.is_empty());
}

#[test]
fn pairs_mode_keeps_one_output_per_group() {
    // group best scores per length: 0.5 each, so the first candidate of each
    // group without <unk> wins
    let mut corpus = TextCorpus::from_lines(
        lines(&["zzz", "a", "b", "c"]),
        vec![lines(&["ref one", "ref two"])],
    )
    .with_validation_mode(ValidationMode::Pairs, 2)
    .unwrap();
    let mut cfg = config(2);
    cfg.validation_mode = ValidationMode::Pairs;
    cfg.pair_group_size = 2;
    let translator = TranslatorBuilder::new(cfg)
        .with_factory(CopyingFactory::shared())
        .build()
        .unwrap();

    let run = translator.decode(&mut corpus).unwrap();
    assert_eq!(run.results.len(), 4);
    assert_eq!(run.selected, vec![1, 2]);
}

#[test]
fn run_writes_hypotheses_and_scores_once() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("valid.src");
    let reference = dir.path().join("valid.ref");
    std::fs::write(&src, "a b\nc\nd e\nslow a\nb\n").unwrap();
    std::fs::write(&reference, "a b\nc\nd e\nslow a\nb\n").unwrap();

    let mut corpus = TextCorpus::load(&src, &[reference.clone()]).unwrap();
    let mut cfg = config(2);
    cfg.output_path = dir.path().join("hyps.txt");
    cfg.metrics = vec!["count".to_string()];
    cfg.export_visualization = true;

    let calls = Arc::new(AtomicUsize::new(0));
    let mut scorers = ScorerRegistry::empty();
    scorers.register("count", Box::new(Counting(calls.clone())));
    let translator = TranslatorBuilder::new(cfg)
        .with_factory(CopyingFactory::shared())
        .with_scorers(scorers)
        .build()
        .unwrap();

    let report = translator.run(&mut corpus).unwrap();
    assert_eq!(report.lines_written, 5);
    assert_eq!(
        std::fs::read_to_string(&report.output_path).unwrap(),
        "a b\nc\nd e\nslow a\nb\n"
    );
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let scores = report.scores.unwrap();
    assert_eq!(scores.values["count"], 1.0);
    assert!(dir.path().join("hyps.txt.scores.json").exists());

    let vis_path = report.visualization_path.unwrap();
    let vis: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(vis_path).unwrap()).unwrap();
    assert_eq!(vis["samples"].as_array().unwrap().len(), 5);
    assert_eq!(vis["samples"][3]["source"][0], "slow");
    assert_eq!(vis["samples"][3]["references"][0], "slow a");
    assert_eq!(vis["meta"]["models"][0], "copy");
}

#[test]
fn dump_scores_skips_metrics() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("valid.src");
    let reference = dir.path().join("valid.ref");
    std::fs::write(&src, "a\nb\n").unwrap();
    std::fs::write(&reference, "a\nb\n").unwrap();

    let mut corpus = TextCorpus::load(&src, &[reference]).unwrap();
    let mut cfg = config(1);
    cfg.output_path = dir.path().join("hyps.txt");
    cfg.metrics = vec!["count".to_string()];
    cfg.dump_scores = true;

    let calls = Arc::new(AtomicUsize::new(0));
    let mut scorers = ScorerRegistry::empty();
    scorers.register("count", Box::new(Counting(calls.clone())));
    let report = TranslatorBuilder::new(cfg)
        .with_factory(CopyingFactory::shared())
        .with_scorers(scorers)
        .build()
        .unwrap()
        .run(&mut corpus)
        .unwrap();

    assert!(report.scores.is_none());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(
        std::fs::read_to_string(&report.output_path).unwrap(),
        "0 ||| a ||| 0.500000\n1 ||| b ||| 0.500000\n"
    );
}

#[test]
fn nbest_run_lists_every_candidate() {
    let mut corpus = TextCorpus::from_lines(lines(&["a b", "c"]), Vec::new());
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(2);
    cfg.nbest = 2;
    cfg.output_path = dir.path().join("nbest.txt");
    let report = TranslatorBuilder::new(cfg)
        .with_factory(CopyingFactory::shared())
        .build()
        .unwrap()
        .run(&mut corpus)
        .unwrap();

    assert_eq!(report.lines_written, 4);
    assert!(report.run.throughput.words_per_sec.is_none());
    assert_eq!(
        std::fs::read_to_string(&report.output_path).unwrap(),
        "0 ||| a b ||| 0.500000\n0 ||| a b ||| 1.000000\n1 ||| c ||| 0.500000\n1 ||| c ||| 1.000000\n"
    );
}

#[test]
fn builder_rejects_invalid_options() {
    let mut cfg = config(1);
    cfg.mode = DecodeMode::Sample;
    cfg.nbest = 2;
    assert!(matches!(
        TranslatorBuilder::new(cfg)
            .with_factory(CopyingFactory::shared())
            .build(),
        Err(TranslateError::Config(_))
    ));
}
