use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use nmt_translate::{
    DecodeConfig, DecodeMode, FilterKind, JobCount, LexiconFactory, ReplicaFactory, TextCorpus,
    TranslatorBuilder, ValidationMode,
};

#[path = "nmt_translate/interrupt.rs"]
mod interrupt;
#[path = "nmt_translate/logging.rs"]
mod logging;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ModeChoice {
    #[value(name = "beamsearch")]
    BeamSearch,
    Argmax,
    Sample,
    Forced,
}

impl From<ModeChoice> for DecodeMode {
    fn from(choice: ModeChoice) -> Self {
        match choice {
            ModeChoice::BeamSearch => Self::BeamSearch,
            ModeChoice::Argmax => Self::Argmax,
            ModeChoice::Sample => Self::Sample,
            ModeChoice::Forced => Self::Forced,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ValidModeChoice {
    All,
    Pairs,
    Single,
}

impl From<ValidModeChoice> for ValidationMode {
    fn from(choice: ValidModeChoice) -> Self {
        match choice {
            ValidModeChoice::All => Self::All,
            ValidModeChoice::Pairs => Self::Pairs,
            ValidModeChoice::Single => Self::Single,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "nmt-translate")]
#[command(about = "Translate a corpus with a pool of parallel decode workers")]
struct Args {
    /// Model files, several form an ensemble.
    #[arg(required = true, num_args = 1..)]
    models: Vec<PathBuf>,
    /// Worker count, or `auto` for half the CPUs minus one.
    #[arg(short = 'j', long, env = "NMT_TRANSLATE_JOBS", default_value = "auto")]
    jobs: JobCount,
    #[arg(
        short = 'b',
        long,
        env = "NMT_TRANSLATE_BEAM_SIZE",
        default_value_t = DecodeConfig::DEFAULT_BEAM_SIZE
    )]
    beam_size: usize,
    #[arg(short = 'N', long, env = "NMT_TRANSLATE_NBEST", default_value_t = 1)]
    nbest: usize,
    #[arg(
        short = 'r',
        long,
        env = "NMT_TRANSLATE_SEED",
        default_value_t = DecodeConfig::DEFAULT_SEED
    )]
    seed: u64,
    #[arg(
        short = 'm',
        long,
        env = "NMT_TRANSLATE_MODE",
        value_enum,
        default_value_t = ModeChoice::BeamSearch
    )]
    mode: ModeChoice,
    #[arg(
        short = 'v',
        long,
        env = "NMT_TRANSLATE_VALID_MODE",
        value_enum,
        default_value_t = ValidModeChoice::All
    )]
    valid_mode: ValidModeChoice,
    #[arg(
        long,
        env = "NMT_TRANSLATE_PAIR_GROUP_SIZE",
        default_value_t = DecodeConfig::DEFAULT_PAIR_GROUP_SIZE
    )]
    pair_group_size: usize,
    #[arg(short = 'M', long, env = "NMT_TRANSLATE_METRICS", value_delimiter = ',')]
    metrics: Vec<String>,
    #[arg(short = 'o', long, env = "NMT_TRANSLATE_OUTPUT", default_value = "hyps.txt")]
    output: PathBuf,
    /// Write `index ||| hypothesis ||| score` lines instead of plain text.
    #[arg(short = 'D', long, env = "NMT_TRANSLATE_DUMP_SCORES", default_value_t = false)]
    dump_scores: bool,
    /// Write attention and sentences to `<output>.vis.json`.
    #[arg(short = 'e', long, env = "NMT_TRANSLATE_EXPORT_VIS", default_value_t = false)]
    export_vis: bool,
    #[arg(short = 'S', long, env = "NMT_TRANSLATE_SRC_FILE")]
    src_file: Option<PathBuf>,
    #[arg(short = 'R', long = "ref-files", num_args = 1..)]
    ref_files: Vec<PathBuf>,
    #[arg(long, env = "NMT_TRANSLATE_FEATURES_FILE")]
    features_file: Option<PathBuf>,
    #[arg(short = 'f', long, env = "NMT_TRANSLATE_FILTERS", value_delimiter = ',')]
    filters: Vec<FilterKind>,
    /// Bound on queued tasks, unbounded when absent.
    #[arg(long, env = "NMT_TRANSLATE_QUEUE_CAPACITY")]
    queue_capacity: Option<usize>,
    #[arg(long, env = "NMT_TRANSLATE_SHUTDOWN_GRACE_MS", default_value_t = 500)]
    shutdown_grace_ms: u64,
    #[arg(long, env = "NMT_TRANSLATE_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

impl Args {
    fn to_config(&self) -> DecodeConfig {
        DecodeConfig {
            jobs: self.jobs,
            beam_size: self.beam_size,
            nbest: self.nbest,
            seed: self.seed,
            mode: self.mode.into(),
            validation_mode: self.valid_mode.into(),
            pair_group_size: self.pair_group_size,
            metrics: self
                .metrics
                .iter()
                .map(|m| m.trim().to_string())
                .filter(|m| !m.is_empty())
                .collect(),
            output_path: self.output.clone(),
            dump_scores: self.dump_scores,
            export_visualization: self.export_vis,
            src_file: self.src_file.clone(),
            ref_files: self.ref_files.clone(),
            model_files: self.models.clone(),
            filters: self.filters.clone(),
            task_queue_capacity: self.queue_capacity,
            shutdown_grace: Duration::from_millis(self.shutdown_grace_ms),
        }
    }
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let args = Args::parse();
    logging::init_logging(&args.log_level)?;

    let config = args.to_config();
    config.validate().map_err(|err| err.to_string())?;

    let factory = Arc::new(LexiconFactory::load(&config.model_files).map_err(|e| e.to_string())?);
    let mut corpus = load_corpus(&config, &factory, args.features_file.as_deref())?;

    let interrupt = interrupt::install_ctrl_c_flag()?;
    let translator = TranslatorBuilder::new(config)
        .with_factory(factory as Arc<dyn ReplicaFactory>)
        .with_progress_bar(progress_bar())
        .with_interrupt_flag(interrupt)
        .build()
        .map_err(|err| err.to_string())?;

    let report = translator.run(&mut corpus).map_err(|err| err.to_string())?;

    let throughput = &report.run.throughput;
    match throughput.words_per_sec {
        Some(words_per_sec) => eprintln!(
            "translated {} samples with {} workers in {:.2}s ({:.2} samples/s, {:.2} words/s)",
            throughput.samples,
            report.run.n_jobs,
            throughput.elapsed_secs,
            throughput.samples_per_sec,
            words_per_sec
        ),
        None => eprintln!(
            "translated {} samples with {} workers in {:.2}s ({:.2} samples/s)",
            throughput.samples, report.run.n_jobs, throughput.elapsed_secs, throughput.samples_per_sec
        ),
    }

    println!("{}", report.output_path.display());
    if let Some(path) = &report.visualization_path {
        println!("{}", path.display());
    }
    if let Some(scores) = &report.scores {
        for rendering in scores.renderings.values() {
            println!("{rendering}");
        }
    }
    Ok(())
}

/// Explicit `--src-file`/`--ref-files` win over the defaults stored in the
/// first model description.
fn load_corpus(
    config: &DecodeConfig,
    factory: &LexiconFactory,
    features_file: Option<&std::path::Path>,
) -> Result<TextCorpus, String> {
    let source = config
        .src_file
        .as_deref()
        .or_else(|| factory.default_source())
        .ok_or_else(|| nmt_translate::ConfigError::MissingSource.to_string())?;
    let references: &[PathBuf] = if config.ref_files.is_empty() {
        factory.default_references()
    } else {
        &config.ref_files
    };

    let mut corpus = TextCorpus::load(source, references).map_err(|err| err.to_string())?;
    if let Some(path) = features_file {
        corpus = corpus
            .with_features_file(path)
            .map_err(|err| err.to_string())?;
    }
    if config.mode == DecodeMode::Forced {
        corpus = corpus.with_forced_targets();
    }
    corpus
        .with_validation_mode(config.validation_mode, config.pair_group_size)
        .map_err(|err| err.to_string())
}

fn progress_bar() -> ProgressBar {
    let progress = ProgressBar::new(0);
    progress.set_style(
        ProgressStyle::with_template(
            "[{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({eta}) {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-"),
    );
    progress.set_message("decoding");
    progress
}
