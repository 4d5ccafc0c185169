use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use indicatif::ProgressBar;

use crate::config::DecodeConfig;
use crate::decode::lexicon::LexiconFactory;
use crate::decode::traits::ReplicaFactory;
use crate::error::TranslateError;
use crate::metrics::ScorerRegistry;
use crate::orchestrator::runtime::{Translator, TranslatorParts};
use crate::output::FilterChain;

pub struct TranslatorBuilder {
    config: DecodeConfig,
    factory: Option<Arc<dyn ReplicaFactory>>,
    filters: Option<FilterChain>,
    scorers: Option<ScorerRegistry>,
    progress: Option<ProgressBar>,
    interrupt: Option<Arc<AtomicBool>>,
    available_cpus: Option<usize>,
}

impl TranslatorBuilder {
    pub fn new(config: DecodeConfig) -> Self {
        Self {
            config,
            factory: None,
            filters: None,
            scorers: None,
            progress: None,
            interrupt: None,
            available_cpus: None,
        }
    }

    /// Replaces the lexicon models named in the config.
    pub fn with_factory(mut self, factory: Arc<dyn ReplicaFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    pub fn with_filters(mut self, filters: FilterChain) -> Self {
        self.filters = Some(filters);
        self
    }

    pub fn with_scorers(mut self, scorers: ScorerRegistry) -> Self {
        self.scorers = Some(scorers);
        self
    }

    pub fn with_progress_bar(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Flag checked while collecting results. Setting it abandons the run.
    pub fn with_interrupt_flag(mut self, interrupt: Arc<AtomicBool>) -> Self {
        self.interrupt = Some(interrupt);
        self
    }

    pub fn with_available_cpus(mut self, cpus: usize) -> Self {
        self.available_cpus = Some(cpus);
        self
    }

    pub fn build(self) -> Result<Translator, TranslateError> {
        let factory = match self.factory {
            Some(factory) => {
                self.config.validate_options()?;
                factory
            }
            None => {
                self.config.validate()?;
                Arc::new(LexiconFactory::load(&self.config.model_files)?) as Arc<dyn ReplicaFactory>
            }
        };
        let filters = self
            .filters
            .unwrap_or_else(|| FilterChain::from_kinds(&self.config.filters));

        Ok(Translator::from_parts(TranslatorParts {
            factory,
            filters,
            scorers: self.scorers.unwrap_or_default(),
            progress: self.progress.unwrap_or_else(ProgressBar::hidden),
            interrupt: self
                .interrupt
                .unwrap_or_else(|| Arc::new(AtomicBool::new(false))),
            available_cpus: self.available_cpus.unwrap_or_else(num_cpus::get),
            config: self.config,
        }))
    }
}
