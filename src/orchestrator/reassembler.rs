use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError};
use indicatif::ProgressBar;
use serde::Serialize;

use crate::error::{ReassemblyError, TranslateError};
use crate::orchestrator::pool::{WorkerPool, POLL_INTERVAL};
use crate::types::RankedResult;

pub const CHECKPOINT_EVERY: usize = 100;

/// Fixed-size output table, one slot per sample index, each filled once.
pub struct Reassembler {
    slots: Vec<Option<RankedResult>>,
    filled: usize,
    started: Instant,
    last_checkpoint: Instant,
    checkpoints: usize,
    progress: ProgressBar,
}

impl Reassembler {
    pub fn new(len: usize, progress: ProgressBar) -> Self {
        let now = Instant::now();
        progress.set_length(len as u64);
        Self {
            slots: (0..len).map(|_| None).collect(),
            filled: 0,
            started: now,
            last_checkpoint: now,
            checkpoints: 0,
            progress,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn filled(&self) -> usize {
        self.filled
    }

    pub fn is_complete(&self) -> bool {
        self.filled == self.slots.len()
    }

    /// Number of checkpoint lines logged so far.
    pub fn checkpoints(&self) -> usize {
        self.checkpoints
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn insert(&mut self, result: RankedResult) -> Result<(), ReassemblyError> {
        let index = result.sample_index;
        let len = self.slots.len();
        let slot = self
            .slots
            .get_mut(index)
            .ok_or(ReassemblyError::OutOfRange { index, len })?;
        if slot.is_some() {
            return Err(ReassemblyError::Duplicate { index });
        }
        *slot = Some(result);
        self.filled += 1;
        self.progress.inc(1);

        if self.filled % CHECKPOINT_EVERY == 0 {
            let now = Instant::now();
            tracing::info!(
                completed = self.filled,
                total = len,
                batch_secs = now.duration_since(self.last_checkpoint).as_secs_f64(),
                "decoding checkpoint"
            );
            self.last_checkpoint = now;
            self.checkpoints += 1;
        }
        Ok(())
    }

    /// Every slot in index order. Fails when any slot is still empty.
    ///
    /// The progress bar is cleared either way.
    pub fn finish(self) -> Result<Vec<RankedResult>, ReassemblyError> {
        self.progress.finish_and_clear();
        let missing = self.slots.len() - self.filled;
        if missing > 0 {
            return Err(ReassemblyError::Incomplete { missing });
        }
        Ok(self.slots.into_iter().flatten().collect())
    }

    /// Fills slots from the result channel until complete.
    ///
    /// Between receives the pool is checked so a dead worker ends the run
    /// instead of leaving it waiting, and the interrupt flag is honoured.
    /// On failure the progress bar is cleared before the error is returned.
    pub fn collect(
        &mut self,
        results: &Receiver<RankedResult>,
        pool: &mut WorkerPool,
        interrupt: &AtomicBool,
    ) -> Result<(), TranslateError> {
        let outcome = self.receive_all(results, pool, interrupt);
        if outcome.is_err() {
            self.progress.finish_and_clear();
        }
        outcome
    }

    fn receive_all(
        &mut self,
        results: &Receiver<RankedResult>,
        pool: &mut WorkerPool,
        interrupt: &AtomicBool,
    ) -> Result<(), TranslateError> {
        while !self.is_complete() {
            if interrupt.load(Ordering::SeqCst) {
                tracing::error!(
                    completed = self.filled,
                    total = self.slots.len(),
                    "interrupted, abandoning run"
                );
                return Err(TranslateError::Interrupted);
            }
            match results.recv_timeout(POLL_INTERVAL) {
                Ok(result) => self.insert(result)?,
                Err(RecvTimeoutError::Timeout) => pool.check_health()?,
                Err(RecvTimeoutError::Disconnected) => {
                    pool.check_health()?;
                    return Err(TranslateError::ChannelClosed("result"));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Throughput {
    pub samples: usize,
    pub elapsed_secs: f64,
    pub samples_per_sec: f64,
    /// Only measured for single-best output.
    pub words_per_sec: Option<f64>,
}

impl Throughput {
    pub fn new(samples: usize, elapsed: Duration, words: Option<usize>) -> Self {
        let secs = elapsed.as_secs_f64();
        let rate = |count: usize| if secs > 0.0 { count as f64 / secs } else { 0.0 };
        Self {
            samples,
            elapsed_secs: secs,
            samples_per_sec: rate(samples),
            words_per_sec: words.map(rate),
        }
    }
}
