use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::DecodeMode;
use crate::decode::ranking::rank_candidates;
use crate::decode::traits::{ReplicaFactory, SequenceDecoder};
use crate::error::TranslateError;
use crate::types::{DecodeOutput, Payload, RankedResult, Task, WorkerId};

/// What travels on the task channel. `Stop` is the end-of-work sentinel.
#[derive(Debug)]
pub(crate) enum WorkerMessage {
    Decode(Task),
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Starting,
    Ready,
    Decoding,
    Draining,
    Terminated,
}

#[derive(Debug, Clone, Copy)]
pub struct WorkerSettings {
    pub mode: DecodeMode,
    pub beam_size: usize,
    pub nbest: usize,
    pub seed: u64,
}

pub(crate) struct DecodeWorker {
    id: WorkerId,
    settings: WorkerSettings,
    factory: Arc<dyn ReplicaFactory>,
    tasks: Receiver<WorkerMessage>,
    results: Sender<RankedResult>,
    state: WorkerState,
}

impl DecodeWorker {
    pub(crate) fn new(
        id: WorkerId,
        settings: WorkerSettings,
        factory: Arc<dyn ReplicaFactory>,
        tasks: Receiver<WorkerMessage>,
        results: Sender<RankedResult>,
    ) -> Self {
        Self {
            id,
            settings,
            factory,
            tasks,
            results,
            state: WorkerState::Starting,
        }
    }

    /// Loads a replica, then decodes tasks until the stop sentinel arrives or
    /// the task channel closes. Returns the number of samples decoded.
    pub(crate) fn run(mut self) -> Result<usize, TranslateError> {
        tracing::debug!(worker = %self.id, "loading model replica");
        let mut replica = self.factory.load_replica(self.id)?;
        // Distinct per-worker streams, reproducible for a fixed seed and job count.
        let mut rng = StdRng::seed_from_u64(self.settings.seed.wrapping_add(self.id.0 as u64));
        self.transition(WorkerState::Ready);

        let mut decoded = 0usize;
        loop {
            match self.tasks.recv() {
                Ok(WorkerMessage::Decode(task)) => {
                    self.transition(WorkerState::Decoding);
                    let output = decode_with_mode(
                        replica.as_mut(),
                        self.settings.mode,
                        &task.payload,
                        self.settings.beam_size,
                        &mut rng,
                    )
                    .map_err(|err| {
                        tracing::error!(
                            worker = %self.id,
                            sample = task.sample_index,
                            error = %err,
                            "decode failed"
                        );
                        err
                    })?;
                    let ranked = rank_candidates(output.into_raw(task.sample_index), self.settings.nbest);
                    if self.results.send(ranked).is_err() {
                        tracing::debug!(worker = %self.id, "result channel closed, leaving");
                        break;
                    }
                    decoded += 1;
                    self.transition(WorkerState::Ready);
                }
                Ok(WorkerMessage::Stop) => {
                    self.transition(WorkerState::Draining);
                    break;
                }
                Err(_) => {
                    tracing::debug!(worker = %self.id, "task channel closed");
                    break;
                }
            }
        }

        self.transition(WorkerState::Terminated);
        Ok(decoded)
    }

    fn transition(&mut self, next: WorkerState) {
        if next != self.state {
            tracing::trace!(worker = %self.id, from = ?self.state, to = ?next, "worker state");
            self.state = next;
        }
    }
}

/// Calls the replica the way the decode mode requires.
pub fn decode_with_mode(
    replica: &mut dyn SequenceDecoder,
    mode: DecodeMode,
    payload: &Payload,
    beam_size: usize,
    rng: &mut StdRng,
) -> Result<DecodeOutput, TranslateError> {
    match mode {
        DecodeMode::BeamSearch => replica.beam_search(payload, beam_size),
        DecodeMode::Forced => replica.force(payload),
        DecodeMode::Sample => replica.sample(payload, rng),
        DecodeMode::Argmax => replica.argmax(payload),
    }
}
