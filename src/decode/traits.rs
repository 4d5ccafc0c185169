use rand::rngs::StdRng;

use crate::data::Vocabulary;
use crate::error::TranslateError;
use crate::types::{DecodeOutput, Payload, WorkerId};

/// One loaded model replica. Each decode mode has a fixed call shape.
pub trait SequenceDecoder {
    /// Up to `beam_size` candidates with raw negative log-likelihood scores.
    fn beam_search(
        &mut self,
        payload: &Payload,
        beam_size: usize,
    ) -> Result<DecodeOutput, TranslateError>;

    /// Scores `payload.target` under the model and returns it as the only
    /// hypothesis.
    fn force(&mut self, payload: &Payload) -> Result<DecodeOutput, TranslateError>;

    fn sample(
        &mut self,
        payload: &Payload,
        rng: &mut StdRng,
    ) -> Result<DecodeOutput, TranslateError>;

    fn argmax(&mut self, payload: &Payload) -> Result<DecodeOutput, TranslateError>;
}

/// Produces one independent replica per worker. Called on the worker's own
/// thread, once, before the worker reports ready.
pub trait ReplicaFactory: Send + Sync {
    fn load_replica(&self, worker: WorkerId) -> Result<Box<dyn SequenceDecoder>, TranslateError>;

    fn vocabulary(&self) -> &Vocabulary;

    fn model_names(&self) -> Vec<String>;
}
