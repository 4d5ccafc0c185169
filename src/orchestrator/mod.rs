pub mod builder;
pub mod pool;
pub mod reassembler;
pub mod runtime;
pub mod worker;
#[cfg(test)]
mod tests;

pub use builder::TranslatorBuilder;
pub use pool::WorkerPool;
pub use reassembler::{Reassembler, Throughput};
pub use runtime::{RunReport, TranslationRun, Translator};
pub use worker::{decode_with_mode, WorkerSettings, WorkerState};
