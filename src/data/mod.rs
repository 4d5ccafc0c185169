pub mod corpus;
pub mod vocab;

pub use corpus::{SampleSource, TextCorpus};
pub use vocab::Vocabulary;
