pub mod grouping;
pub mod lexicon;
pub mod ranking;
pub mod traits;

pub use grouping::reduce_pairs;
pub use lexicon::{LexiconDecoder, LexiconFactory};
pub use ranking::rank_candidates;
pub use traits::{ReplicaFactory, SequenceDecoder};
