pub mod filters;
pub mod formatter;
pub mod visualization;

pub use filters::{FilterChain, FilterKind, TextFilter};
pub use formatter::OutputFormatter;
pub use visualization::{
    VisualizationExport, VisualizationMeta, VisualizationRecord, VisualizedHypothesis,
};
