//! Annotator SDK
//!
//! Shared library providing the types, traits, and error taxonomy used by the
//! annotation engine and by the collaborators it talks to (record sources and
//! result sinks).

/// Error types and handling
pub mod errors;

/// Records, strategy identities, and label results
pub mod types;

/// Record source seam
pub mod source;

/// Result sink seam
pub mod sink;

// Re-export commonly used types
pub use errors::{AnnotatorErrorExt, EngineError};
pub use sink::{MemorySink, ResultSink};
pub use source::{RecordSource, VecSource};
pub use types::{
    Binary, ConcurrencyGroup, Failure, FailureKind, LabelFields, LabelResult, LabelStatus, Record,
    SpatialLevel, StrategyKind,
};
