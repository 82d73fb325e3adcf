//! Error types and handling
//!
//! This module provides the error types used throughout the annotator.
//! All errors implement the `AnnotatorErrorExt` trait which provides
//! user-friendly hints and indicates whether errors are recoverable.
//!
//! # Failure containment
//!
//! Most of these errors never escape a single (record, strategy) task. The
//! scheduler turns them into failed label results and keeps going; only
//! configuration and I/O failures at startup abort a run.

use thiserror::Error;

/// Trait for annotator error extensions
///
/// This trait provides additional context for errors, including user-friendly
/// hints and recoverability information. All engine errors implement this trait.
pub trait AnnotatorErrorExt {
    /// Returns a user-friendly hint for the error
    ///
    /// The hint is safe to display to end users and does not contain
    /// credentials, record text, or model output.
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors can be retried or worked around. Non-recoverable
    /// errors need a configuration change or manual intervention.
    fn is_recoverable(&self) -> bool;
}

/// Main engine error type
///
/// # Error Categories
///
/// - **Configuration**: Invalid or missing configuration
/// - **Sessions**: Transcript conflicts and storage failures
/// - **Index**: Debug index writes (downgraded to warnings by callers)
/// - **Inference**: Transient and fatal language-model service failures
/// - **Output**: Model responses that do not parse
/// - **Collaborators**: Record sources and result sinks
///
/// # Examples
///
/// ```
/// use sdk::errors::{AnnotatorErrorExt, EngineError};
///
/// let error = EngineError::TransientService("rate limited".to_string());
/// println!("Hint: {}", error.user_hint());
/// assert!(error.is_recoverable());
///
/// let fatal = EngineError::SessionConflict("task/0001_a/single".to_string());
/// assert!(!fatal.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum EngineError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Session store errors
    #[error("Session already exists: {0}")]
    SessionConflict(String),

    #[error("Session store error: {0}")]
    SessionStore(String),

    // Index errors
    #[error("Index write failed: {0}")]
    IndexWrite(String),

    // Model output errors
    #[error("Malformed model output: {0}")]
    MalformedOutput(String),

    // Inference service errors
    #[error("Transient service error: {0}")]
    TransientService(String),

    #[error("Provider error: {0}")]
    Provider(String),

    // Strategy selection
    #[error("Unknown strategy: {0}")]
    UnknownStrategy(String),

    // Collaborator errors
    #[error("Record source error: {0}")]
    RecordSource(String),

    #[error("Result sink error: {0}")]
    ResultSink(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AnnotatorErrorExt for EngineError {
    fn user_hint(&self) -> &str {
        match self {
            Self::Config(_) => "Check your config.toml file for errors",

            Self::SessionConflict(_) => {
                "A transcript already exists for this task. Re-run with --overwrite or pick another task name"
            }
            Self::SessionStore(_) => "Session storage failed. Check the data directory permissions",

            Self::IndexWrite(_) => "Session index could not be updated. Transcripts are unaffected",

            Self::MalformedOutput(_) => "The model answered in an unexpected format",

            Self::TransientService(_) => "The inference service is busy or slow. Try again later",
            Self::Provider(_) => "The inference provider rejected the request. Check your API key and model",

            Self::UnknownStrategy(_) => "Run 'annotator strategies' to see the available strategies",

            Self::RecordSource(_) => "The input file could not be read. Check its format",
            Self::ResultSink(_) => "Results could not be written. Check the output directory",

            Self::Serialization(_) => "Stored data could not be encoded or decoded",

            Self::Io(_) => "File system operation failed",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            // Non-recoverable errors
            Self::Config(_)
            | Self::SessionConflict(_)
            | Self::Provider(_)
            | Self::UnknownStrategy(_) => false,

            // All other errors are potentially recoverable
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverability() {
        assert!(EngineError::TransientService("429".into()).is_recoverable());
        assert!(EngineError::MalformedOutput("x".into()).is_recoverable());
        assert!(EngineError::IndexWrite("disk full".into()).is_recoverable());
        assert!(!EngineError::Provider("401".into()).is_recoverable());
        assert!(!EngineError::SessionConflict("k".into()).is_recoverable());
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: EngineError = io.into();
        assert!(matches!(err, EngineError::Io(_)));
        assert_eq!(err.user_hint(), "File system operation failed");
    }
}
