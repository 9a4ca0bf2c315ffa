//! Error types for keyword processing.

/// Errors from keyword expansion or contraction.
///
/// The transforms themselves cannot fail on any input; only the sink they
/// write into can.
#[derive(Debug, thiserror::Error)]
pub enum KeywordError {
    #[error("I/O error writing keyword output: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for keyword operations.
pub type KeywordResult<T> = Result<T, KeywordError>;
