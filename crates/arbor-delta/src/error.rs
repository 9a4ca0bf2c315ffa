//! Error types for the delta crate.

/// Errors that can occur while decoding or applying a delta.
#[derive(Debug, thiserror::Error)]
pub enum DeltaError {
    /// The base handed to [`apply_delta`](crate::apply_delta) is not the one
    /// the script was computed against.
    #[error("delta base length mismatch: script expects {expected} bytes, base has {actual}")]
    BaseMismatch { expected: u64, actual: u64 },

    /// A copy op reaches outside the base.
    #[error("copy op out of range: offset {offset} len {len} exceeds base of {base_len} bytes")]
    CopyOutOfRange { offset: u64, len: u64, base_len: u64 },

    /// The rebuilt content does not have the length the script promised.
    #[error("delta produced {actual} bytes, expected {expected}")]
    TargetMismatch { expected: u64, actual: u64 },

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Convenience alias for delta results.
pub type DeltaResult<T> = Result<T, DeltaError>;
