use thiserror::Error;

/// Error type for all calamus operations.
#[derive(Error, Debug)]
pub enum CalamusError {
    /// Malformed file header or unrecognized framing.
    #[error("Format error: {0}")]
    Format(String),

    /// A read ran past the end of the input.
    #[error("Truncated input: {0}")]
    Truncated(String),

    /// A varint kept its continuation bit beyond the maximum width.
    #[error("Varint overflow: {0}")]
    Overflow(String),

    /// A length prefix exceeds the remaining input.
    #[error("Malformed length: {0}")]
    MalformedLength(String),

    /// A value did not match the declared field type, or a field is
    /// unknown to the schema.
    #[error("Schema error: {0}")]
    Schema(String),

    /// A broken internal invariant. Indicates a bug, not bad input.
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CalamusError {
    /// Create a format error.
    pub fn format(msg: impl Into<String>) -> Self {
        CalamusError::Format(msg.into())
    }

    /// Create a truncated-input error.
    pub fn truncated(msg: impl Into<String>) -> Self {
        CalamusError::Truncated(msg.into())
    }

    /// Create a varint overflow error.
    pub fn overflow(msg: impl Into<String>) -> Self {
        CalamusError::Overflow(msg.into())
    }

    /// Create a malformed-length error.
    pub fn malformed_length(msg: impl Into<String>) -> Self {
        CalamusError::MalformedLength(msg.into())
    }

    /// Create a schema error.
    pub fn schema(msg: impl Into<String>) -> Self {
        CalamusError::Schema(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        CalamusError::Internal(msg.into())
    }
}

/// Result type for all calamus operations.
pub type Result<T> = std::result::Result<T, CalamusError>;
