//! Error types for the core value types.

use thiserror::Error;

/// Errors raised while validating or filling image buffers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("Buffer too small: need {needed} floats, have {actual}")]
    BufferTooSmall { needed: usize, actual: usize },

    #[error("Invalid buffer layout: {0}")]
    InvalidLayout(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
