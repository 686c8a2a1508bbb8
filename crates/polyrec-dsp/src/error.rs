//! Error types for per-channel processing.

use thiserror::Error;

/// DSP error type.
#[derive(Error, Debug)]
pub enum Error {
    /// A filter parameter is outside its valid range.
    #[error("invalid filter parameter: {0}")]
    InvalidParameter(String),
}

/// Result type for DSP operations.
pub type Result<T> = std::result::Result<T, Error>;
