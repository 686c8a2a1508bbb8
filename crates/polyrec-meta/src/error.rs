//! Error types for the metadata layer.

use thiserror::Error;

/// Metadata error type.
#[derive(Error, Debug)]
pub enum Error {
    /// Container-level failure while reading or writing tags.
    #[error("container error: {0}")]
    Container(#[from] polyrec_container::Error),

    /// A required tag or block is absent.
    #[error("missing {0} in measurement block")]
    Missing(&'static str),

    /// Structurally present but inconsistent metadata.
    #[error("malformed metadata: {0}")]
    Malformed(String),
}

/// Result type for metadata operations.
pub type Result<T> = std::result::Result<T, Error>;
