//! Error types for the container layer.

use thiserror::Error;

/// Container error type.
#[derive(Error, Debug)]
pub enum Error {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// File does not start with a container id tag.
    #[error("not a polyrec container: {0}")]
    BadMagic(String),

    /// Structural problem in the tag stream.
    #[error("malformed container: {0}")]
    Malformed(String),

    /// A tag payload did not have the expected value type or size.
    #[error("tag {kind}: expected {expected}, found value type {dtype} ({size} bytes)")]
    BadTagValue {
        /// Tag kind.
        kind: i32,
        /// What the caller asked the payload to decode as.
        expected: &'static str,
        /// Value type recorded in the tag header.
        dtype: i32,
        /// Payload size in bytes.
        size: usize,
    },
}

/// Result type for container operations.
pub type Result<T> = std::result::Result<T, Error>;
