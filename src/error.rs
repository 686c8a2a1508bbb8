//! Error types for recording access.

use std::path::PathBuf;
use thiserror::Error;

/// Recording error type.
#[derive(Error, Debug)]
pub enum Error {
    /// No raw-data block in the container, or the requested window is
    /// empty after clamping.
    #[error("no data in the requested range")]
    NoDataFound,

    /// A data buffer uses a value type outside the decodable set.
    #[error("cannot handle data buffers of value type {0}")]
    UnsupportedEncoding(i32),

    /// Zero channels requested.
    #[error("empty channel selection")]
    EmptySelection,

    /// A caller-supplied destination has the wrong shape or numeric kind.
    #[error("destination buffer is {got}, expected {expected}")]
    BufferShapeMismatch {
        /// Shape and kind the operation requires.
        expected: String,
        /// Shape and kind the caller supplied.
        got: String,
    },

    /// The projection set changed after the recording was materialized
    /// under the old projection state.
    #[error("changing projections after data is materialized is not allowed")]
    InPlaceMutationForbidden,

    /// Save target equals the source path.
    #[error("cannot save a recording onto its own source file: {0}")]
    IdenticalDestination(PathBuf),

    /// In-place mutation or indexed assignment without a materialized
    /// buffer.
    #[error("recording data is not materialized; open with preload or call load_data")]
    NotPreloaded,

    /// Two data-skip markers with no data buffer between them.
    #[error("consecutive data-skip markers without an intervening data buffer")]
    ConsecutiveSkips,

    /// Container-level failure.
    #[error(transparent)]
    Container(#[from] polyrec_container::Error),

    /// Metadata failure.
    #[error(transparent)]
    Meta(#[from] polyrec_meta::Error),

    /// Per-channel processing failure.
    #[error(transparent)]
    Dsp(#[from] polyrec_dsp::Error),

    /// IO error outside the container layer.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for recording operations.
pub type Result<T> = std::result::Result<T, Error>;
