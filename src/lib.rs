//! # polyrec - multichannel continuous-recording toolkit
//!
//! Access to long multichannel time-series recordings stored in a tagged
//! binary container as a sequence of discontiguous, variably-sized,
//! possibly gap-containing buffers.
//!
//! ## Architecture
//!
//! polyrec is an umbrella crate coordinating:
//! - **polyrec-container** - the tagged binary container (tags, blocks,
//!   tokenizer, writer)
//! - **polyrec-meta** - measurement metadata (channels, projections,
//!   compensation) and channel selection
//! - **polyrec-dsp** - per-channel filters and the analytic signal
//!
//! The umbrella itself holds the core: the sample directory, the segment
//! reader and writer, the projection-operator cache, and the
//! [`Recording`] handle tying them together.
//!
//! ## Quick start
//!
//! ```ignore
//! use polyrec::prelude::*;
//!
//! let mut rec = Recording::open("run.prc", OpenOptions::new())?;
//!
//! // Calibrated data for two channels over the first 10 seconds.
//! let stop = rec.time_to_index(&[10.0])[0];
//! let (data, times) = rec.get(Some(&[0, 1]), 0, Some(stop))?;
//!
//! // Materialize, band-pass the signal channels, save a copy.
//! rec.load_data()?;
//! rec.filter(Some(1.0), Some(40.0), None, 0.5, true)?;
//! rec.save("run-filtered.prc", SaveOptions::new())?;
//! # Ok::<(), polyrec::Error>(())
//! ```

/// Re-export of the container layer for direct access.
pub use polyrec_container as container;
/// Re-export of per-channel processing for direct access.
pub use polyrec_dsp as dsp;
/// Re-export of the metadata layer for direct access.
pub use polyrec_meta as meta;

pub mod directory;
pub mod error;
pub mod proj;
pub mod recording;
pub mod segment;
pub mod writer;

pub use directory::{Directory, DirectoryEntry, EntryBody, SampleEncoding};
pub use error::{Error, Result};
pub use proj::ProjectorCache;
pub use recording::{OpenOptions, Preload, Recording};
pub use segment::{CMatrix, SegmentData};
pub use writer::SaveOptions;

/// The most common imports in one place.
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::recording::{OpenOptions, Preload, Recording};
    pub use crate::segment::SegmentData;
    pub use crate::writer::SaveOptions;
    pub use polyrec_meta::pick::{pick_channels, pick_types};
    pub use polyrec_meta::{ChannelInfo, ChannelKind, Projection, RecordingInfo};
}
