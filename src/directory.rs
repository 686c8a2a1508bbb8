//! Sample directory built from the raw-data block's tag stream.
//!
//! The directory is the in-memory map of the recording: one entry per
//! on-disk buffer plus one virtual entry per run of absent (skipped)
//! samples, each annotated with the absolute sample range it covers.
//! It is built exactly once at open time and never changes afterwards.

use crate::error::{Error, Result};
use polyrec_container::tags::{kind, value_type};
use polyrec_container::{ContainerFile, TagEntry};
use tracing::debug;

/// Sample encoding of an on-disk data buffer.
///
/// Closed set: adding an encoding means adding a variant here and a
/// decoder arm in the segment reader, never another conditional chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleEncoding {
    /// Acquisition-packed 16-bit integers.
    PackedInt16,
    /// Plain 16-bit integers.
    Int16,
    /// 32-bit integers.
    Int32,
    /// 32-bit floats.
    Float32,
    /// Complex samples stored as (re, im) f32 pairs.
    ComplexFloat,
}

impl SampleEncoding {
    /// Map a container value type to an encoding.
    pub fn from_value_type(dtype: i32) -> Option<Self> {
        match dtype {
            value_type::PACKED_INT16 => Some(SampleEncoding::PackedInt16),
            value_type::INT16 => Some(SampleEncoding::Int16),
            value_type::INT32 => Some(SampleEncoding::Int32),
            value_type::FLOAT32 => Some(SampleEncoding::Float32),
            value_type::COMPLEX_FLOAT => Some(SampleEncoding::ComplexFloat),
            _ => None,
        }
    }

    /// Stored bytes per sample value.
    pub fn bytes_per_sample(self) -> usize {
        match self {
            SampleEncoding::PackedInt16 | SampleEncoding::Int16 => 2,
            SampleEncoding::Int32 | SampleEncoding::Float32 => 4,
            SampleEncoding::ComplexFloat => 8,
        }
    }

    /// Whether decoded samples are complex-valued.
    pub fn is_complex(self) -> bool {
        matches!(self, SampleEncoding::ComplexFloat)
    }
}

/// What backs a directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryBody {
    /// An encoded buffer on disk at the given tag offset.
    Buffer {
        /// Tag offset in the container.
        pos: u64,
        /// Sample encoding of the payload.
        encoding: SampleEncoding,
    },
    /// A virtual run of absent samples; decodes to zeros.
    Skip,
}

/// One contiguous run of absolute sample indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectoryEntry {
    /// First absolute sample index (inclusive).
    pub first: i64,
    /// Last absolute sample index (inclusive).
    pub last: i64,
    /// Sample count, `last - first + 1`.
    pub nsamp: usize,
    /// Backing storage.
    pub body: EntryBody,
}

impl DirectoryEntry {
    /// Whether this entry is a virtual skip run.
    pub fn is_skip(&self) -> bool {
        matches!(self.body, EntryBody::Skip)
    }
}

/// The complete sample directory of a recording.
#[derive(Debug, Clone, Default)]
pub struct Directory {
    /// Entries sorted by `first`, contiguous and non-overlapping.
    pub entries: Vec<DirectoryEntry>,
    /// Absolute index of the first sample.
    pub first_samp: i64,
    /// Absolute index of the last sample; `first_samp - 1` when empty.
    pub last_samp: i64,
}

impl Directory {
    /// Total sample count.
    pub fn n_samples(&self) -> usize {
        (self.last_samp - self.first_samp + 1).max(0) as usize
    }
}

/// Parser states for the directory scan.
///
/// The initial-skip handling is order dependent: a skip marker seen
/// before any buffer is scaled by the sample count of the *next* buffer,
/// which is unknown until that buffer's tag arrives. Making the states
/// explicit keeps the one-pending-skip invariant visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    /// Before the optional first-sample marker.
    AwaitingFirstSample,
    /// Before the optional deferred initial skip marker.
    AwaitingPossibleSkip,
    /// Main scan over skip and buffer tags.
    Scanning,
}

/// Build the directory from the tag entries of a raw-data block.
///
/// Reads only the first-sample and skip tag payloads; buffer payloads
/// stay on disk. Tags of other kinds are ignored. Zero buffers is a
/// valid, empty directory.
pub fn build_directory(
    file: &mut ContainerFile,
    entries: &[TagEntry],
    nchan: usize,
) -> Result<Directory> {
    let mut state = ScanState::AwaitingFirstSample;
    let mut cursor: i64 = 0;
    let mut first_skip: i64 = 0;
    let mut pending_skip: i64 = 0;
    let mut dir_entries: Vec<DirectoryEntry> = Vec::new();

    for entry in entries {
        if state == ScanState::AwaitingFirstSample {
            if entry.kind == kind::FIRST_SAMPLE {
                cursor = i64::from(file.read_tag(entry.pos)?.as_i32()?);
                state = ScanState::AwaitingPossibleSkip;
                continue;
            }
            state = ScanState::AwaitingPossibleSkip;
        }
        if state == ScanState::AwaitingPossibleSkip {
            if entry.kind == kind::DATA_SKIP {
                first_skip = i64::from(file.read_tag(entry.pos)?.as_i32()?);
                state = ScanState::Scanning;
                continue;
            }
            state = ScanState::Scanning;
        }

        match entry.kind {
            kind::DATA_SKIP => {
                if first_skip > 0 || pending_skip > 0 {
                    return Err(Error::ConsecutiveSkips);
                }
                pending_skip = i64::from(file.read_tag(entry.pos)?.as_i32()?);
            }
            kind::DATA_BUFFER => {
                let encoding = SampleEncoding::from_value_type(entry.dtype)
                    .ok_or(Error::UnsupportedEncoding(entry.dtype))?;
                if nchan == 0 {
                    return Err(polyrec_container::Error::Malformed(
                        "data buffer in a recording with zero channels".into(),
                    )
                    .into());
                }
                let nsamp = entry.size / (encoding.bytes_per_sample() * nchan);

                // The initial skip is in units of this buffer's length.
                if first_skip > 0 {
                    cursor += nsamp as i64 * first_skip;
                    first_skip = 0;
                }

                if pending_skip > 0 {
                    let skip_samps = pending_skip * nsamp as i64;
                    dir_entries.push(DirectoryEntry {
                        first: cursor,
                        last: cursor + skip_samps - 1,
                        nsamp: skip_samps as usize,
                        body: EntryBody::Skip,
                    });
                    cursor += skip_samps;
                    pending_skip = 0;
                }

                dir_entries.push(DirectoryEntry {
                    first: cursor,
                    last: cursor + nsamp as i64 - 1,
                    nsamp,
                    body: EntryBody::Buffer {
                        pos: entry.pos,
                        encoding,
                    },
                });
                cursor += nsamp as i64;
            }
            _ => {}
        }
    }

    let first_samp = dir_entries.first().map(|e| e.first).unwrap_or(cursor);
    let directory = Directory {
        entries: dir_entries,
        first_samp,
        last_samp: cursor - 1,
    };
    debug!(
        n_entries = directory.entries.len(),
        first_samp = directory.first_samp,
        last_samp = directory.last_samp,
        "built sample directory"
    );
    Ok(directory)
}
