//! Tag kind, block kind, and value type constants.
//!
//! The numeric values are part of the on-disk format and must never change.

/// Tag kinds.
pub mod kind {
    /// File identification tag, always first in a file. Payload: magic + version.
    pub const FILE_ID: i32 = 100;
    /// Opens a block. Payload: block kind.
    pub const BLOCK_START: i32 = 104;
    /// Closes the innermost open block. Payload: block kind.
    pub const BLOCK_END: i32 = 105;
    /// Padding / no operation.
    pub const NOP: i32 = 106;

    /// Number of channels in the recording.
    pub const CHANNEL_COUNT: i32 = 200;
    /// Sampling rate in Hz.
    pub const SAMPLE_RATE: i32 = 201;
    /// One channel description (see `value_type::CHANNEL_INFO`).
    pub const CHANNEL_INFO: i32 = 203;
    /// Free-form recording comment.
    pub const COMMENT: i32 = 206;
    /// Absolute sample number of the first sample in the data block.
    pub const FIRST_SAMPLE: i32 = 208;

    /// One encoded buffer of sample data.
    pub const DATA_BUFFER: i32 = 300;
    /// Run of absent samples, in units of the next buffer's length.
    pub const DATA_SKIP: i32 = 301;

    /// Projection vector name.
    pub const PROJ_NAME: i32 = 401;
    /// Projection vector active flag (0/1).
    pub const PROJ_ACTIVE: i32 = 402;
    /// Projection vector row data over all channels.
    pub const PROJ_VECTOR: i32 = 403;

    /// Compensation matrix (row count, column count, row-major values).
    pub const COMP_MATRIX: i32 = 501;
}

/// Block kinds.
pub mod block {
    /// Top-level measurement block.
    pub const MEASUREMENT: i32 = 100;
    /// Raw continuous data recorded normally.
    pub const RAW_DATA: i32 = 102;
    /// Raw continuous data stored by legacy writers.
    pub const CONTINUOUS_DATA: i32 = 112;
    /// Raw data recorded with active shielding; only eligible on request.
    pub const SHIELDED_RAW_DATA: i32 = 119;
    /// Group of projection items.
    pub const PROJECTION: i32 = 313;
    /// One projection vector definition.
    pub const PROJECTION_ITEM: i32 = 314;
}

/// Value types carried in the tag header's `dtype` field.
pub mod value_type {
    /// Big-endian i16 values.
    pub const INT16: i32 = 2;
    /// Big-endian i32 values.
    pub const INT32: i32 = 3;
    /// Big-endian IEEE-754 f32 values.
    pub const FLOAT32: i32 = 4;
    /// Big-endian IEEE-754 f64 values.
    pub const FLOAT64: i32 = 5;
    /// UTF-8 text.
    pub const STRING: i32 = 10;
    /// Acquisition-packed 16-bit samples; decodes like `INT16`.
    pub const PACKED_INT16: i32 = 16;
    /// Interleaved (re, im) f32 pairs.
    pub const COMPLEX_FLOAT: i32 = 20;
    /// Channel description record.
    pub const CHANNEL_INFO: i32 = 30;
}

/// Magic number in the `FILE_ID` payload.
pub const MAGIC: i32 = 0x706c_7263;

/// Current format version in the `FILE_ID` payload.
pub const VERSION: i32 = 1;

/// Size of a tag header in bytes.
pub const TAG_HEADER_SIZE: u64 = 16;
