//! Tagged binary container for multichannel recordings.
//!
//! A container file is a flat sequence of tags. Each tag is a 16-byte
//! big-endian header (`kind`, `dtype`, `size`, `next`) followed by `size`
//! payload bytes. Nesting is expressed with `BLOCK_START`/`BLOCK_END` tags
//! whose payload is the block kind, so the file reads as a tree of blocks
//! with tag entries at every level.
//!
//! This crate only knows about bytes and tags. What the tags *mean*
//! (channels, buffers, projections) lives in `polyrec-meta` and the
//! `polyrec` umbrella crate.

pub mod error;
pub mod file;
pub mod tag;
pub mod tags;
pub mod tree;
pub mod writer;

pub use error::{Error, Result};
pub use file::{open, ContainerFile};
pub use tag::{Tag, TagEntry};
pub use tree::BlockNode;
pub use writer::TagWriter;
