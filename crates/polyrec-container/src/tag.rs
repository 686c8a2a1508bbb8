//! Tag records and payload decoding.

use crate::error::{Error, Result};
use crate::tags::{value_type, TAG_HEADER_SIZE};
use std::io::Read;

/// A directory entry for one tag: its header fields and where it lives.
///
/// Entries are cheap to hold in memory; the payload stays on disk until
/// [`crate::ContainerFile::read_tag`] is called with `pos`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagEntry {
    /// Tag kind.
    pub kind: i32,
    /// Value type of the payload.
    pub dtype: i32,
    /// Payload size in bytes.
    pub size: usize,
    /// Byte offset of the tag header in the file.
    pub pos: u64,
}

/// A fully read tag: header fields plus payload bytes.
#[derive(Debug, Clone)]
pub struct Tag {
    /// Tag kind.
    pub kind: i32,
    /// Value type of the payload.
    pub dtype: i32,
    /// Payload bytes.
    pub data: Vec<u8>,
}

/// Parsed 16-byte tag header.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TagHeader {
    pub kind: i32,
    pub dtype: i32,
    pub size: usize,
}

pub(crate) fn read_header<R: Read>(reader: &mut R) -> Result<Option<TagHeader>> {
    let mut buf = [0u8; TAG_HEADER_SIZE as usize];
    match reader.read_exact(&mut buf) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let kind = i32::from_be_bytes(buf[0..4].try_into().unwrap());
    let dtype = i32::from_be_bytes(buf[4..8].try_into().unwrap());
    let size = i32::from_be_bytes(buf[8..12].try_into().unwrap());
    // buf[12..16] is the `next` field; always 0 (sequential) in this version.
    if size < 0 {
        return Err(Error::Malformed(format!(
            "tag kind {kind} has negative payload size {size}"
        )));
    }
    Ok(Some(TagHeader {
        kind,
        dtype,
        size: size as usize,
    }))
}

impl Tag {
    fn bad_value(&self, expected: &'static str) -> Error {
        Error::BadTagValue {
            kind: self.kind,
            expected,
            dtype: self.dtype,
            size: self.data.len(),
        }
    }

    /// Decode the payload as a single i32.
    pub fn as_i32(&self) -> Result<i32> {
        if self.dtype != value_type::INT32 || self.data.len() != 4 {
            return Err(self.bad_value("a single i32"));
        }
        Ok(i32::from_be_bytes(self.data[..4].try_into().unwrap()))
    }

    /// Decode the payload as a single f64.
    pub fn as_f64(&self) -> Result<f64> {
        if self.dtype != value_type::FLOAT64 || self.data.len() != 8 {
            return Err(self.bad_value("a single f64"));
        }
        Ok(f64::from_be_bytes(self.data[..8].try_into().unwrap()))
    }

    /// Decode the payload as UTF-8 text.
    pub fn as_string(&self) -> Result<String> {
        if self.dtype != value_type::STRING {
            return Err(self.bad_value("a UTF-8 string"));
        }
        String::from_utf8(self.data.clone())
            .map_err(|_| self.bad_value("a UTF-8 string"))
    }

    /// Decode the payload as a vector of f64 values.
    pub fn as_f64_slice(&self) -> Result<Vec<f64>> {
        if self.dtype != value_type::FLOAT64 || self.data.len() % 8 != 0 {
            return Err(self.bad_value("f64 values"));
        }
        Ok(self
            .data
            .chunks_exact(8)
            .map(|c| f64::from_be_bytes(c.try_into().unwrap()))
            .collect())
    }

    /// Decode the payload as a vector of f32 values, widened to f64.
    pub fn as_f32_slice(&self) -> Result<Vec<f64>> {
        if self.dtype != value_type::FLOAT32 || self.data.len() % 4 != 0 {
            return Err(self.bad_value("f32 values"));
        }
        Ok(self
            .data
            .chunks_exact(4)
            .map(|c| f32::from_be_bytes(c.try_into().unwrap()) as f64)
            .collect())
    }
}
