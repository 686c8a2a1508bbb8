//! Tag-level container writer.

use crate::error::{Error, Result};
use crate::tags::{kind, value_type, MAGIC, VERSION};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Sequential writer for a container file.
///
/// Writes the file id tag on creation; callers open and close blocks
/// explicitly and must call [`TagWriter::finish`] to flush. Block nesting
/// is tracked so a mismatched or missing `end_block` fails instead of
/// producing a file the scanner would reject later.
pub struct TagWriter {
    w: BufWriter<File>,
    path: PathBuf,
    open_blocks: Vec<i32>,
}

impl TagWriter {
    /// Create a new container at `path`, truncating any existing file.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;
        let mut writer = Self {
            w: BufWriter::new(file),
            path,
            open_blocks: Vec::new(),
        };
        let mut payload = Vec::with_capacity(8);
        payload.extend_from_slice(&MAGIC.to_be_bytes());
        payload.extend_from_slice(&VERSION.to_be_bytes());
        writer.write_tag(kind::FILE_ID, value_type::INT32, &payload)?;
        Ok(writer)
    }

    /// Path being written.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write one tag with an arbitrary payload.
    pub fn write_tag(&mut self, tag_kind: i32, dtype: i32, payload: &[u8]) -> Result<()> {
        let size = i32::try_from(payload.len()).map_err(|_| {
            Error::Malformed(format!("tag kind {tag_kind} payload exceeds 2 GiB"))
        })?;
        self.w.write_all(&tag_kind.to_be_bytes())?;
        self.w.write_all(&dtype.to_be_bytes())?;
        self.w.write_all(&size.to_be_bytes())?;
        self.w.write_all(&0i32.to_be_bytes())?;
        self.w.write_all(payload)?;
        Ok(())
    }

    /// Open a block.
    pub fn start_block(&mut self, block_kind: i32) -> Result<()> {
        self.write_tag(kind::BLOCK_START, value_type::INT32, &block_kind.to_be_bytes())?;
        self.open_blocks.push(block_kind);
        Ok(())
    }

    /// Close the innermost open block, which must have the given kind.
    pub fn end_block(&mut self, block_kind: i32) -> Result<()> {
        match self.open_blocks.pop() {
            Some(open) if open == block_kind => {}
            Some(open) => {
                return Err(Error::Malformed(format!(
                    "closing block {block_kind} but block {open} is open"
                )))
            }
            None => {
                return Err(Error::Malformed(format!(
                    "closing block {block_kind} with no block open"
                )))
            }
        }
        self.write_tag(kind::BLOCK_END, value_type::INT32, &block_kind.to_be_bytes())
    }

    /// Write a single i32 tag.
    pub fn write_i32(&mut self, tag_kind: i32, value: i32) -> Result<()> {
        self.write_tag(tag_kind, value_type::INT32, &value.to_be_bytes())
    }

    /// Write a single f64 tag.
    pub fn write_f64(&mut self, tag_kind: i32, value: f64) -> Result<()> {
        self.write_tag(tag_kind, value_type::FLOAT64, &value.to_be_bytes())
    }

    /// Write a UTF-8 string tag.
    pub fn write_string(&mut self, tag_kind: i32, value: &str) -> Result<()> {
        self.write_tag(tag_kind, value_type::STRING, value.as_bytes())
    }

    /// Write an f64 array tag.
    pub fn write_f64_slice(&mut self, tag_kind: i32, values: &[f64]) -> Result<()> {
        let mut payload = Vec::with_capacity(values.len() * 8);
        for v in values {
            payload.extend_from_slice(&v.to_be_bytes());
        }
        self.write_tag(tag_kind, value_type::FLOAT64, &payload)
    }

    /// Write an f32 buffer tag from f64 samples, narrowing each value.
    pub fn write_f32_buffer(&mut self, tag_kind: i32, values: &[f64]) -> Result<()> {
        let mut payload = Vec::with_capacity(values.len() * 4);
        for v in values {
            payload.extend_from_slice(&(*v as f32).to_be_bytes());
        }
        self.write_tag(tag_kind, value_type::FLOAT32, &payload)
    }

    /// Write a complex buffer tag from (re, im) f64 pairs.
    pub fn write_complex_buffer(&mut self, tag_kind: i32, values: &[(f64, f64)]) -> Result<()> {
        let mut payload = Vec::with_capacity(values.len() * 8);
        for (re, im) in values {
            payload.extend_from_slice(&(*re as f32).to_be_bytes());
            payload.extend_from_slice(&(*im as f32).to_be_bytes());
        }
        self.write_tag(tag_kind, value_type::COMPLEX_FLOAT, &payload)
    }

    /// Flush and close the file. All blocks must be closed.
    pub fn finish(mut self) -> Result<()> {
        if let Some(open) = self.open_blocks.last() {
            return Err(Error::Malformed(format!(
                "finishing file with block {open} still open"
            )));
        }
        self.write_tag(kind::NOP, value_type::INT32, &[])?;
        self.w.flush()?;
        debug!(path = %self.path.display(), "finished container");
        Ok(())
    }
}
