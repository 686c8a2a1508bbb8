//! Container file access: open, structural scan, positioned tag reads.

use crate::error::{Error, Result};
use crate::tag::{read_header, Tag, TagEntry};
use crate::tags::{kind, TAG_HEADER_SIZE, MAGIC, VERSION};
use crate::tree::BlockNode;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::debug;

/// An open container file.
///
/// Positioned reads seek freely, so a single handle must not be shared
/// between threads; the `&mut self` receivers enforce that.
pub struct ContainerFile {
    file: File,
    path: PathBuf,
}

impl ContainerFile {
    /// Path this container was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the full tag at a known byte offset.
    pub fn read_tag(&mut self, pos: u64) -> Result<Tag> {
        self.file.seek(SeekFrom::Start(pos))?;
        let header = read_header(&mut self.file)?.ok_or_else(|| {
            Error::Malformed(format!("tag offset {pos} is past end of file"))
        })?;
        let mut data = vec![0u8; header.size];
        self.file.read_exact(&mut data)?;
        Ok(Tag {
            kind: header.kind,
            dtype: header.dtype,
            data,
        })
    }
}

/// Open a container and scan its block structure.
///
/// The scan reads every tag header exactly once and no payloads except the
/// block delimiters, so it stays cheap even for large recordings. Returns
/// the open file and the block tree rooted at a synthetic node.
pub fn open<P: AsRef<Path>>(path: P) -> Result<(ContainerFile, BlockNode)> {
    let path = path.as_ref().to_path_buf();
    let mut file = File::open(&path)?;

    check_file_id(&mut file, &path)?;

    let mut root = BlockNode::new(0);
    let mut stack: Vec<BlockNode> = Vec::new();
    let mut pos = file.stream_position()?;
    let mut n_tags = 1usize;

    loop {
        file.seek(SeekFrom::Start(pos))?;
        let header = match read_header(&mut file)? {
            Some(h) => h,
            None => break,
        };
        n_tags += 1;

        match header.kind {
            kind::BLOCK_START => {
                let block_kind = read_block_kind(&mut file, header.size, pos)?;
                stack.push(BlockNode::new(block_kind));
            }
            kind::BLOCK_END => {
                let block_kind = read_block_kind(&mut file, header.size, pos)?;
                let node = stack.pop().ok_or_else(|| {
                    Error::Malformed(format!(
                        "block end for kind {block_kind} with no open block at offset {pos}"
                    ))
                })?;
                if node.kind != block_kind {
                    return Err(Error::Malformed(format!(
                        "block end kind {block_kind} does not close open block {}",
                        node.kind
                    )));
                }
                match stack.last_mut() {
                    Some(parent) => parent.children.push(node),
                    None => root.children.push(node),
                }
            }
            _ => {
                let entry = TagEntry {
                    kind: header.kind,
                    dtype: header.dtype,
                    size: header.size,
                    pos,
                };
                match stack.last_mut() {
                    Some(node) => node.entries.push(entry),
                    None => root.entries.push(entry),
                }
            }
        }

        pos += TAG_HEADER_SIZE + header.size as u64;
    }

    if let Some(open_block) = stack.last() {
        return Err(Error::Malformed(format!(
            "file ends inside open block of kind {}",
            open_block.kind
        )));
    }

    debug!(path = %path.display(), n_tags, "scanned container");

    Ok((ContainerFile { file, path }, root))
}

fn check_file_id(file: &mut File, path: &Path) -> Result<()> {
    let header = read_header(file)?
        .ok_or_else(|| Error::BadMagic(format!("{} is empty", path.display())))?;
    if header.kind != kind::FILE_ID || header.size != 8 {
        return Err(Error::BadMagic(format!(
            "{} does not start with a file id tag",
            path.display()
        )));
    }
    let mut payload = [0u8; 8];
    file.read_exact(&mut payload)?;
    let magic = i32::from_be_bytes(payload[0..4].try_into().unwrap());
    let version = i32::from_be_bytes(payload[4..8].try_into().unwrap());
    if magic != MAGIC {
        return Err(Error::BadMagic(format!(
            "{} has wrong magic number",
            path.display()
        )));
    }
    if version != VERSION {
        return Err(Error::Malformed(format!(
            "unsupported container version {version}"
        )));
    }
    Ok(())
}

fn read_block_kind(file: &mut File, size: usize, pos: u64) -> Result<i32> {
    if size != 4 {
        return Err(Error::Malformed(format!(
            "block delimiter at offset {pos} has payload size {size}, expected 4"
        )));
    }
    let mut buf = [0u8; 4];
    file.read_exact(&mut buf)?;
    Ok(i32::from_be_bytes(buf))
}
