//! Measurement description: channel table, sampling rate, projections,
//! compensation, and their tag-level serialization.

use crate::error::{Error, Result};
use crate::matrix::Matrix;
use crate::proj::Projection;
use polyrec_container::tags::{block, kind, value_type};
use polyrec_container::{BlockNode, ContainerFile, TagWriter};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// What a channel measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelKind {
    /// A measurement channel carrying the recorded signal.
    Signal,
    /// A reference channel used for compensation.
    Reference,
    /// A trigger / event channel.
    Trigger,
    /// Anything else (auxiliary, bookkeeping).
    Misc,
}

impl ChannelKind {
    /// On-disk code.
    pub fn code(self) -> i32 {
        match self {
            ChannelKind::Signal => 1,
            ChannelKind::Reference => 2,
            ChannelKind::Trigger => 3,
            ChannelKind::Misc => 4,
        }
    }

    /// Decode an on-disk code; unknown codes map to `Misc`.
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => ChannelKind::Signal,
            2 => ChannelKind::Reference,
            3 => ChannelKind::Trigger,
            _ => ChannelKind::Misc,
        }
    }
}

/// One channel of the recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelInfo {
    /// Channel name, unique within a recording.
    pub name: String,
    /// Channel kind.
    pub kind: ChannelKind,
    /// Physical range of the digitizer for this channel.
    pub range: f64,
    /// Calibration coefficient.
    pub cal: f64,
}

impl ChannelInfo {
    /// Total per-channel gain applied when decoding stored samples.
    pub fn calibration(&self) -> f64 {
        self.range * self.cal
    }
}

/// Full measurement description of a recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingInfo {
    /// Sampling rate in Hz.
    pub sfreq: f64,
    /// Ordered channel table.
    pub chs: Vec<ChannelInfo>,
    /// Projection vector definitions.
    pub projs: Vec<Projection>,
    /// Optional compensation matrix (nchan x nchan).
    pub comp: Option<Matrix>,
    /// Optional free-form comment.
    pub comment: Option<String>,
}

impl RecordingInfo {
    /// Channel count.
    pub fn nchan(&self) -> usize {
        self.chs.len()
    }

    /// Channel names in recording order.
    pub fn ch_names(&self) -> Vec<&str> {
        self.chs.iter().map(|c| c.name.as_str()).collect()
    }

    /// Per-channel calibration vector, `range * cal` for each channel.
    pub fn calibration(&self) -> Vec<f64> {
        self.chs.iter().map(|c| c.calibration()).collect()
    }
}

/// Read the measurement description from an open container.
pub fn read_info(file: &mut ContainerFile, tree: &BlockNode) -> Result<RecordingInfo> {
    let meas = tree
        .find_blocks(block::MEASUREMENT)
        .into_iter()
        .next()
        .ok_or(Error::Missing("measurement block"))?;

    let nchan_entry = meas
        .find_entry(kind::CHANNEL_COUNT)
        .ok_or(Error::Missing("channel count"))?;
    let nchan = file.read_tag(nchan_entry.pos)?.as_i32()?;
    if nchan < 0 {
        return Err(Error::Malformed(format!("negative channel count {nchan}")));
    }
    let nchan = nchan as usize;

    let sfreq_entry = meas
        .find_entry(kind::SAMPLE_RATE)
        .ok_or(Error::Missing("sampling rate"))?;
    let sfreq = file.read_tag(sfreq_entry.pos)?.as_f64()?;
    if !(sfreq.is_finite() && sfreq > 0.0) {
        return Err(Error::Malformed(format!("invalid sampling rate {sfreq}")));
    }

    let mut chs = Vec::with_capacity(nchan);
    for entry in meas.find_entries(kind::CHANNEL_INFO) {
        let tag = file.read_tag(entry.pos)?;
        chs.push(decode_channel(&tag.data)?);
    }
    if chs.len() != nchan {
        return Err(Error::Malformed(format!(
            "channel count {} does not match {} channel info tags",
            nchan,
            chs.len()
        )));
    }

    let comment = match meas.find_entry(kind::COMMENT) {
        Some(entry) => Some(file.read_tag(entry.pos)?.as_string()?),
        None => None,
    };

    let mut projs = Vec::new();
    for proj_block in meas.find_blocks(block::PROJECTION) {
        for item in proj_block.find_blocks(block::PROJECTION_ITEM) {
            projs.push(read_proj_item(file, item, nchan)?);
        }
    }

    let comp = match meas.find_entry(kind::COMP_MATRIX) {
        Some(entry) => {
            let tag = file.read_tag(entry.pos)?;
            Some(decode_comp(&tag.data, nchan)?)
        }
        None => None,
    };

    debug!(
        nchan,
        sfreq,
        n_projs = projs.len(),
        has_comp = comp.is_some(),
        "read measurement description"
    );

    Ok(RecordingInfo {
        sfreq,
        chs,
        projs,
        comp,
        comment,
    })
}

/// Write the measurement description. The caller is inside the
/// measurement block; channel order defines buffer sample order.
pub fn write_info(w: &mut TagWriter, info: &RecordingInfo) -> Result<()> {
    w.write_i32(kind::CHANNEL_COUNT, info.nchan() as i32)?;
    w.write_f64(kind::SAMPLE_RATE, info.sfreq)?;
    if let Some(comment) = &info.comment {
        w.write_string(kind::COMMENT, comment)?;
    }
    for ch in &info.chs {
        w.write_tag(kind::CHANNEL_INFO, value_type::CHANNEL_INFO, &encode_channel(ch))?;
    }
    if let Some(comp) = &info.comp {
        w.write_tag(kind::COMP_MATRIX, value_type::FLOAT64, &encode_comp(comp))?;
    }
    if !info.projs.is_empty() {
        w.start_block(block::PROJECTION)?;
        for p in &info.projs {
            w.start_block(block::PROJECTION_ITEM)?;
            w.write_string(kind::PROJ_NAME, &p.name)?;
            w.write_i32(kind::PROJ_ACTIVE, i32::from(p.active))?;
            w.write_f64_slice(kind::PROJ_VECTOR, &p.data)?;
            w.end_block(block::PROJECTION_ITEM)?;
        }
        w.end_block(block::PROJECTION)?;
    }
    Ok(())
}

// Channel info payload: kind i32, range f64, cal f64, name UTF-8.
fn encode_channel(ch: &ChannelInfo) -> Vec<u8> {
    let mut payload = Vec::with_capacity(20 + ch.name.len());
    payload.extend_from_slice(&ch.kind.code().to_be_bytes());
    payload.extend_from_slice(&ch.range.to_be_bytes());
    payload.extend_from_slice(&ch.cal.to_be_bytes());
    payload.extend_from_slice(ch.name.as_bytes());
    payload
}

fn decode_channel(payload: &[u8]) -> Result<ChannelInfo> {
    if payload.len() < 20 {
        return Err(Error::Malformed(format!(
            "channel info payload too short: {} bytes",
            payload.len()
        )));
    }
    let kind_code = i32::from_be_bytes(payload[0..4].try_into().unwrap());
    let range = f64::from_be_bytes(payload[4..12].try_into().unwrap());
    let cal = f64::from_be_bytes(payload[12..20].try_into().unwrap());
    let name = String::from_utf8(payload[20..].to_vec())
        .map_err(|_| Error::Malformed("channel name is not UTF-8".into()))?;
    Ok(ChannelInfo {
        name,
        kind: ChannelKind::from_code(kind_code),
        range,
        cal,
    })
}

fn read_proj_item(
    file: &mut ContainerFile,
    item: &BlockNode,
    nchan: usize,
) -> Result<Projection> {
    let name = match item.find_entry(kind::PROJ_NAME) {
        Some(entry) => file.read_tag(entry.pos)?.as_string()?,
        None => String::new(),
    };
    let active = match item.find_entry(kind::PROJ_ACTIVE) {
        Some(entry) => file.read_tag(entry.pos)?.as_i32()? != 0,
        None => false,
    };
    let entry = item
        .find_entry(kind::PROJ_VECTOR)
        .ok_or(Error::Missing("projection vector data"))?;
    let data = file.read_tag(entry.pos)?.as_f64_slice()?;
    if data.len() != nchan {
        return Err(Error::Malformed(format!(
            "projection '{}' has {} coefficients for {} channels",
            name,
            data.len(),
            nchan
        )));
    }
    Ok(Projection { name, data, active })
}

// Compensation payload: rows i32, cols i32, row-major f64 values.
fn encode_comp(comp: &Matrix) -> Vec<u8> {
    let mut payload = Vec::with_capacity(8 + comp.as_slice().len() * 8);
    payload.extend_from_slice(&(comp.rows() as i32).to_be_bytes());
    payload.extend_from_slice(&(comp.cols() as i32).to_be_bytes());
    for v in comp.as_slice() {
        payload.extend_from_slice(&v.to_be_bytes());
    }
    payload
}

fn decode_comp(payload: &[u8], nchan: usize) -> Result<Matrix> {
    if payload.len() < 8 {
        return Err(Error::Malformed("compensation matrix payload too short".into()));
    }
    let rows = i32::from_be_bytes(payload[0..4].try_into().unwrap());
    let cols = i32::from_be_bytes(payload[4..8].try_into().unwrap());
    if rows < 0 || cols < 0 {
        return Err(Error::Malformed("negative compensation dimensions".into()));
    }
    let (rows, cols) = (rows as usize, cols as usize);
    let values = &payload[8..];
    if values.len() != rows * cols * 8 {
        return Err(Error::Malformed(format!(
            "compensation matrix {}x{} does not match {} payload bytes",
            rows,
            cols,
            values.len()
        )));
    }
    if rows != nchan || cols != nchan {
        return Err(Error::Malformed(format!(
            "compensation matrix is {rows}x{cols}, expected {nchan}x{nchan}"
        )));
    }
    let data = values
        .chunks_exact(8)
        .map(|c| f64::from_be_bytes(c.try_into().unwrap()))
        .collect();
    Ok(Matrix::from_vec(rows, cols, data))
}
