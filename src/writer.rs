//! Saving a recording back out: chunk the requested range into
//! fixed-duration buffers, divide out calibration, and serialize into a
//! fresh container.

use crate::error::{Error, Result};
use crate::recording::Recording;
use crate::segment::SegmentData;
use polyrec_container::tags::{block, kind};
use polyrec_container::TagWriter;
use polyrec_meta::{deactivate_all, write_info, Matrix, Projection, RecordingInfo};
use std::path::Path;
use tracing::{debug, warn};

/// Options for [`Recording::save`].
#[derive(Debug, Clone)]
pub struct SaveOptions {
    /// Channels to include; `None` keeps all channels.
    pub picks: Option<Vec<usize>>,
    /// Start time in seconds from the recording start.
    pub tmin: f64,
    /// End time in seconds; `None` saves to the end.
    pub tmax: Option<f64>,
    /// Nominal output buffer duration in seconds.
    pub buffer_secs: f64,
    /// Omit an undersized final buffer instead of writing it short.
    pub drop_small_buffer: bool,
    /// Write projections active/inactive; `None` follows the handle.
    pub proj_active: Option<bool>,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            picks: None,
            tmin: 0.0,
            tmax: None,
            buffer_secs: 10.0,
            drop_small_buffer: false,
            proj_active: None,
        }
    }
}

impl SaveOptions {
    /// Default options: all channels, full range, 10-second buffers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep only the given channels, in the given order.
    pub fn with_picks(mut self, picks: Vec<usize>) -> Self {
        self.picks = Some(picks);
        self
    }

    /// Start time in seconds.
    pub fn with_tmin(mut self, tmin: f64) -> Self {
        self.tmin = tmin;
        self
    }

    /// End time in seconds.
    pub fn with_tmax(mut self, tmax: f64) -> Self {
        self.tmax = Some(tmax);
        self
    }

    /// Nominal buffer duration in seconds.
    pub fn with_buffer_secs(mut self, secs: f64) -> Self {
        self.buffer_secs = secs;
        self
    }

    /// Omit an undersized final buffer.
    pub fn with_drop_small_buffer(mut self, drop: bool) -> Self {
        self.drop_small_buffer = drop;
        self
    }

    /// Force projections to be written active or inactive.
    pub fn with_proj_active(mut self, active: bool) -> Self {
        self.proj_active = Some(active);
        self
    }
}

/// Write the recording to a new container at `path`.
///
/// The reader streams from the source handle while this writes, so
/// writing onto the source path is refused up front. Panics if
/// `buffer_secs` is not positive.
pub(crate) fn save_recording(
    rec: &mut Recording,
    path: &Path,
    options: &SaveOptions,
) -> Result<()> {
    if same_file(rec.path(), path) {
        return Err(Error::IdenticalDestination(path.to_path_buf()));
    }
    assert!(
        options.buffer_secs > 0.0,
        "output buffer duration must be positive"
    );

    let sfreq = rec.info().sfreq;
    let picks = options.picks.as_deref();

    let mut out_info = subset_info(rec.info(), picks);
    let proj_active = options.proj_active.unwrap_or(rec.proj_enabled());
    if !proj_active {
        deactivate_all(&mut out_info.projs);
    }
    // Stored samples are physical values divided by the channel cal;
    // range collapses to 1.0 so the written cal is the whole gain.
    let write_cals: Vec<f64> = out_info.chs.iter().map(|c| c.cal).collect();
    for ch in &mut out_info.chs {
        ch.range = 1.0;
    }

    let start = (options.tmin * sfreq).floor() as i64;
    let n_times = rec.n_times() as i64;
    let stop = options
        .tmax
        .map(|t| (t * sfreq).floor() as i64)
        .unwrap_or(n_times)
        .min(n_times);
    if start < 0 || start >= stop {
        return Err(Error::NoDataFound);
    }
    let buffer_len = ((options.buffer_secs * sfreq).ceil() as i64).max(1);

    debug!(
        path = %path.display(),
        start,
        stop,
        buffer_len,
        nchan = out_info.nchan(),
        "saving recording"
    );

    let mut w = TagWriter::create(path)?;
    w.start_block(block::MEASUREMENT)?;
    write_info(&mut w, &out_info)?;
    w.start_block(block::RAW_DATA)?;
    w.write_i32(kind::FIRST_SAMPLE, (rec.first_samp() + start) as i32)?;

    let mut warned_complex = false;
    let mut first = start;
    while first < stop {
        let last = (first + buffer_len).min(stop);
        if options.drop_small_buffer && first > start && last - first < buffer_len {
            debug!("dropping undersized final buffer");
            break;
        }
        let (data, _times) = rec.get(picks, first, Some(last))?;
        write_buffer(&mut w, &data, &write_cals, &mut warned_complex)?;
        first += buffer_len;
    }

    w.end_block(block::RAW_DATA)?;
    w.end_block(block::MEASUREMENT)?;
    w.finish()?;
    Ok(())
}

/// Serialize one calibrated block with the calibration divided back out,
/// sample-major as the decoder expects.
fn write_buffer(
    w: &mut TagWriter,
    data: &SegmentData,
    cals: &[f64],
    warned_complex: &mut bool,
) -> Result<()> {
    let (rows, cols) = data.shape();
    debug_assert_eq!(rows, cals.len());
    match data {
        SegmentData::Real(m) => {
            let mut flat = Vec::with_capacity(rows * cols);
            for s in 0..cols {
                for r in 0..rows {
                    flat.push(m.get(r, s) / cals[r]);
                }
            }
            w.write_f32_buffer(kind::DATA_BUFFER, &flat)?;
        }
        SegmentData::Complex(m) => {
            if !*warned_complex {
                warn!("saving complex-valued data; real-only tooling will not read it");
                *warned_complex = true;
            }
            let mut flat = Vec::with_capacity(rows * cols);
            for s in 0..cols {
                for r in 0..rows {
                    let v = m.get(r, s) / cals[r];
                    flat.push((v.re, v.im));
                }
            }
            w.write_complex_buffer(kind::DATA_BUFFER, &flat)?;
        }
    }
    Ok(())
}

/// Restrict the metadata to the selected channels: channel table and
/// projection vectors keep only the picked coefficients, and the
/// compensation matrix keeps the picked rows and columns so the written
/// description stays square over its own channels.
fn subset_info(info: &RecordingInfo, picks: Option<&[usize]>) -> RecordingInfo {
    let Some(sel) = picks else {
        return info.clone();
    };

    let chs = sel.iter().map(|&i| info.chs[i].clone()).collect();
    let projs = info
        .projs
        .iter()
        .map(|p| Projection {
            name: p.name.clone(),
            data: sel.iter().map(|&i| p.data[i]).collect(),
            active: p.active,
        })
        .collect();
    let comp = info.comp.as_ref().map(|c| {
        let mut out = Matrix::zeros(sel.len(), sel.len());
        for (to_r, &from_r) in sel.iter().enumerate() {
            for (to_c, &from_c) in sel.iter().enumerate() {
                out.set(to_r, to_c, c.get(from_r, from_c));
            }
        }
        out
    });

    RecordingInfo {
        sfreq: info.sfreq,
        chs,
        projs,
        comp,
        comment: info.comment.clone(),
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(ca), Ok(cb)) => ca == cb,
        _ => false,
    }
}
