//! Segment reconstruction: map a sample window and channel selection
//! onto the directory, decode only the overlapping buffers, apply the
//! composed linear transform, and assemble a dense matrix.

use crate::directory::{Directory, EntryBody, SampleEncoding};
use crate::error::{Error, Result};
use polyrec_container::ContainerFile;
use polyrec_dsp::Complex64;
use polyrec_meta::Matrix;
use tracing::debug;

/// Dense row-major matrix of complex samples.
///
/// Mirrors [`Matrix`] for the complex-encoded path; only the operations
/// the segment pipeline needs are provided.
#[derive(Debug, Clone, PartialEq)]
pub struct CMatrix {
    rows: usize,
    cols: usize,
    data: Vec<Complex64>,
}

impl CMatrix {
    /// All-zero complex matrix.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![Complex64::new(0.0, 0.0); rows * cols],
        }
    }

    /// Widen a real matrix to complex.
    pub fn from_real(m: &Matrix) -> Self {
        Self {
            rows: m.rows(),
            cols: m.cols(),
            data: m.as_slice().iter().map(|&v| Complex64::new(v, 0.0)).collect(),
        }
    }

    /// Row count.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Column count.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Value at `(r, c)`.
    pub fn get(&self, r: usize, c: usize) -> Complex64 {
        self.data[r * self.cols + c]
    }

    /// Set value at `(r, c)`.
    pub fn set(&mut self, r: usize, c: usize, v: Complex64) {
        self.data[r * self.cols + c] = v;
    }

    /// One row as a slice.
    pub fn row(&self, r: usize) -> &[Complex64] {
        &self.data[r * self.cols..(r + 1) * self.cols]
    }

    /// One row as a mutable slice.
    pub fn row_mut(&mut self, r: usize) -> &mut [Complex64] {
        &mut self.data[r * self.cols..(r + 1) * self.cols]
    }

    /// New matrix containing the given rows restricted to a column range.
    pub fn submatrix(&self, idx: &[usize], cols: std::ops::Range<usize>) -> CMatrix {
        let mut out = CMatrix::zeros(idx.len(), cols.len());
        for (to, &from) in idx.iter().enumerate() {
            out.row_mut(to)
                .copy_from_slice(&self.row(from)[cols.start..cols.end]);
        }
        out
    }

    /// Product of a real matrix and this complex matrix.
    pub fn premultiply(&self, lhs: &Matrix) -> CMatrix {
        assert_eq!(
            lhs.cols(),
            self.rows,
            "transform dimension mismatch: {}x{} * {}x{}",
            lhs.rows(),
            lhs.cols(),
            self.rows,
            self.cols
        );
        let mut out = CMatrix::zeros(lhs.rows(), self.cols);
        for i in 0..lhs.rows() {
            for k in 0..self.rows {
                let a = lhs.get(i, k);
                if a == 0.0 {
                    continue;
                }
                let src = self.row(k);
                let dst = out.row_mut(i);
                for (o, &b) in dst.iter_mut().zip(src) {
                    *o += b * a;
                }
            }
        }
        out
    }
}

/// A reconstructed block of samples, channels by time.
///
/// Whether a segment is real or complex is decided lazily by the first
/// decoded buffer; virtual skip runs never force a numeric kind.
#[derive(Debug, Clone, PartialEq)]
pub enum SegmentData {
    /// Real-valued samples.
    Real(Matrix),
    /// Complex-valued samples.
    Complex(CMatrix),
}

impl SegmentData {
    /// `(channels, samples)`.
    pub fn shape(&self) -> (usize, usize) {
        match self {
            SegmentData::Real(m) => m.shape(),
            SegmentData::Complex(m) => (m.rows(), m.cols()),
        }
    }

    /// Whether the samples are complex-valued.
    pub fn is_complex(&self) -> bool {
        matches!(self, SegmentData::Complex(_))
    }

    /// Shape and kind for error messages, e.g. `"3x100 real"`.
    pub fn describe(&self) -> String {
        let (r, c) = self.shape();
        let kind = if self.is_complex() { "complex" } else { "real" };
        format!("{r}x{c} {kind}")
    }

    /// Real view, if real.
    pub fn as_real(&self) -> Option<&Matrix> {
        match self {
            SegmentData::Real(m) => Some(m),
            SegmentData::Complex(_) => None,
        }
    }

    /// Complex view, if complex.
    pub fn as_complex(&self) -> Option<&CMatrix> {
        match self {
            SegmentData::Complex(m) => Some(m),
            SegmentData::Real(_) => None,
        }
    }

    /// New segment containing the given rows restricted to a column range.
    pub fn submatrix(&self, idx: &[usize], cols: std::ops::Range<usize>) -> SegmentData {
        match self {
            SegmentData::Real(m) => SegmentData::Real(m.submatrix(idx, cols)),
            SegmentData::Complex(m) => SegmentData::Complex(m.submatrix(idx, cols)),
        }
    }

    fn promote_to_complex(&mut self) {
        if let SegmentData::Real(m) = &*self {
            let widened = CMatrix::from_real(m);
            *self = SegmentData::Complex(widened);
        }
    }

    fn zero_cols(&mut self, start: usize, len: usize) {
        match self {
            SegmentData::Real(m) => {
                for r in 0..m.rows() {
                    m.row_mut(r)[start..start + len].fill(0.0);
                }
            }
            SegmentData::Complex(m) => {
                for r in 0..m.rows() {
                    m.row_mut(r)[start..start + len].fill(Complex64::new(0.0, 0.0));
                }
            }
        }
    }

    /// Copy columns `src_start..src_start+len` of `src` into columns
    /// starting at `dst_start`. Real sources widen into a complex
    /// destination; the caller promotes before copying a complex source
    /// into a real destination.
    pub(crate) fn copy_cols_from(
        &mut self,
        src: &SegmentData,
        src_start: usize,
        dst_start: usize,
        len: usize,
    ) {
        match (self, src) {
            (SegmentData::Real(dst), SegmentData::Real(src)) => {
                for r in 0..dst.rows() {
                    let from = &src.row(r)[src_start..src_start + len];
                    dst.row_mut(r)[dst_start..dst_start + len].copy_from_slice(from);
                }
            }
            (SegmentData::Complex(dst), SegmentData::Complex(src)) => {
                for r in 0..dst.rows() {
                    let from = &src.row(r)[src_start..src_start + len];
                    dst.row_mut(r)[dst_start..dst_start + len].copy_from_slice(from);
                }
            }
            (SegmentData::Complex(dst), SegmentData::Real(src)) => {
                for r in 0..dst.rows() {
                    let from = &src.row(r)[src_start..src_start + len];
                    for (d, &s) in dst.row_mut(r)[dst_start..dst_start + len]
                        .iter_mut()
                        .zip(from)
                    {
                        *d = Complex64::new(s, 0.0);
                    }
                }
            }
            (SegmentData::Real(_), SegmentData::Complex(_)) => {
                unreachable!("destination is promoted before complex copies")
            }
        }
    }
}

/// Decode one buffer payload into a `(nchan, nsamp)` block.
///
/// The payload is sample-major: all channels of sample 0, then all
/// channels of sample 1, and so on; decoding transposes to channel-major.
fn decode_payload(
    payload: &[u8],
    encoding: SampleEncoding,
    nchan: usize,
    nsamp: usize,
) -> Result<SegmentData> {
    let needed = nsamp * nchan * encoding.bytes_per_sample();
    if payload.len() < needed {
        return Err(polyrec_container::Error::Malformed(format!(
            "data buffer holds {} bytes, needs {needed}",
            payload.len()
        ))
        .into());
    }

    if encoding.is_complex() {
        let mut out = CMatrix::zeros(nchan, nsamp);
        for s in 0..nsamp {
            for c in 0..nchan {
                let off = (s * nchan + c) * 8;
                let re = f32::from_be_bytes(payload[off..off + 4].try_into().unwrap());
                let im = f32::from_be_bytes(payload[off + 4..off + 8].try_into().unwrap());
                out.set(c, s, Complex64::new(re as f64, im as f64));
            }
        }
        return Ok(SegmentData::Complex(out));
    }

    let mut out = Matrix::zeros(nchan, nsamp);
    let bps = encoding.bytes_per_sample();
    for s in 0..nsamp {
        for c in 0..nchan {
            let off = (s * nchan + c) * bps;
            let v = match encoding {
                SampleEncoding::PackedInt16 | SampleEncoding::Int16 => {
                    i16::from_be_bytes(payload[off..off + 2].try_into().unwrap()) as f64
                }
                SampleEncoding::Int32 => {
                    i32::from_be_bytes(payload[off..off + 4].try_into().unwrap()) as f64
                }
                SampleEncoding::Float32 => {
                    f32::from_be_bytes(payload[off..off + 4].try_into().unwrap()) as f64
                }
                SampleEncoding::ComplexFloat => unreachable!("handled above"),
            };
            out.set(c, s, v);
        }
    }
    Ok(SegmentData::Real(out))
}

/// Apply the composed transform and channel selection to one decoded
/// buffer.
///
/// With a transform present the full-size multiply happens first and the
/// selection picks rows of the result; with no transform the selection
/// is applied directly with element-wise calibration.
fn transform_block(
    block: SegmentData,
    mult: Option<&Matrix>,
    cals: &[f64],
    sel: &[usize],
) -> SegmentData {
    match mult {
        Some(m) => match block {
            SegmentData::Real(d) => SegmentData::Real(m.matmul(&d).select_rows(sel)),
            SegmentData::Complex(d) => {
                let cols = d.cols();
                SegmentData::Complex(d.premultiply(m).submatrix(sel, 0..cols))
            }
        },
        None => match block {
            SegmentData::Real(d) => {
                let mut picked = d.select_rows(sel);
                for (r, &ch) in sel.iter().enumerate() {
                    let cal = cals[ch];
                    for v in picked.row_mut(r) {
                        *v *= cal;
                    }
                }
                SegmentData::Real(picked)
            }
            SegmentData::Complex(d) => {
                let cols = d.cols();
                let mut picked = d.submatrix(sel, 0..cols);
                for (r, &ch) in sel.iter().enumerate() {
                    let cal = cals[ch];
                    for v in picked.row_mut(r) {
                        *v *= cal;
                    }
                }
                SegmentData::Complex(picked)
            }
        },
    }
}

/// Read one segment of the recording.
///
/// `start`/`stop` are relative to the recording's first sample; `stop`
/// of `None` means the end of the recording. The returned matrix has one
/// row per selected channel and `stop - start` columns, fully populated;
/// the time vector gives each sample's offset from the recording start
/// in seconds.
///
/// Panics if a selection index is out of channel range; selection
/// validity is the caller's contract, checked at the public API.
#[allow(clippy::too_many_arguments)]
pub(crate) fn read_segment(
    file: &mut ContainerFile,
    dir: &Directory,
    nchan: usize,
    cals: &[f64],
    mult: Option<&Matrix>,
    sel: &[usize],
    start: i64,
    stop: Option<i64>,
    sfreq: f64,
) -> Result<(SegmentData, Vec<f64>)> {
    if sel.is_empty() {
        return Err(Error::EmptySelection);
    }

    let stop = stop.unwrap_or(dir.last_samp + 1 - dir.first_samp);
    let start_abs = start + dir.first_samp;
    let stop_abs = (stop + dir.first_samp).min(dir.last_samp + 1);

    if start < 0 || start_abs >= stop_abs {
        return Err(Error::NoDataFound);
    }

    let n_times = (stop_abs - start_abs) as usize;
    let n_sel = sel.len();
    debug!(
        start = start_abs,
        stop = stop_abs,
        n_sel,
        "reading segment"
    );

    let mut dest: Option<SegmentData> = None;
    let mut filled = 0usize;

    for entry in &dir.entries {
        if entry.last < start_abs {
            continue;
        }

        let decoded = match entry.body {
            EntryBody::Skip => None,
            EntryBody::Buffer { pos, encoding } => {
                let tag = file.read_tag(pos)?;
                let block = decode_payload(&tag.data, encoding, nchan, entry.nsamp)?;
                Some(transform_block(block, mult, cals, sel))
            }
        };

        // The picking logic distinguishes four overlap cases between the
        // entry's [first, last] and the window [start, stop - 1].
        let nsamp = entry.nsamp as i64;
        let (first_pick, last_pick) = if stop_abs - 1 > entry.last && start_abs < entry.first {
            // Whole buffer.
            (0, nsamp)
        } else if start_abs >= entry.first {
            let fp = start_abs - entry.first;
            if stop_abs - 1 <= entry.last {
                // A slice from the middle.
                (fp, nsamp + stop_abs - entry.last - 1)
            } else {
                // From the middle to the end.
                (fp, nsamp)
            }
        } else {
            // From the beginning to the middle.
            (0, stop_abs - entry.first)
        };

        let picksamp = (last_pick - first_pick).max(0) as usize;
        if picksamp > 0 {
            match decoded {
                Some(block) => {
                    let dst = dest.get_or_insert_with(|| {
                        if block.is_complex() {
                            SegmentData::Complex(CMatrix::zeros(n_sel, n_times))
                        } else {
                            SegmentData::Real(Matrix::zeros(n_sel, n_times))
                        }
                    });
                    if block.is_complex() && !dst.is_complex() {
                        dst.promote_to_complex();
                    }
                    dst.copy_cols_from(&block, first_pick as usize, filled, picksamp);
                }
                None => {
                    // Skip runs are zeros; only matters when the
                    // destination was already allocated.
                    if let Some(dst) = dest.as_mut() {
                        dst.zero_cols(filled, picksamp);
                    }
                }
            }
            filled += picksamp;
        }

        if entry.last >= stop_abs - 1 {
            break;
        }
    }

    if filled != n_times {
        // The directory invariant guarantees full coverage; reaching
        // here means the container lied about buffer sizes.
        return Err(polyrec_container::Error::Malformed(format!(
            "directory covered {filled} of {n_times} requested samples"
        ))
        .into());
    }

    let dest =
        dest.unwrap_or_else(|| SegmentData::Real(Matrix::zeros(n_sel, n_times)));
    let times = time_vector(dir.first_samp, start_abs, stop_abs, sfreq);
    Ok((dest, times))
}

/// Seconds from the recording start for each sample in `[start, stop)`.
pub(crate) fn time_vector(first_samp: i64, start: i64, stop: i64, sfreq: f64) -> Vec<f64> {
    (start..stop)
        .map(|k| (k - first_samp) as f64 / sfreq)
        .collect()
}
