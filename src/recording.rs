//! The recording handle: open a container, hold its directory and
//! calibration, and serve reads, writes, and in-place processing.

use crate::directory::{build_directory, Directory};
use crate::error::{Error, Result};
use crate::proj::ProjectorCache;
use crate::segment::{self, CMatrix, SegmentData};
use crate::writer::{self, SaveOptions};
use memmap2::MmapMut;
use parking_lot::RwLock;
use polyrec_container::{self as container, tags::block, BlockNode, ContainerFile};
use polyrec_dsp::Complex64;
use polyrec_meta::pick::pick_types;
use polyrec_meta::{build_operator, ChannelKind, Matrix, Projection, RecordingInfo};
use rayon::prelude::*;
use std::collections::HashSet;
use std::ops::Range;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// How to materialize sample data at open time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Preload {
    /// Stream from disk on every read.
    #[default]
    None,
    /// Decode the full recording into memory.
    Memory,
    /// Decode into a memory-mapped scratch file at the given path.
    File(PathBuf),
}

/// Options for [`Recording::open`].
#[derive(Debug, Clone, Default)]
pub struct OpenOptions {
    allow_shielded: bool,
    preload: Preload,
    apply_projection: bool,
}

impl OpenOptions {
    /// Default options: no shielded data, no preload, no projection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Also accept data recorded with active shielding.
    pub fn allow_shielded(mut self, allow: bool) -> Self {
        self.allow_shielded = allow;
        self
    }

    /// Materialize sample data at open time.
    pub fn preload(mut self, preload: Preload) -> Self {
        self.preload = preload;
        self
    }

    /// Apply the projection operator on every read.
    pub fn apply_projection(mut self, apply: bool) -> Self {
        self.apply_projection = apply;
        self
    }
}

/// Materialized sample storage.
enum Storage {
    /// In-memory dense buffer.
    Mem(SegmentData),
    /// Memory-mapped scratch file, real-valued only.
    Mapped(MappedData),
}

/// Whether sample data has been materialized.
///
/// Several operations are only legal in one of the two states; the
/// explicit tag turns "forgot to preload" into [`Error::NotPreloaded`]
/// instead of quietly reading different data.
enum DataState {
    NotLoaded,
    Materialized(Storage),
}

/// Row-major f64 matrix backed by a memory-mapped scratch file.
struct MappedData {
    mmap: MmapMut,
    rows: usize,
    cols: usize,
}

impl MappedData {
    fn create(path: &Path, m: &Matrix) -> Result<Self> {
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len((m.rows() * m.cols() * 8) as u64)?;
        // SAFETY: the file was just created and sized by us and the
        // mapping is dropped before the handle closes; nothing else maps
        // this scratch path.
        let mmap = unsafe { MmapMut::map_mut(&file)? };
        let mut mapped = Self {
            mmap,
            rows: m.rows(),
            cols: m.cols(),
        };
        mapped.as_mut_slice().copy_from_slice(m.as_slice());
        Ok(mapped)
    }

    fn as_slice(&self) -> &[f64] {
        // SAFETY: the mapping is page-aligned (so f64-aligned), its
        // length is exactly rows * cols * 8, and every f64 bit pattern
        // is a valid value.
        unsafe {
            std::slice::from_raw_parts(self.mmap.as_ptr() as *const f64, self.rows * self.cols)
        }
    }

    fn as_mut_slice(&mut self) -> &mut [f64] {
        // SAFETY: as `as_slice`, and the `&mut self` receiver gives
        // exclusive access to the mapping.
        unsafe {
            std::slice::from_raw_parts_mut(
                self.mmap.as_mut_ptr() as *mut f64,
                self.rows * self.cols,
            )
        }
    }

    fn to_matrix(&self) -> Matrix {
        Matrix::from_vec(self.rows, self.cols, self.as_slice().to_vec())
    }
}

impl Storage {
    fn slice(&self, sel: &[usize], range: Range<usize>) -> SegmentData {
        match self {
            Storage::Mem(seg) => seg.submatrix(sel, range),
            Storage::Mapped(m) => {
                let mut out = Matrix::zeros(sel.len(), range.len());
                let src = m.as_slice();
                for (to, &ch) in sel.iter().enumerate() {
                    let row = &src[ch * m.cols..(ch + 1) * m.cols];
                    out.row_mut(to).copy_from_slice(&row[range.clone()]);
                }
                SegmentData::Real(out)
            }
        }
    }

    fn n_times(&self) -> usize {
        match self {
            Storage::Mem(seg) => seg.shape().1,
            Storage::Mapped(m) => m.cols,
        }
    }

    /// Flat real rows plus the row stride. Fails on complex data.
    fn real_rows_mut(&mut self) -> Result<(&mut [f64], usize)> {
        match self {
            Storage::Mem(SegmentData::Real(m)) => {
                let cols = m.cols();
                Ok((m.as_mut_slice(), cols))
            }
            Storage::Mapped(m) => {
                let cols = m.cols;
                Ok((m.as_mut_slice(), cols))
            }
            Storage::Mem(SegmentData::Complex(_)) => Err(Error::Dsp(
                polyrec_dsp::Error::InvalidParameter(
                    "cannot apply a real channel function to complex data".into(),
                ),
            )),
        }
    }

    fn to_real_matrix(&self) -> Result<Matrix> {
        match self {
            Storage::Mem(SegmentData::Real(m)) => Ok(m.clone()),
            Storage::Mapped(m) => Ok(m.to_matrix()),
            Storage::Mem(SegmentData::Complex(_)) => Err(Error::Dsp(
                polyrec_dsp::Error::InvalidParameter(
                    "data already holds an analytic signal".into(),
                ),
            )),
        }
    }

    fn premultiply(&mut self, op: &Matrix) {
        match self {
            Storage::Mem(SegmentData::Real(m)) => *m = op.matmul(m),
            Storage::Mem(SegmentData::Complex(c)) => *c = c.premultiply(op),
            Storage::Mapped(md) => {
                let out = op.matmul(&md.to_matrix());
                md.as_mut_slice().copy_from_slice(out.as_slice());
            }
        }
    }

    fn write_block(&mut self, sel: &[usize], start: usize, values: &SegmentData) -> Result<()> {
        let (_, vc) = values.shape();
        match (self, values) {
            (Storage::Mem(SegmentData::Real(m)), SegmentData::Real(v)) => {
                for (from, &ch) in sel.iter().enumerate() {
                    m.row_mut(ch)[start..start + vc].copy_from_slice(v.row(from));
                }
                Ok(())
            }
            (Storage::Mapped(m), SegmentData::Real(v)) => {
                let cols = m.cols;
                let data = m.as_mut_slice();
                for (from, &ch) in sel.iter().enumerate() {
                    data[ch * cols + start..ch * cols + start + vc]
                        .copy_from_slice(v.row(from));
                }
                Ok(())
            }
            (Storage::Mem(SegmentData::Complex(m)), values) => {
                for (from, &ch) in sel.iter().enumerate() {
                    let dst = &mut m.row_mut(ch)[start..start + vc];
                    match values {
                        SegmentData::Complex(v) => dst.copy_from_slice(v.row(from)),
                        SegmentData::Real(v) => {
                            for (d, &s) in dst.iter_mut().zip(v.row(from)) {
                                *d = Complex64::new(s, 0.0);
                            }
                        }
                    }
                }
                Ok(())
            }
            // Complex values cannot land in real-valued storage.
            (_, values) => Err(Error::BufferShapeMismatch {
                expected: "real values".into(),
                got: values.describe(),
            }),
        }
    }
}

/// An open multichannel recording.
///
/// Created by [`Recording::open`]; the directory and calibration vector
/// are fixed from then on. Reads stream from disk until the data is
/// materialized, after which the dense buffer is authoritative.
pub struct Recording {
    file: ContainerFile,
    info: RecordingInfo,
    directory: Directory,
    cals: Vec<f64>,
    proj_on: bool,
    projector: RwLock<ProjectorCache>,
    data: DataState,
}

impl Recording {
    /// Open a recording container.
    ///
    /// Fails with [`Error::NoDataFound`] when the container has no
    /// eligible data block; any metadata or directory error aborts the
    /// open with no handle returned.
    pub fn open<P: AsRef<Path>>(path: P, options: OpenOptions) -> Result<Self> {
        let (mut file, tree) = container::open(path.as_ref())?;
        let info = polyrec_meta::read_info(&mut file, &tree)?;

        let raw_block =
            locate_data_block(&tree, options.allow_shielded).ok_or(Error::NoDataFound)?;
        let directory = build_directory(&mut file, &raw_block.entries, info.nchan())?;
        let cals = info.calibration();

        let mut rec = Recording {
            file,
            info,
            directory,
            cals,
            proj_on: options.apply_projection,
            projector: RwLock::new(ProjectorCache::new()),
            data: DataState::NotLoaded,
        };
        rec.ensure_projector();

        debug!(
            path = %rec.file.path().display(),
            nchan = rec.info.nchan(),
            first_samp = rec.directory.first_samp,
            last_samp = rec.directory.last_samp,
            secs = rec.duration(),
            "opened recording"
        );

        match options.preload {
            Preload::None => {}
            Preload::Memory => rec.load_data()?,
            Preload::File(scratch) => rec.load_data_mapped(&scratch)?,
        }
        Ok(rec)
    }

    /// Measurement description.
    pub fn info(&self) -> &RecordingInfo {
        &self.info
    }

    /// Channel names in recording order.
    pub fn ch_names(&self) -> Vec<&str> {
        self.info.ch_names()
    }

    /// Channel count.
    pub fn n_channels(&self) -> usize {
        self.info.nchan()
    }

    /// Total sample count.
    pub fn n_times(&self) -> usize {
        self.directory.n_samples()
    }

    /// Absolute index of the first sample.
    pub fn first_samp(&self) -> i64 {
        self.directory.first_samp
    }

    /// Absolute index of the last sample.
    pub fn last_samp(&self) -> i64 {
        self.directory.last_samp
    }

    /// Recording length in seconds.
    pub fn duration(&self) -> f64 {
        self.n_times() as f64 / self.info.sfreq
    }

    /// Source path.
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Whether sample data has been materialized.
    pub fn is_materialized(&self) -> bool {
        matches!(self.data, DataState::Materialized(_))
    }

    /// Whether reads apply the projection operator.
    pub fn proj_enabled(&self) -> bool {
        self.proj_on
    }

    /// Convert times in seconds to sample indices.
    pub fn time_to_index(&self, times: &[f64]) -> Vec<i64> {
        times
            .iter()
            .map(|t| (t * self.info.sfreq) as i64)
            .collect()
    }

    /// Read a segment: selected channels over `[start, stop)` samples
    /// relative to the recording start. `stop` of `None` reads to the
    /// end; `picks` of `None` selects every channel.
    ///
    /// Returns the calibrated (and, when enabled, compensated and
    /// projected) data plus the matching time vector.
    ///
    /// Panics if a pick is out of channel range.
    pub fn get(
        &mut self,
        picks: Option<&[usize]>,
        start: i64,
        stop: Option<i64>,
    ) -> Result<(SegmentData, Vec<f64>)> {
        let sel = self.resolve_selection(picks)?;

        if self.is_materialized() {
            if self.ensure_projector() {
                return Err(Error::InPlaceMutationForbidden);
            }
            return self.slice_materialized(&sel, start, stop);
        }

        self.ensure_projector();
        let mult = self.composed_transform();
        segment::read_segment(
            &mut self.file,
            &self.directory,
            self.info.nchan(),
            &self.cals,
            mult.as_ref(),
            &sel,
            start,
            stop,
            self.info.sfreq,
        )
    }

    /// Read a segment into a caller-supplied destination.
    ///
    /// The destination must already have one row per selected channel
    /// and `stop - start` columns; a real destination cannot receive
    /// complex data. Returns the time vector.
    pub fn read_into(
        &mut self,
        picks: Option<&[usize]>,
        start: i64,
        stop: Option<i64>,
        dest: &mut SegmentData,
    ) -> Result<Vec<f64>> {
        let (data, times) = self.get(picks, start, stop)?;
        if dest.shape() != data.shape() || (data.is_complex() && !dest.is_complex()) {
            return Err(Error::BufferShapeMismatch {
                expected: data.describe(),
                got: dest.describe(),
            });
        }
        let cols = data.shape().1;
        dest.copy_cols_from(&data, 0, 0, cols);
        Ok(times)
    }

    /// Overwrite a block of the materialized buffer: selected channels
    /// starting at sample `start`.
    pub fn set(
        &mut self,
        picks: Option<&[usize]>,
        start: i64,
        values: &SegmentData,
    ) -> Result<()> {
        let sel = self.resolve_selection(picks)?;
        let (vr, vc) = values.shape();
        let n_times = self.n_times();

        let storage = match &mut self.data {
            DataState::Materialized(s) => s,
            DataState::NotLoaded => return Err(Error::NotPreloaded),
        };

        if vr != sel.len() {
            return Err(Error::BufferShapeMismatch {
                expected: format!("{} rows", sel.len()),
                got: values.describe(),
            });
        }
        if start < 0 || start as usize + vc > n_times {
            return Err(Error::BufferShapeMismatch {
                expected: format!("a window within 0..{n_times}"),
                got: format!("{}..{}", start, start + vc as i64),
            });
        }
        storage.write_block(&sel, start as usize, values)
    }

    /// Materialize the full recording into memory.
    ///
    /// Re-reads from disk when called again, restoring the on-disk
    /// (transformed) state.
    pub fn load_data(&mut self) -> Result<()> {
        let seg = self.read_full()?;
        self.data = DataState::Materialized(Storage::Mem(seg));
        debug!("materialized recording in memory");
        Ok(())
    }

    /// Materialize the full recording into a memory-mapped scratch file.
    ///
    /// Complex recordings fall back to plain memory; the scratch format
    /// holds real samples only.
    pub fn load_data_mapped(&mut self, scratch: &Path) -> Result<()> {
        let seg = self.read_full()?;
        self.data = match seg {
            SegmentData::Real(m) => {
                let mapped = MappedData::create(scratch, &m)?;
                debug!(scratch = %scratch.display(), "materialized recording to scratch file");
                DataState::Materialized(Storage::Mapped(mapped))
            }
            SegmentData::Complex(_) => {
                warn!("complex data cannot be memory-mapped; keeping it in memory");
                DataState::Materialized(Storage::Mem(seg))
            }
        };
        Ok(())
    }

    /// Enable the projection operator for all subsequent reads; if data
    /// is materialized the operator is multiplied into the buffer in
    /// place.
    pub fn apply_projection(&mut self) -> Result<()> {
        self.proj_on = true;
        self.ensure_projector();
        if let DataState::Materialized(storage) = &mut self.data {
            let guard = self.projector.read();
            if let Some(op) = guard.operator() {
                storage.premultiply(op);
            }
        }
        Ok(())
    }

    /// Add projection vectors, or replace the existing set.
    ///
    /// Invalidates the operator cache; if data was already materialized
    /// under the old projection state, the next read fails with
    /// [`Error::InPlaceMutationForbidden`] instead of returning stale
    /// results.
    pub fn add_projections(&mut self, projs: Vec<Projection>, remove_existing: bool) {
        if remove_existing {
            self.info.projs = projs;
        } else {
            self.info.projs.extend(projs);
        }
        self.projector.write().invalidate();
    }

    /// Apply a sample-count-preserving function to each selected
    /// channel of the materialized buffer, in place.
    ///
    /// With `parallel` the channels fan out over the worker pool; each
    /// worker owns a disjoint row, and a failing channel does not roll
    /// back channels that already finished.
    pub fn apply_function<F>(
        &mut self,
        f: F,
        picks: Option<&[usize]>,
        parallel: bool,
    ) -> Result<()>
    where
        F: Fn(&[f64]) -> Result<Vec<f64>> + Sync,
    {
        let sel = self.resolve_selection(picks)?;
        let storage = match &mut self.data {
            DataState::Materialized(s) => s,
            DataState::NotLoaded => return Err(Error::NotPreloaded),
        };
        let (data, cols) = storage.real_rows_mut()?;
        if cols == 0 {
            return Ok(());
        }
        let pick_set: HashSet<usize> = sel.iter().copied().collect();

        if parallel {
            let results: Vec<Result<()>> = data
                .par_chunks_mut(cols)
                .enumerate()
                .filter(|(i, _)| pick_set.contains(i))
                .map(|(_, row)| process_row(row, &f))
                .collect();
            for r in results {
                r?;
            }
        } else {
            for (i, row) in data.chunks_mut(cols).enumerate() {
                if pick_set.contains(&i) {
                    process_row(row, &f)?;
                }
            }
        }
        Ok(())
    }

    /// Compute the analytic signal or its envelope for the selected
    /// channels of the materialized buffer.
    ///
    /// With `envelope` the buffer stays real and holds the envelope;
    /// without it the whole buffer converts to complex and the selected
    /// channels hold their analytic signal.
    pub fn apply_hilbert(
        &mut self,
        picks: Option<&[usize]>,
        envelope: bool,
        parallel: bool,
    ) -> Result<()> {
        if envelope {
            return self.apply_function(|x| Ok(polyrec_dsp::envelope(x)), picks, parallel);
        }

        let sel = self.resolve_selection(picks)?;
        let storage = match &self.data {
            DataState::Materialized(s) => s,
            DataState::NotLoaded => return Err(Error::NotPreloaded),
        };
        let src = storage.to_real_matrix()?;
        let (rows, cols) = src.shape();
        let pick_set: HashSet<usize> = sel.iter().copied().collect();

        let mut out = CMatrix::zeros(rows, cols);
        for r in 0..rows {
            if !pick_set.contains(&r) {
                for (c, &v) in src.row(r).iter().enumerate() {
                    out.set(r, c, Complex64::new(v, 0.0));
                }
            }
        }
        let analytic: Vec<(usize, Vec<Complex64>)> = if parallel {
            sel.par_iter()
                .map(|&r| (r, polyrec_dsp::hilbert(src.row(r))))
                .collect()
        } else {
            sel.iter()
                .map(|&r| (r, polyrec_dsp::hilbert(src.row(r))))
                .collect()
        };
        for (r, vals) in analytic {
            out.row_mut(r).copy_from_slice(&vals);
        }

        self.data = DataState::Materialized(Storage::Mem(SegmentData::Complex(out)));
        Ok(())
    }

    /// Filter the selected channels of the materialized buffer in
    /// place. `l_freq` of `None` (or 0) low-passes only, `h_freq` of
    /// `None` (or above Nyquist) high-passes only, both band-pass.
    /// Default picks are the signal channels.
    pub fn filter(
        &mut self,
        l_freq: Option<f64>,
        h_freq: Option<f64>,
        picks: Option<&[usize]>,
        trans: f64,
        parallel: bool,
    ) -> Result<()> {
        let sfreq = self.info.sfreq;
        let l = l_freq.filter(|&f| f > 0.0);
        let h = h_freq.filter(|&f| f < sfreq / 2.0);

        let default_picks;
        let picks = match picks {
            Some(p) => Some(p),
            None => {
                default_picks = pick_types(&self.info, &[ChannelKind::Signal], &[], &[]);
                if default_picks.is_empty() {
                    return Ok(());
                }
                Some(default_picks.as_slice())
            }
        };

        match (l, h) {
            (None, Some(h)) => self.apply_function(
                move |x| polyrec_dsp::low_pass(x, sfreq, h, trans).map_err(Error::from),
                picks,
                parallel,
            ),
            (Some(l), None) => self.apply_function(
                move |x| polyrec_dsp::high_pass(x, sfreq, l, trans).map_err(Error::from),
                picks,
                parallel,
            ),
            (Some(l), Some(h)) => self.apply_function(
                move |x| polyrec_dsp::band_pass(x, sfreq, l, h, trans).map_err(Error::from),
                picks,
                parallel,
            ),
            (None, None) => Ok(()),
        }
    }

    /// Save the recording (or a channel/time subset of it) to a new
    /// container. See [`SaveOptions`].
    pub fn save<P: AsRef<Path>>(&mut self, path: P, options: SaveOptions) -> Result<()> {
        writer::save_recording(self, path.as_ref(), &options)
    }

    fn read_full(&mut self) -> Result<SegmentData> {
        self.ensure_projector();
        let mult = self.composed_transform();
        let sel: Vec<usize> = (0..self.info.nchan()).collect();
        let (seg, _times) = segment::read_segment(
            &mut self.file,
            &self.directory,
            self.info.nchan(),
            &self.cals,
            mult.as_ref(),
            &sel,
            0,
            None,
            self.info.sfreq,
        )?;
        Ok(seg)
    }

    /// Rebuild the projection operator if the projection list changed.
    /// Returns whether a rebuild happened.
    fn ensure_projector(&self) -> bool {
        let nchan = self.info.nchan();
        self.projector
            .write()
            .ensure_with(&self.info.projs, |projs| build_operator(projs, nchan))
    }

    /// Compose projection, compensation, and calibration into one
    /// matrix, calibration closest to the raw samples. `None` when no
    /// matrix factor is active; element-wise calibration then suffices.
    fn composed_transform(&self) -> Option<Matrix> {
        let guard = self.projector.read();
        let projector = if self.proj_on { guard.operator() } else { None };
        let comp = self.info.comp.as_ref();
        if projector.is_none() && comp.is_none() {
            return None;
        }
        let mut mult = Matrix::from_diag(&self.cals);
        if let Some(c) = comp {
            mult = c.matmul(&mult);
        }
        if let Some(p) = projector {
            mult = p.matmul(&mult);
        }
        Some(mult)
    }

    fn resolve_selection(&self, picks: Option<&[usize]>) -> Result<Vec<usize>> {
        match picks {
            Some(p) if p.is_empty() => Err(Error::EmptySelection),
            Some(p) => {
                for &ch in p {
                    assert!(
                        ch < self.info.nchan(),
                        "channel index {ch} out of range for {} channels",
                        self.info.nchan()
                    );
                }
                Ok(p.to_vec())
            }
            None => {
                if self.info.nchan() == 0 {
                    Err(Error::EmptySelection)
                } else {
                    Ok((0..self.info.nchan()).collect())
                }
            }
        }
    }

    fn slice_materialized(
        &self,
        sel: &[usize],
        start: i64,
        stop: Option<i64>,
    ) -> Result<(SegmentData, Vec<f64>)> {
        let n_times = self.n_times() as i64;
        let stop = stop.unwrap_or(n_times).min(n_times);
        if start < 0 || start >= stop {
            return Err(Error::NoDataFound);
        }
        let storage = match &self.data {
            DataState::Materialized(s) => s,
            DataState::NotLoaded => unreachable!("checked by caller"),
        };
        let data = storage.slice(sel, start as usize..stop as usize);
        let times = segment::time_vector(
            self.directory.first_samp,
            self.directory.first_samp + start,
            self.directory.first_samp + stop,
            self.info.sfreq,
        );
        Ok((data, times))
    }
}

fn process_row<F>(row: &mut [f64], f: &F) -> Result<()>
where
    F: Fn(&[f64]) -> Result<Vec<f64>>,
{
    let out = f(row)?;
    if out.len() != row.len() {
        return Err(Error::Dsp(polyrec_dsp::Error::InvalidParameter(format!(
            "channel function changed sample count from {} to {}",
            row.len(),
            out.len()
        ))));
    }
    row.copy_from_slice(&out);
    Ok(())
}

/// Pick the data block: raw, then legacy continuous, then (only on
/// request) shielded raw data.
fn locate_data_block(tree: &BlockNode, allow_shielded: bool) -> Option<&BlockNode> {
    for kind in [block::RAW_DATA, block::CONTINUOUS_DATA] {
        if let Some(node) = tree.find_blocks(kind).into_iter().next() {
            return Some(node);
        }
    }
    if allow_shielded {
        tree.find_blocks(block::SHIELDED_RAW_DATA).into_iter().next()
    } else {
        None
    }
}
