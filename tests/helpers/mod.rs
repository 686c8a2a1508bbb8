//! Test helpers: synthetic recordings written straight through the
//! container layer, so the reader is exercised against files it did not
//! produce itself.

#![allow(dead_code)]

use polyrec::container::tags::{block, kind, value_type};
use polyrec::container::TagWriter;
use polyrec::meta::{write_info, ChannelInfo, ChannelKind, RecordingInfo};
use std::path::Path;

/// Sampling rate used by most tests.
pub const SFREQ: f64 = 1000.0;

/// Install a test subscriber so read/write traces land in test output.
/// Safe to call from every test; only the first call wins.
pub fn init_logs() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// One item of a raw-data block.
pub enum RawItem {
    /// Channel-major f32 buffer: one inner vec per channel, equal lengths.
    Buffer(Vec<Vec<f64>>),
    /// Channel-major i16 buffer.
    BufferI16(Vec<Vec<i16>>),
    /// Skip marker, in units of the next buffer's length.
    Skip(i32),
}

/// Signal-channel metadata with unit calibration.
pub fn plain_info(nchan: usize) -> RecordingInfo {
    info_with_cals(&vec![(1.0, 1.0); nchan])
}

/// Signal-channel metadata with the given per-channel (range, cal).
pub fn info_with_cals(cals: &[(f64, f64)]) -> RecordingInfo {
    RecordingInfo {
        sfreq: SFREQ,
        chs: cals
            .iter()
            .enumerate()
            .map(|(i, &(range, cal))| ChannelInfo {
                name: format!("SIG {:03}", i + 1),
                kind: ChannelKind::Signal,
                range,
                cal,
            })
            .collect(),
        projs: Vec::new(),
        comp: None,
        comment: None,
    }
}

/// Write a full recording container with a raw-data block.
pub fn write_recording(
    path: &Path,
    info: &RecordingInfo,
    first_sample: Option<i32>,
    items: &[RawItem],
) {
    write_recording_in_block(path, info, block::RAW_DATA, first_sample, items);
}

/// Write a recording with the data block of the given kind.
pub fn write_recording_in_block(
    path: &Path,
    info: &RecordingInfo,
    data_block: i32,
    first_sample: Option<i32>,
    items: &[RawItem],
) {
    let mut w = TagWriter::create(path).unwrap();
    w.start_block(block::MEASUREMENT).unwrap();
    write_info(&mut w, info).unwrap();
    w.start_block(data_block).unwrap();
    if let Some(fs) = first_sample {
        w.write_i32(kind::FIRST_SAMPLE, fs).unwrap();
    }
    for item in items {
        match item {
            RawItem::Buffer(chans) => {
                let nsamp = chans[0].len();
                assert!(chans.iter().all(|c| c.len() == nsamp));
                let mut flat = Vec::with_capacity(nsamp * chans.len());
                for s in 0..nsamp {
                    for ch in chans {
                        flat.push(ch[s]);
                    }
                }
                w.write_f32_buffer(kind::DATA_BUFFER, &flat).unwrap();
            }
            RawItem::BufferI16(chans) => {
                let nsamp = chans[0].len();
                let mut payload = Vec::with_capacity(nsamp * chans.len() * 2);
                for s in 0..nsamp {
                    for ch in chans {
                        payload.extend_from_slice(&ch[s].to_be_bytes());
                    }
                }
                w.write_tag(kind::DATA_BUFFER, value_type::INT16, &payload)
                    .unwrap();
            }
            RawItem::Skip(n) => w.write_i32(kind::DATA_SKIP, *n).unwrap(),
        }
    }
    w.end_block(data_block).unwrap();
    w.end_block(block::MEASUREMENT).unwrap();
    w.finish().unwrap();
}

/// A ramp channel: `offset`, `offset + 1`, ...
pub fn ramp(nsamp: usize, offset: f64) -> Vec<f64> {
    (0..nsamp).map(|i| offset + i as f64).collect()
}

/// A sine channel at `freq` Hz sampled at [`SFREQ`].
pub fn sine(nsamp: usize, freq: f64, amp: f64) -> Vec<f64> {
    (0..nsamp)
        .map(|i| amp * (2.0 * std::f64::consts::PI * freq * i as f64 / SFREQ).sin())
        .collect()
}
