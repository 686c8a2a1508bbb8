//! Recording handle integration tests: open, segment reads, skips,
//! calibration, preload states, and the projection workflow.

mod helpers;

use approx::assert_abs_diff_eq;
use helpers::*;
use polyrec::container::tags::block;
use polyrec::prelude::*;
use polyrec::Error;

fn open_plain(path: &std::path::Path) -> Recording {
    Recording::open(path, OpenOptions::new()).unwrap()
}

#[test]
fn test_open_reports_sample_range() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("range.prc");
    write_recording(
        &path,
        &plain_info(2),
        Some(500),
        &[RawItem::Buffer(vec![ramp(100, 0.0), ramp(100, 1000.0)])],
    );

    let rec = open_plain(&path);
    assert_eq!(rec.n_channels(), 2);
    assert_eq!(rec.n_times(), 100);
    assert_eq!(rec.first_samp(), 500);
    assert_eq!(rec.last_samp(), 599);
    assert_abs_diff_eq!(rec.duration(), 0.1);
    assert_eq!(rec.ch_names(), vec!["SIG 001", "SIG 002"]);
}

#[test]
fn test_calibration_scales_every_sample() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cal.prc");
    let raw = vec![1.0, -2.0, 4.0, 0.5];
    write_recording(
        &path,
        &info_with_cals(&[(0.5, 2e-3)]),
        None,
        &[RawItem::Buffer(vec![raw.clone()])],
    );

    let mut rec = open_plain(&path);
    let (data, _) = rec.get(None, 0, None).unwrap();
    let m = data.as_real().unwrap();
    for (s, &r) in raw.iter().enumerate() {
        assert_abs_diff_eq!(m.get(0, s), r * 0.5 * 2e-3, epsilon = 1e-9);
    }
}

#[test]
fn test_partial_overlap_picking_across_buffers() {
    // Three 100-sample buffers starting at sample 0; reading [50, 150)
    // must splice entry 0's tail onto entry 1's head.
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("overlap.prc");
    write_recording(
        &path,
        &plain_info(1),
        None,
        &[
            RawItem::Buffer(vec![ramp(100, 0.0)]),
            RawItem::Buffer(vec![ramp(100, 100.0)]),
            RawItem::Buffer(vec![ramp(100, 200.0)]),
        ],
    );

    let mut rec = open_plain(&path);
    let (data, times) = rec.get(None, 50, Some(150)).unwrap();
    let m = data.as_real().unwrap();
    assert_eq!(m.shape(), (1, 100));
    for s in 0..100 {
        assert_abs_diff_eq!(m.get(0, s), (50 + s) as f64, epsilon = 1e-9);
    }
    assert_abs_diff_eq!(times[0], 0.050);
    assert_abs_diff_eq!(times[99], 0.149);
}

#[test]
fn test_single_buffer_middle_slice() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("middle.prc");
    write_recording(
        &path,
        &plain_info(1),
        None,
        &[RawItem::Buffer(vec![ramp(100, 0.0)])],
    );

    let mut rec = open_plain(&path);
    let (data, _) = rec.get(None, 20, Some(30)).unwrap();
    let m = data.as_real().unwrap();
    assert_eq!(m.shape(), (1, 10));
    assert_abs_diff_eq!(m.get(0, 0), 20.0);
    assert_abs_diff_eq!(m.get(0, 9), 29.0);
}

#[test]
fn test_skip_run_reads_as_zeros() {
    // 10 samples, a skip worth 2 buffer-lengths (20 samples), 10 more.
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("skip.prc");
    write_recording(
        &path,
        &plain_info(1),
        None,
        &[
            RawItem::Buffer(vec![ramp(10, 1.0)]),
            RawItem::Skip(2),
            RawItem::Buffer(vec![ramp(10, 100.0)]),
        ],
    );

    let mut rec = open_plain(&path);
    assert_eq!(rec.n_times(), 40);
    let (data, _) = rec.get(None, 0, None).unwrap();
    let m = data.as_real().unwrap();
    assert_abs_diff_eq!(m.get(0, 0), 1.0);
    assert_abs_diff_eq!(m.get(0, 9), 10.0);
    for s in 10..30 {
        assert_eq!(m.get(0, s), 0.0, "sample {s} inside the gap must be zero");
    }
    assert_abs_diff_eq!(m.get(0, 30), 100.0);
    assert_abs_diff_eq!(m.get(0, 39), 109.0);
}

#[test]
fn test_stop_clamped_to_recording_end() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("clamp.prc");
    write_recording(
        &path,
        &plain_info(1),
        None,
        &[RawItem::Buffer(vec![ramp(50, 0.0)])],
    );

    let mut rec = open_plain(&path);
    let (data, _) = rec.get(None, 40, Some(10_000)).unwrap();
    assert_eq!(data.shape(), (1, 10));
}

#[test]
fn test_empty_window_and_selection_errors() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("errors.prc");
    write_recording(
        &path,
        &plain_info(2),
        None,
        &[RawItem::Buffer(vec![ramp(10, 0.0), ramp(10, 0.0)])],
    );

    let mut rec = open_plain(&path);
    assert!(matches!(rec.get(None, 5, Some(5)), Err(Error::NoDataFound)));
    assert!(matches!(rec.get(None, 9, Some(3)), Err(Error::NoDataFound)));
    assert!(matches!(
        rec.get(Some(&[]), 0, None),
        Err(Error::EmptySelection)
    ));
}

#[test]
fn test_unsupported_encoding_aborts_open() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("badenc.prc");

    // A DATA_BUFFER tag with a string payload is not decodable.
    use polyrec::container::tags::kind;
    use polyrec::container::TagWriter;
    use polyrec::meta::write_info;
    let info = plain_info(1);
    let mut w = TagWriter::create(&path).unwrap();
    w.start_block(block::MEASUREMENT).unwrap();
    write_info(&mut w, &info).unwrap();
    w.start_block(block::RAW_DATA).unwrap();
    w.write_string(kind::DATA_BUFFER, "not samples").unwrap();
    w.end_block(block::RAW_DATA).unwrap();
    w.end_block(block::MEASUREMENT).unwrap();
    w.finish().unwrap();

    assert!(matches!(
        Recording::open(&path, OpenOptions::new()),
        Err(Error::UnsupportedEncoding(_))
    ));
}

#[test]
fn test_missing_data_block_aborts_open() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nodata.prc");

    use polyrec::container::TagWriter;
    use polyrec::meta::write_info;
    let mut w = TagWriter::create(&path).unwrap();
    w.start_block(block::MEASUREMENT).unwrap();
    write_info(&mut w, &plain_info(1)).unwrap();
    w.end_block(block::MEASUREMENT).unwrap();
    w.finish().unwrap();

    assert!(matches!(
        Recording::open(&path, OpenOptions::new()),
        Err(Error::NoDataFound)
    ));
}

#[test]
fn test_shielded_data_needs_opt_in() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shielded.prc");
    write_recording_in_block(
        &path,
        &plain_info(1),
        block::SHIELDED_RAW_DATA,
        None,
        &[RawItem::Buffer(vec![ramp(10, 0.0)])],
    );

    assert!(matches!(
        Recording::open(&path, OpenOptions::new()),
        Err(Error::NoDataFound)
    ));
    let rec = Recording::open(&path, OpenOptions::new().allow_shielded(true)).unwrap();
    assert_eq!(rec.n_times(), 10);
}

#[test]
fn test_int16_encoding_decodes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("int16.prc");
    write_recording(
        &path,
        &info_with_cals(&[(1.0, 0.25)]),
        None,
        &[RawItem::BufferI16(vec![vec![100, -200, 3000]])],
    );

    let mut rec = open_plain(&path);
    let (data, _) = rec.get(None, 0, None).unwrap();
    let m = data.as_real().unwrap();
    assert_abs_diff_eq!(m.get(0, 0), 25.0);
    assert_abs_diff_eq!(m.get(0, 1), -50.0);
    assert_abs_diff_eq!(m.get(0, 2), 750.0);
}

#[test]
fn test_reads_are_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("idem.prc");
    write_recording(
        &path,
        &info_with_cals(&[(0.5, 1e-2), (1.0, 1e-3)]),
        Some(42),
        &[
            RawItem::Buffer(vec![ramp(30, 0.0), ramp(30, 500.0)]),
            RawItem::Buffer(vec![ramp(30, 30.0), ramp(30, 530.0)]),
        ],
    );

    let mut rec = open_plain(&path);
    let first = rec.get(Some(&[0, 1]), 10, Some(50)).unwrap();
    let second = rec.get(Some(&[0, 1]), 10, Some(50)).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_preload_matches_streaming_reads() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("preload.prc");
    write_recording(
        &path,
        &info_with_cals(&[(1.0, 2.0), (1.0, 3.0)]),
        None,
        &[
            RawItem::Buffer(vec![ramp(40, 0.0), ramp(40, 100.0)]),
            RawItem::Skip(1),
            RawItem::Buffer(vec![ramp(40, 40.0), ramp(40, 140.0)]),
        ],
    );

    let mut streaming = open_plain(&path);
    let mut preloaded =
        Recording::open(&path, OpenOptions::new().preload(Preload::Memory)).unwrap();
    assert!(preloaded.is_materialized());
    assert!(!streaming.is_materialized());

    let (a, ta) = streaming.get(Some(&[1]), 15, Some(95)).unwrap();
    let (b, tb) = preloaded.get(Some(&[1]), 15, Some(95)).unwrap();
    assert_eq!(a, b);
    assert_eq!(ta, tb);
}

#[test]
fn test_mapped_preload_matches_memory() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mapped.prc");
    let scratch = dir.path().join("mapped.dat");
    write_recording(
        &path,
        &plain_info(2),
        None,
        &[RawItem::Buffer(vec![ramp(64, 0.0), ramp(64, 64.0)])],
    );

    let mut mem = Recording::open(&path, OpenOptions::new().preload(Preload::Memory)).unwrap();
    let mut mapped =
        Recording::open(&path, OpenOptions::new().preload(Preload::File(scratch))).unwrap();

    let (a, _) = mem.get(None, 0, None).unwrap();
    let (b, _) = mapped.get(None, 0, None).unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_set_requires_materialized_data() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("set.prc");
    write_recording(
        &path,
        &plain_info(1),
        None,
        &[RawItem::Buffer(vec![ramp(20, 0.0)])],
    );

    let mut rec = open_plain(&path);
    let values = SegmentData::Real(polyrec::meta::Matrix::from_vec(1, 5, vec![9.0; 5]));
    assert!(matches!(
        rec.set(None, 0, &values),
        Err(Error::NotPreloaded)
    ));

    rec.load_data().unwrap();
    rec.set(None, 5, &values).unwrap();
    let (data, _) = rec.get(None, 0, None).unwrap();
    let m = data.as_real().unwrap();
    assert_eq!(m.get(0, 4), 4.0);
    assert_eq!(m.get(0, 5), 9.0);
    assert_eq!(m.get(0, 9), 9.0);
    assert_eq!(m.get(0, 10), 10.0);
}

#[test]
fn test_read_into_checks_shape() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("into.prc");
    write_recording(
        &path,
        &plain_info(2),
        None,
        &[RawItem::Buffer(vec![ramp(30, 0.0), ramp(30, 100.0)])],
    );

    let mut rec = open_plain(&path);
    let mut wrong = SegmentData::Real(polyrec::meta::Matrix::zeros(2, 10));
    assert!(matches!(
        rec.read_into(None, 0, None, &mut wrong),
        Err(Error::BufferShapeMismatch { .. })
    ));

    let mut dest = SegmentData::Real(polyrec::meta::Matrix::zeros(2, 30));
    let times = rec.read_into(None, 0, None, &mut dest).unwrap();
    assert_eq!(times.len(), 30);
    assert_abs_diff_eq!(dest.as_real().unwrap().get(1, 3), 103.0);
}

#[test]
fn test_projection_removes_component() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("proj.prc");
    let mut info = plain_info(2);
    // Remove everything on channel 0.
    info.projs.push(Projection::new("kill-ch0", vec![1.0, 0.0]));
    write_recording(
        &path,
        &info,
        None,
        &[RawItem::Buffer(vec![ramp(10, 5.0), ramp(10, 50.0)])],
    );

    let mut plain = open_plain(&path);
    let (data, _) = plain.get(None, 0, None).unwrap();
    assert_abs_diff_eq!(data.as_real().unwrap().get(0, 0), 5.0);

    let mut projected =
        Recording::open(&path, OpenOptions::new().apply_projection(true)).unwrap();
    let (data, _) = projected.get(None, 0, None).unwrap();
    let m = data.as_real().unwrap();
    for s in 0..10 {
        assert_abs_diff_eq!(m.get(0, s), 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(m.get(1, s), (50 + s) as f64, epsilon = 1e-9);
    }
}

#[test]
fn test_apply_projection_on_materialized_buffer() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("proj_mat.prc");
    let mut info = plain_info(2);
    info.projs.push(Projection::new("kill-ch0", vec![1.0, 0.0]));
    write_recording(
        &path,
        &info,
        None,
        &[RawItem::Buffer(vec![ramp(10, 5.0), ramp(10, 50.0)])],
    );

    let mut rec =
        Recording::open(&path, OpenOptions::new().preload(Preload::Memory)).unwrap();
    rec.apply_projection().unwrap();
    let (data, _) = rec.get(None, 0, None).unwrap();
    assert_abs_diff_eq!(data.as_real().unwrap().get(0, 3), 0.0, epsilon = 1e-9);
}

#[test]
fn test_projection_change_after_materialize_is_surfaced() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("proj_change.prc");
    write_recording(
        &path,
        &plain_info(2),
        None,
        &[RawItem::Buffer(vec![ramp(10, 0.0), ramp(10, 10.0)])],
    );

    let mut rec =
        Recording::open(&path, OpenOptions::new().preload(Preload::Memory)).unwrap();
    rec.get(None, 0, None).unwrap();

    rec.add_projections(vec![Projection::new("late", vec![1.0, 0.0])], false);
    assert!(matches!(
        rec.get(None, 0, None),
        Err(Error::InPlaceMutationForbidden)
    ));
}

#[test]
fn test_compensation_matrix_applied_before_selection() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("comp.prc");
    let mut info = plain_info(2);
    // Compensation swaps the two channels.
    info.comp = Some(polyrec::meta::Matrix::from_vec(
        2,
        2,
        vec![0.0, 1.0, 1.0, 0.0],
    ));
    write_recording(
        &path,
        &info,
        None,
        &[RawItem::Buffer(vec![ramp(10, 0.0), ramp(10, 100.0)])],
    );

    let mut rec = open_plain(&path);
    // Selecting channel 0 must yield the compensated (swapped) row.
    let (data, _) = rec.get(Some(&[0]), 0, None).unwrap();
    let m = data.as_real().unwrap();
    for s in 0..10 {
        assert_abs_diff_eq!(m.get(0, s), (100 + s) as f64, epsilon = 1e-9);
    }
}

#[test]
fn test_times_offset_by_first_sample() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("times.prc");
    write_recording(
        &path,
        &plain_info(1),
        Some(2000),
        &[RawItem::Buffer(vec![ramp(10, 0.0)])],
    );

    let mut rec = open_plain(&path);
    let (_, times) = rec.get(None, 4, Some(8)).unwrap();
    // Relative to the recording's own start, not the absolute counter.
    assert_abs_diff_eq!(times[0], 0.004);
    assert_abs_diff_eq!(times[3], 0.007);

    assert_eq!(rec.time_to_index(&[0.004, 0.25]), vec![4, 250]);
}
