//! Frame extractor integration tests.
//!
//! These drive [`FrameExtractor`] against a scripted in-memory source, so no
//! fixture media is needed.

mod common;

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use common::{Call, FakeSource, release_count, seeks, segments_at};
use timeloop::{
    CancellationToken, CaptureFormat, ExtractOptions, ExtractionState, FrameExtractor,
    ProgressCallback, ProgressInfo, TimeloopError, effective_seek_time,
};

fn extractor() -> FrameExtractor {
    FrameExtractor::new(ExtractOptions::new())
}

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-6,
        "expected {expected}, got {actual}"
    );
}

// ── Clamping ───────────────────────────────────────────────────────

#[test]
fn clamp_past_end_keeps_margin() {
    assert_close(effective_seek_time(15.0, 10.0), 9.9);
}

#[test]
fn clamp_negative_to_zero() {
    assert_eq!(effective_seek_time(-3.0, 10.0), 0.0);
}

#[test]
fn clamp_in_range_unchanged() {
    assert_eq!(effective_seek_time(9.95, 10.0), 9.95);
    assert_eq!(effective_seek_time(10.0, 10.0), 10.0);
    assert_eq!(effective_seek_time(0.0, 10.0), 0.0);
}

#[test]
fn clamped_seek_positions_reach_source() {
    let mut source = FakeSource::new(4.0);
    extractor().extract(&mut source, segments_at(&[9.0, -3.0])).unwrap();

    let positions = seeks(&source.calls());
    assert_eq!(positions.len(), 2);
    assert_close(positions[0], 3.9);
    assert_close(positions[1], 0.0);
}

// ── Order and length ───────────────────────────────────────────────

#[test]
fn output_preserves_order_and_targets() {
    let targets = [5.0, 1.0, 5.0, 3.5, 42.0];
    let input = segments_at(&targets);
    let mut source = FakeSource::new(10.0);

    let output = extractor().extract(&mut source, input.clone()).unwrap();

    assert_eq!(output.len(), input.len());
    for (before, after) in input.iter().zip(&output) {
        assert_eq!(after.target_time_seconds, before.target_time_seconds);
        assert_eq!(after.label, before.label);
        assert_eq!(after.generation_text, before.generation_text);
        assert!(after.has_image());
    }
}

#[test]
fn empty_batch_skips_load_and_releases_once() {
    let mut source = FakeSource::new(10.0);
    let output = extractor().extract(&mut source, Vec::new()).unwrap();

    assert!(output.is_empty());
    assert_eq!(source.calls(), vec![Call::Release]);
}

#[test]
fn empty_batch_succeeds_even_if_load_would_fail() {
    let mut source = FakeSource::new(10.0).failing_load();
    let output = extractor().extract(&mut source, Vec::new()).unwrap();
    assert!(output.is_empty());
}

// ── Sequencing ─────────────────────────────────────────────────────

#[test]
fn seek_and_capture_strictly_alternate() {
    let mut source = FakeSource::new(10.0).fail_seek(1);
    extractor()
        .extract(&mut source, segments_at(&[1.0, 2.0, 3.0]))
        .unwrap();

    // The failed seek for segment 1 has no capture; segment 2 still follows it.
    assert_eq!(
        source.calls(),
        vec![
            Call::Load,
            Call::Seek(1.0),
            Call::Capture,
            Call::Seek(2.0),
            Call::Seek(3.0),
            Call::Capture,
            Call::Release,
        ]
    );
}

#[derive(Default)]
struct StateRecorder {
    states: Mutex<Vec<ExtractionState>>,
    reports: Mutex<Vec<ProgressInfo>>,
}

impl ProgressCallback for StateRecorder {
    fn on_progress(&self, info: &ProgressInfo) {
        self.reports.lock().unwrap().push(info.clone());
    }

    fn on_state(&self, state: ExtractionState) {
        self.states.lock().unwrap().push(state);
    }
}

#[test]
fn state_sequence_for_successful_batch() {
    let recorder = Arc::new(StateRecorder::default());
    let options = ExtractOptions::new().with_progress(recorder.clone());
    let mut source = FakeSource::new(10.0);

    FrameExtractor::new(options)
        .extract(&mut source, segments_at(&[1.0, 2.0]))
        .unwrap();

    assert_eq!(
        *recorder.states.lock().unwrap(),
        vec![
            ExtractionState::Init,
            ExtractionState::LoadingMetadata,
            ExtractionState::Seeking(0),
            ExtractionState::Capturing(0),
            ExtractionState::Seeking(1),
            ExtractionState::Capturing(1),
            ExtractionState::Done,
        ]
    );
}

#[test]
fn progress_reports_count_captured_segments() {
    let recorder = Arc::new(StateRecorder::default());
    let options = ExtractOptions::new().with_progress(recorder.clone());
    let mut source = FakeSource::new(10.0).fail_capture(0);

    FrameExtractor::new(options)
        .extract(&mut source, segments_at(&[1.0, 2.0, 3.0]))
        .unwrap();

    let reports = recorder.reports.lock().unwrap();
    assert_eq!(reports.len(), 3);
    let last = reports.last().unwrap();
    assert_eq!(last.current, 3);
    assert_eq!(last.total, 3);
    assert_eq!(last.captured, 2);
    assert_eq!(last.current_target_seconds, Some(3.0));
    assert_eq!(last.percentage(), 100.0);
}

// ── Per-segment failures ───────────────────────────────────────────

#[test]
fn capture_failure_is_isolated_to_its_segment() {
    let mut source = FakeSource::new(10.0).fail_capture(1);
    let output = extractor()
        .extract(&mut source, segments_at(&[1.0, 2.0, 3.0, 4.0]))
        .unwrap();

    assert_eq!(output.len(), 4);
    let images: Vec<bool> = output.iter().map(|segment| segment.has_image()).collect();
    assert_eq!(images, vec![true, false, true, true]);
}

#[test]
fn seek_failure_is_isolated_to_its_segment() {
    let mut source = FakeSource::new(10.0).fail_seek(0);
    let output = extractor()
        .extract(&mut source, segments_at(&[1.0, 2.0]))
        .unwrap();

    assert!(!output[0].has_image());
    assert!(output[1].has_image());
}

#[test]
fn seek_timeout_skips_segment() {
    let options = ExtractOptions::new().with_seek_timeout(Duration::from_millis(5));
    let mut source = FakeSource::new(10.0).with_seek_delay(Duration::from_millis(30));

    let output = FrameExtractor::new(options)
        .extract(&mut source, segments_at(&[1.0, 2.0]))
        .unwrap();

    assert_eq!(output.len(), 2);
    assert!(output.iter().all(|segment| !segment.has_image()));
    assert!(!source.calls().contains(&Call::Capture));
    assert_eq!(release_count(&source.calls()), 1);
}

#[test]
fn non_finite_target_is_a_segment_failure() {
    let mut source = FakeSource::new(10.0);
    let output = extractor()
        .extract(&mut source, segments_at(&[f64::NAN, 2.0]))
        .unwrap();

    assert!(!output[0].has_image());
    assert!(output[0].target_time_seconds.is_nan());
    assert!(output[1].has_image());
    assert_eq!(seeks(&source.calls()), vec![2.0]);
}

#[test]
fn media_shorter_than_margin_is_a_segment_failure() {
    // 0.05s - 0.1s is negative: nothing sensible to seek to.
    let mut source = FakeSource::new(0.05);
    let output = extractor().extract(&mut source, segments_at(&[5.0])).unwrap();

    assert!(!output[0].has_image());
    assert!(seeks(&source.calls()).is_empty());
}

#[test]
fn zero_sized_frame_is_a_segment_failure() {
    let mut source = FakeSource::new(10.0).with_dimensions(0, 0);
    let output = extractor().extract(&mut source, segments_at(&[1.0])).unwrap();
    assert!(!output[0].has_image());
}

// ── Fatal failures ─────────────────────────────────────────────────

#[test]
fn load_failure_fails_batch() {
    let mut source = FakeSource::new(10.0).failing_load();
    let result = extractor().extract(&mut source, segments_at(&[1.0, 2.0]));

    match result {
        Err(TimeloopError::MediaOpen { locator, .. }) => assert_eq!(locator, "memory://fake"),
        other => panic!("Expected MediaOpen, got: {other:?}"),
    }
    assert_eq!(source.calls(), vec![Call::Load, Call::Release]);
}

#[test]
fn load_failure_ends_in_failed_state() {
    let recorder = Arc::new(StateRecorder::default());
    let options = ExtractOptions::new().with_progress(recorder.clone());
    let mut source = FakeSource::new(10.0).failing_load();

    let _ = FrameExtractor::new(options).extract(&mut source, segments_at(&[1.0]));

    assert_eq!(
        recorder.states.lock().unwrap().last(),
        Some(&ExtractionState::Failed)
    );
}

#[test]
fn cancellation_before_first_segment() {
    let token = CancellationToken::new();
    token.cancel();
    let options = ExtractOptions::new().with_cancellation(token);
    let mut source = FakeSource::new(10.0);

    let result = FrameExtractor::new(options).extract(&mut source, segments_at(&[1.0, 2.0]));

    assert!(matches!(result, Err(TimeloopError::Cancelled)));
    assert!(seeks(&source.calls()).is_empty());
    assert_eq!(release_count(&source.calls()), 1);
}

#[test]
fn cancellation_between_segments() {
    let token = CancellationToken::new();
    let options = ExtractOptions::new().with_cancellation(token.clone());
    let mut source = FakeSource::new(10.0);

    let result = FrameExtractor::new(options).extract_each(
        &mut source,
        segments_at(&[1.0, 2.0, 3.0]),
        |index, _| {
            if index == 0 {
                token.cancel();
            }
        },
    );

    assert!(matches!(result, Err(TimeloopError::Cancelled)));
    assert_eq!(seeks(&source.calls()), vec![1.0]);
    assert_eq!(release_count(&source.calls()), 1);
}

// ── Release ────────────────────────────────────────────────────────

#[test]
fn release_exactly_once_on_every_path() {
    let cases: Vec<(FakeSource, Vec<f64>)> = vec![
        (FakeSource::new(10.0), vec![1.0, 2.0]),
        (FakeSource::new(10.0).fail_capture(0).fail_seek(1), vec![1.0, 2.0]),
        (FakeSource::new(10.0).failing_load(), vec![1.0]),
        (FakeSource::new(10.0), vec![]),
    ];

    for (mut source, targets) in cases {
        let _ = extractor().extract(&mut source, segments_at(&targets));
        assert_eq!(release_count(&source.calls()), 1, "targets {targets:?}");
        assert_eq!(source.calls().last(), Some(&Call::Release));
    }
}

#[test]
fn boxed_source_is_released_once() {
    let source = FakeSource::new(10.0);
    let log = source.call_log();
    let mut boxed: Box<dyn timeloop::MediaSource> = Box::new(source);

    extractor().extract(&mut boxed, segments_at(&[1.0])).unwrap();

    assert_eq!(release_count(&log.lock().unwrap()), 1);
}

// ── Images ─────────────────────────────────────────────────────────

#[test]
fn captured_images_keep_native_dimensions() {
    let mut source = FakeSource::new(10.0).with_dimensions(32, 18);
    let output = extractor().extract(&mut source, segments_at(&[1.0])).unwrap();

    let image = output[0].captured_image().unwrap();
    assert_eq!((image.width(), image.height()), (32, 18));
    assert_eq!(image.mime_type(), "image/jpeg");
    assert!(image.to_data_uri().starts_with("data:image/jpeg;base64,"));
}

#[test]
fn png_capture_format() {
    let options = ExtractOptions::new().with_capture_format(CaptureFormat::Png);
    let mut source = FakeSource::new(10.0);
    let output = FrameExtractor::new(options)
        .extract(&mut source, segments_at(&[1.0]))
        .unwrap();

    let image = output[0].captured_image().unwrap();
    assert_eq!(image.mime_type(), "image/png");
    assert_eq!(&image.bytes()[1..4], b"PNG");
}

#[test]
fn existing_image_is_not_replaced() {
    let mut segments = segments_at(&[1.0]);
    let original = timeloop::CapturedImage::new(vec![1, 2, 3], "image/jpeg", 1, 1);
    assert!(segments[0].attach_image(original.clone()));

    let mut source = FakeSource::new(10.0);
    let output = extractor().extract(&mut source, segments).unwrap();

    assert_eq!(output[0].captured_image(), Some(&original));
}

// ── End to end ─────────────────────────────────────────────────────

#[test]
fn ten_second_clip_with_one_capture_fault() {
    let mut source = FakeSource::new(10.0).fail_capture(2);
    let output = extractor()
        .extract(&mut source, segments_at(&[2.0, 9.95, 15.0, -1.0]))
        .unwrap();

    let positions = seeks(&source.calls());
    assert_eq!(positions.len(), 4);
    for (actual, expected) in positions.iter().zip([2.0, 9.95, 9.9, 0.0]) {
        assert_close(*actual, expected);
    }

    assert_eq!(output.len(), 4);
    let images: Vec<bool> = output.iter().map(|segment| segment.has_image()).collect();
    assert_eq!(images, vec![true, true, false, true]);
    let targets: Vec<f64> = output.iter().map(|segment| segment.target_time_seconds).collect();
    assert_eq!(targets, vec![2.0, 9.95, 15.0, -1.0]);
    assert_eq!(release_count(&source.calls()), 1);
}
