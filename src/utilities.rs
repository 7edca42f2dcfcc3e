//! Internal utility functions.
//!
//! Helpers for pixel-data copying, timestamp conversion, and other shared
//! logic that does not belong in any single public module.

use std::time::Duration;

use ffmpeg_next::{Rational, frame::Video as VideoFrame};

/// Copy pixel data from an FFmpeg video frame into a tightly-packed RGB buffer.
///
/// FFmpeg frames frequently carry per-row padding (stride > width × 3).
/// This strips the padding so the result can be handed to
/// [`image::RgbImage::from_raw`].
pub(crate) fn frame_to_rgb_buffer(video_frame: &VideoFrame, width: u32, height: u32) -> Vec<u8> {
    let stride = video_frame.stride(0);
    let row_bytes = (width as usize) * 3;
    let data = video_frame.data(0);

    if stride == row_bytes {
        data[..row_bytes * (height as usize)].to_vec()
    } else {
        let mut buffer = Vec::with_capacity(row_bytes * (height as usize));
        for row in 0..(height as usize) {
            let row_start = row * stride;
            buffer.extend_from_slice(&data[row_start..row_start + row_bytes]);
        }
        buffer
    }
}

/// Convert a [`Duration`] to a timestamp in the stream's time base.
pub(crate) fn duration_to_stream_timestamp(duration: Duration, time_base: Rational) -> i64 {
    let seconds = duration.as_secs_f64();
    let numerator = time_base.numerator() as f64;
    let denominator = time_base.denominator() as f64;
    (seconds * denominator / numerator) as i64
}

/// Convert a [`Duration`] to a seek timestamp in AV_TIME_BASE (microseconds).
///
/// `input.seek()` (via `avformat_seek_file` with `stream_index = -1`)
/// expects container-level timestamps.
pub(crate) fn duration_to_seek_timestamp(duration: Duration) -> i64 {
    duration.as_micros() as i64
}

/// Rescale a stream timestamp to AV_TIME_BASE (microseconds).
pub(crate) fn stream_timestamp_to_micros(pts: i64, time_base: Rational) -> i64 {
    (pts_to_seconds(pts, time_base) * 1_000_000.0).round() as i64
}

/// A stream's start time, with `AV_NOPTS_VALUE` read as 0.
pub(crate) fn presentation_start(start_time: i64) -> i64 {
    if start_time == ffmpeg_next::ffi::AV_NOPTS_VALUE {
        0
    } else {
        start_time
    }
}

/// Rescale a PTS value from stream time base to seconds.
pub(crate) fn pts_to_seconds(pts: i64, time_base: Rational) -> f64 {
    pts as f64 * time_base.numerator() as f64 / time_base.denominator() as f64
}

/// Format seconds as `MM:SS` (or `H:MM:SS` past the hour).
///
/// Negative and non-finite inputs render as `00:00`.
///
/// ```
/// assert_eq!(timeloop::format_timestamp(65.4), "01:05");
/// assert_eq!(timeloop::format_timestamp(3725.0), "1:02:05");
/// assert_eq!(timeloop::format_timestamp(-2.0), "00:00");
/// ```
pub fn format_timestamp(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    };
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;
    if hours > 0 {
        format!("{hours}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes:02}:{secs:02}")
    }
}
