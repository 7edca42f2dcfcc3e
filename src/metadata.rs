//! Media metadata types.
//!
//! [`MediaMetadata`] is produced by
//! [`MediaSource::load_metadata`](crate::MediaSource::load_metadata). The frame
//! extractor needs two things from it: the duration, which bounds every seek,
//! and the native frame dimensions, which size every capture.

use std::time::Duration;

use serde::Serialize;

/// Metadata for a loaded media resource.
///
/// # Example
///
/// ```no_run
/// use timeloop::{MediaFile, MediaSource};
///
/// let mut media = MediaFile::new("input.mp4");
/// let metadata = media.load_metadata()?;
/// println!("{:.2}s {}x{}", metadata.duration_seconds(), metadata.video.width, metadata.video.height);
/// # Ok::<(), timeloop::TimeloopError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
#[must_use]
pub struct MediaMetadata {
    /// Total duration of the media.
    pub duration: Duration,
    /// Container format name (e.g. `"mov,mp4,m4a,3gp,3g2,mj2"`, `"matroska,webm"`).
    pub format: String,
    /// Metadata of the video stream frames are captured from.
    pub video: VideoMetadata,
}

impl MediaMetadata {
    /// Duration in fractional seconds.
    pub fn duration_seconds(&self) -> f64 {
        self.duration.as_secs_f64()
    }
}

/// Metadata for a video stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[must_use]
pub struct VideoMetadata {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Frames per second (may be approximate for variable-frame-rate content).
    pub frames_per_second: f64,
    /// Estimated total number of frames, computed from duration and frame rate.
    pub frame_count: u64,
    /// Codec name (e.g. `"h264"`, `"vp9"`, `"av1"`).
    pub codec: String,
}
