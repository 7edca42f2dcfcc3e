//! Sequential keyframe extraction.
//!
//! [`FrameExtractor`] walks an ordered list of [`Segment`]s against one
//! [`MediaSource`]: load metadata, then for each segment seek to its clamped
//! target time, capture the visible frame, and attach the encoded image.
//!
//! Segments are processed strictly one after another. A source has a single
//! decode position, so segment `i + 1` is never sought before segment `i`
//! has been captured or has failed.
//!
//! Failures come in two kinds. If metadata cannot be loaded the whole batch
//! fails and no segments are returned. Anything that goes wrong for one
//! segment (a failed or timed-out seek, a capture or encode error, a
//! degenerate timestamp) is logged and leaves that segment without an image;
//! the batch carries on. Either way the source is released exactly once
//! before the call returns.

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    ops::{Deref, DerefMut},
    time::{Duration, Instant},
};

use crate::{
    capture::encode_image,
    configuration::ExtractOptions,
    error::TimeloopError,
    media::MediaSource,
    progress::ProgressTracker,
    segment::{CapturedImage, Segment},
};

/// Distance kept from the end of the media when a target lies past it.
pub const END_OF_STREAM_MARGIN_SECONDS: f64 = 0.1;

/// Clamp a requested timestamp to a seekable position.
///
/// Targets past `duration_seconds` map to `duration_seconds - 0.1`, negative
/// targets map to `0`, anything else is returned unchanged.
///
/// ```
/// use timeloop::effective_seek_time;
///
/// assert_eq!(effective_seek_time(4.0, 10.0), 4.0);
/// assert!((effective_seek_time(15.0, 10.0) - 9.9).abs() < 1e-9);
/// assert_eq!(effective_seek_time(-1.0, 10.0), 0.0);
/// ```
pub fn effective_seek_time(target_seconds: f64, duration_seconds: f64) -> f64 {
    if target_seconds > duration_seconds {
        duration_seconds - END_OF_STREAM_MARGIN_SECONDS
    } else if target_seconds < 0.0 {
        0.0
    } else {
        target_seconds
    }
}

/// State of one extraction call.
///
/// ```text
/// Init -> LoadingMetadata -> Failed
///                         -> Seeking(0) -> Capturing(0) -> Seeking(1) -> ... -> Done
/// ```
///
/// An empty batch goes straight from `Init` to `Done`. `Cancelled` can follow
/// any per-segment state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtractionState {
    /// Call received, media not yet touched.
    Init,
    /// Waiting for duration and dimensions.
    LoadingMetadata,
    /// Seek issued for the segment at this index.
    Seeking(usize),
    /// Rasterising and encoding the frame for the segment at this index.
    Capturing(usize),
    /// All segments processed and the media released.
    Done,
    /// Media could not be loaded.
    Failed,
    /// Cancellation was requested between segments.
    Cancelled,
}

impl ExtractionState {
    /// Returns `true` for states that end the call.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExtractionState::Done | ExtractionState::Failed | ExtractionState::Cancelled
        )
    }
}

impl Display for ExtractionState {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            ExtractionState::Init => write!(f, "init"),
            ExtractionState::LoadingMetadata => write!(f, "loading-metadata"),
            ExtractionState::Seeking(index) => write!(f, "seeking({index})"),
            ExtractionState::Capturing(index) => write!(f, "capturing({index})"),
            ExtractionState::Done => write!(f, "done"),
            ExtractionState::Failed => write!(f, "failed"),
            ExtractionState::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Releases the borrowed source exactly once, on whichever path leaves first.
struct ReleaseGuard<'a, S: MediaSource + ?Sized> {
    source: &'a mut S,
    released: bool,
}

impl<'a, S: MediaSource + ?Sized> ReleaseGuard<'a, S> {
    fn new(source: &'a mut S) -> Self {
        Self {
            source,
            released: false,
        }
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.source.release();
        }
    }
}

impl<S: MediaSource + ?Sized> Deref for ReleaseGuard<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        self.source
    }
}

impl<S: MediaSource + ?Sized> DerefMut for ReleaseGuard<'_, S> {
    fn deref_mut(&mut self) -> &mut S {
        self.source
    }
}

impl<S: MediaSource + ?Sized> Drop for ReleaseGuard<'_, S> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Captures keyframes for a batch of segments.
///
/// # Example
///
/// ```no_run
/// use timeloop::{ExtractOptions, FrameExtractor, MediaFile, Segment};
///
/// let extractor = FrameExtractor::new(ExtractOptions::new());
/// let mut media = MediaFile::new("input.mp4");
/// let segments = extractor.extract(
///     &mut media,
///     vec![Segment::new(2.0, "wide shot", ""), Segment::new(8.5, "close-up", "")],
/// )?;
/// for segment in &segments {
///     if let Some(image) = segment.captured_image() {
///         image.save(format!("{}.{}", segment.target_time_seconds, image.extension()))?;
///     }
/// }
/// # Ok::<(), timeloop::TimeloopError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct FrameExtractor {
    options: ExtractOptions,
}

impl FrameExtractor {
    /// Create an extractor with the given options.
    pub fn new(options: ExtractOptions) -> Self {
        Self { options }
    }

    /// The options this extractor was built with.
    pub fn options(&self) -> &ExtractOptions {
        &self.options
    }

    /// Capture a frame for every segment.
    ///
    /// Returns the segments in input order, each carrying an image unless
    /// its capture failed. Target timestamps are never modified.
    ///
    /// # Errors
    ///
    /// Fails only if the media cannot be loaded, or with
    /// [`TimeloopError::Cancelled`] if the cancellation token fires.
    pub fn extract<S>(&self, source: &mut S, segments: Vec<Segment>) -> Result<Vec<Segment>, TimeloopError>
    where
        S: MediaSource + ?Sized,
    {
        self.extract_each(source, segments, |_, _| {})
    }

    /// Like [`extract`](FrameExtractor::extract), calling `on_segment` with
    /// each segment as soon as it has been processed.
    ///
    /// # Errors
    ///
    /// See [`extract`](FrameExtractor::extract).
    pub fn extract_each<S, F>(
        &self,
        source: &mut S,
        mut segments: Vec<Segment>,
        mut on_segment: F,
    ) -> Result<Vec<Segment>, TimeloopError>
    where
        S: MediaSource + ?Sized,
        F: FnMut(usize, &Segment),
    {
        let mut tracker = ProgressTracker::new(
            self.options.progress.clone(),
            segments.len() as u64,
            self.options.batch_size,
        );
        tracker.transition(ExtractionState::Init);

        let mut source = ReleaseGuard::new(source);

        if segments.is_empty() {
            log::debug!("No segments for {}; skipping media load", source.locator());
            source.release();
            tracker.finish();
            tracker.transition(ExtractionState::Done);
            return Ok(segments);
        }

        log::info!(
            "Extracting {} keyframes from {}",
            segments.len(),
            source.locator()
        );

        tracker.transition(ExtractionState::LoadingMetadata);
        let metadata = match source.load_metadata() {
            Ok(metadata) => metadata,
            Err(error) => {
                log::error!("Failed to load {}: {error}", source.locator());
                source.release();
                tracker.transition(ExtractionState::Failed);
                return Err(error);
            }
        };
        let duration_seconds = metadata.duration_seconds();

        for (index, segment) in segments.iter_mut().enumerate() {
            if self.options.is_cancelled() {
                log::info!("Extraction cancelled before segment {index}");
                source.release();
                tracker.transition(ExtractionState::Cancelled);
                return Err(TimeloopError::Cancelled);
            }

            tracker.transition(ExtractionState::Seeking(index));
            let outcome = self.capture_segment(&mut *source, &tracker, index, segment, duration_seconds);
            let captured = match outcome {
                Ok(image) => segment.attach_image(image),
                Err(error) => {
                    log::warn!(
                        "Segment {index} at {:.2}s: {error}",
                        segment.target_time_seconds
                    );
                    false
                }
            };

            tracker.advance(captured, segment.target_time_seconds);
            on_segment(index, segment);
        }

        source.release();
        tracker.finish();
        log::info!(
            "Captured {} of {} keyframes",
            tracker.captured(),
            segments.len()
        );
        tracker.transition(ExtractionState::Done);
        Ok(segments)
    }

    fn capture_segment<S>(
        &self,
        source: &mut S,
        tracker: &ProgressTracker,
        index: usize,
        segment: &Segment,
        duration_seconds: f64,
    ) -> Result<CapturedImage, TimeloopError>
    where
        S: MediaSource + ?Sized,
    {
        let requested = segment.target_time_seconds;
        let effective = effective_seek_time(requested, duration_seconds);
        if !(effective.is_finite() && effective >= 0.0) {
            return Err(TimeloopError::DegenerateTimestamp {
                requested,
                effective,
            });
        }

        let position = Duration::from_secs_f64(effective);
        let deadline = self.options.seek_timeout.map(|timeout| Instant::now() + timeout);
        log::debug!("Seeking segment {index} to {effective:.3}s (requested {requested:.3}s)");
        source.seek(position, deadline)?;

        tracker.transition(ExtractionState::Capturing(index));
        let frame = source.capture_frame()?;
        encode_image(&frame, self.options.capture_format)
    }
}
