//! Seekable media sources.
//!
//! [`MediaSource`] is the interface the frame extractor drives: load metadata
//! once, then repeatedly seek and capture, then release. It is a trait so the
//! extractor can be exercised against test doubles and alternative decoders;
//! [`MediaFile`] is the FFmpeg-backed implementation used in production.
//!
//! A source holds a single decode position. Two extractions must never drive
//! the same source at once, which the `&mut` receivers enforce.

use std::{
    cmp::Ordering,
    fmt::{Debug, Formatter, Result as FmtResult},
    mem,
    time::{Duration, Instant},
};

use ffmpeg_next::{
    Rational,
    codec::context::Context as CodecContext,
    decoder::Video as VideoDecoder,
    format::{Pixel, context::Input},
    frame::Video as VideoFrame,
    media::Type,
    software::scaling::{Context as ScalingContext, Flags as ScalingFlags},
    util::log::Level,
};
use image::{DynamicImage, RgbImage};

use crate::{
    error::TimeloopError,
    metadata::{MediaMetadata, VideoMetadata},
};

/// A seekable, decodable media resource.
///
/// The extractor calls the methods in this order for one batch:
/// [`load_metadata`](MediaSource::load_metadata) once, then
/// [`seek`](MediaSource::seek) / [`capture_frame`](MediaSource::capture_frame)
/// pairs, then [`release`](MediaSource::release) exactly once.
pub trait MediaSource {
    /// Path or URL identifying the resource, for diagnostics.
    fn locator(&self) -> &str;

    /// Open the resource and establish its duration and frame dimensions.
    ///
    /// # Errors
    ///
    /// Any error returned here is fatal for the extraction batch.
    fn load_metadata(&mut self) -> Result<MediaMetadata, TimeloopError>;

    /// Position the source at `position`.
    ///
    /// Implementations must give up with [`TimeloopError::SeekTimeout`] once
    /// `deadline` has passed.
    fn seek(&mut self, position: Duration, deadline: Option<Instant>) -> Result<(), TimeloopError>;

    /// Rasterise the frame at the current position at native resolution.
    fn capture_frame(&mut self) -> Result<DynamicImage, TimeloopError>;

    /// Detach from the resource and stop any pending decode.
    fn release(&mut self);
}

impl<S: MediaSource + ?Sized> MediaSource for Box<S> {
    fn locator(&self) -> &str {
        (**self).locator()
    }

    fn load_metadata(&mut self) -> Result<MediaMetadata, TimeloopError> {
        (**self).load_metadata()
    }

    fn seek(&mut self, position: Duration, deadline: Option<Instant>) -> Result<(), TimeloopError> {
        (**self).seek(position, deadline)
    }

    fn capture_frame(&mut self) -> Result<DynamicImage, TimeloopError> {
        (**self).capture_frame()
    }

    fn release(&mut self) {
        (**self).release()
    }
}

/// Decoder state that only exists while the media is loaded.
struct OpenMedia {
    input: Input,
    decoder: VideoDecoder,
    stream_index: usize,
    time_base: Rational,
    /// Stream timestamp at which presentation starts.
    start_pts: i64,
    metadata: MediaMetadata,
    /// The frame the last successful seek landed on.
    current: Option<VideoFrame>,
}

/// FFmpeg-backed [`MediaSource`].
///
/// Construction is free; the demuxer and decoder are created by
/// [`load_metadata`](MediaSource::load_metadata) and dropped by
/// [`release`](MediaSource::release). The locator may be a local path or any
/// URL FFmpeg's protocols understand.
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
///
/// use timeloop::{MediaFile, MediaSource};
///
/// let mut media = MediaFile::new("input.mp4");
/// media.load_metadata()?;
/// media.seek(Duration::from_secs(2), None)?;
/// media.capture_frame()?.save("two_seconds.png")?;
/// media.release();
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct MediaFile {
    locator: String,
    open: Option<OpenMedia>,
}

impl Debug for MediaFile {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("MediaFile")
            .field("locator", &self.locator)
            .field("loaded", &self.open.is_some())
            .field("metadata", &self.metadata())
            .finish_non_exhaustive()
    }
}

impl MediaFile {
    /// Create an unopened handle for a path or URL.
    pub fn new(locator: impl Into<String>) -> Self {
        Self {
            locator: locator.into(),
            open: None,
        }
    }

    /// Cached metadata, if the media is currently loaded.
    pub fn metadata(&self) -> Option<&MediaMetadata> {
        self.open.as_ref().map(|open| &open.metadata)
    }

    /// Presentation time of the frame the last seek landed on.
    ///
    /// `None` before the first successful seek and after release.
    pub fn current_position(&self) -> Option<Duration> {
        let open = self.open.as_ref()?;
        let frame = open.current.as_ref()?;
        let pts = frame.timestamp().or_else(|| frame.pts())?;
        let seconds = crate::utilities::pts_to_seconds(pts - open.start_pts, open.time_base);
        Some(Duration::from_secs_f64(seconds.max(0.0)))
    }

    /// Returns `true` between a successful load and release.
    pub fn is_loaded(&self) -> bool {
        self.open.is_some()
    }

    fn open_error(&self, reason: impl Into<String>) -> TimeloopError {
        TimeloopError::MediaOpen {
            locator: self.locator.clone(),
            reason: reason.into(),
        }
    }

    fn open_media(&self) -> Result<OpenMedia, TimeloopError> {
        log::debug!("Opening media: {}", self.locator);

        ffmpeg_next::init()
            .map_err(|error| self.open_error(format!("FFmpeg initialisation failed: {error}")))?;

        let input = ffmpeg_next::format::input(&self.locator)
            .map_err(|error| self.open_error(error.to_string()))?;

        let (stream_index, time_base, start_pts, frame_rate, stream_duration, decoder) = {
            let stream = input
                .streams()
                .best(Type::Video)
                .ok_or(TimeloopError::NoVideoStream)?;
            let decoder_context = CodecContext::from_parameters(stream.parameters())
                .map_err(|error| {
                    self.open_error(format!("Failed to read video codec parameters: {error}"))
                })?;
            let decoder = decoder_context.decoder().video().map_err(|error| {
                self.open_error(format!("Failed to create video decoder: {error}"))
            })?;
            (
                stream.index(),
                stream.time_base(),
                crate::utilities::presentation_start(stream.start_time()),
                stream.avg_frame_rate(),
                stream.duration(),
                decoder,
            )
        };

        let container_duration = input.duration();
        let duration_seconds = if container_duration > 0 {
            container_duration as f64 / 1_000_000.0
        } else if stream_duration > 0 {
            crate::utilities::pts_to_seconds(stream_duration, time_base)
        } else {
            0.0
        };

        if !(duration_seconds.is_finite() && duration_seconds > 0.0) {
            return Err(TimeloopError::MetadataUnavailable(format!(
                "{} reports no duration",
                self.locator
            )));
        }

        let width = decoder.width();
        let height = decoder.height();
        if width == 0 || height == 0 {
            return Err(TimeloopError::MetadataUnavailable(format!(
                "{} reports frame dimensions {width}x{height}",
                self.locator
            )));
        }

        let frames_per_second = if frame_rate.denominator() != 0 {
            frame_rate.numerator() as f64 / frame_rate.denominator() as f64
        } else {
            0.0
        };

        let codec = decoder
            .codec()
            .map(|codec| codec.name().to_string())
            .unwrap_or_else(|| "unknown".to_string());

        let metadata = MediaMetadata {
            duration: Duration::from_secs_f64(duration_seconds),
            format: input.format().name().to_string(),
            video: VideoMetadata {
                width,
                height,
                frames_per_second,
                frame_count: (duration_seconds * frames_per_second) as u64,
                codec,
            },
        };

        log::info!(
            "Opened media: {} (format={}, duration={:.2}s, {}x{} @ {:.2} fps, codec={})",
            self.locator,
            metadata.format,
            duration_seconds,
            width,
            height,
            frames_per_second,
            metadata.video.codec,
        );

        Ok(OpenMedia {
            input,
            decoder,
            stream_index,
            time_base,
            start_pts,
            metadata,
            current: None,
        })
    }
}

/// Decide whether `decoded` settles which frame is visible at `target_pts`.
///
/// The visible frame is the last one whose timestamp does not exceed the
/// target. Frames before the target are parked in `previous` until a later
/// frame shows the target has been passed.
fn settle_frame(
    decoded: &mut VideoFrame,
    previous: &mut Option<VideoFrame>,
    target_pts: i64,
) -> Option<VideoFrame> {
    let pts = decoded.timestamp().or_else(|| decoded.pts()).unwrap_or(0);
    match pts.cmp(&target_pts) {
        Ordering::Less => {
            *previous = Some(mem::replace(decoded, VideoFrame::empty()));
            None
        }
        Ordering::Equal => Some(mem::replace(decoded, VideoFrame::empty())),
        Ordering::Greater => Some(
            previous
                .take()
                .unwrap_or_else(|| mem::replace(decoded, VideoFrame::empty())),
        ),
    }
}

impl MediaSource for MediaFile {
    fn locator(&self) -> &str {
        &self.locator
    }

    fn load_metadata(&mut self) -> Result<MediaMetadata, TimeloopError> {
        if let Some(open) = &self.open {
            return Ok(open.metadata.clone());
        }
        let open = self.open_media()?;
        let metadata = open.metadata.clone();
        self.open = Some(open);
        Ok(metadata)
    }

    fn seek(&mut self, position: Duration, deadline: Option<Instant>) -> Result<(), TimeloopError> {
        let started = Instant::now();
        let open = self.open.as_mut().ok_or(TimeloopError::MediaNotLoaded)?;
        let timed_out = || TimeloopError::SeekTimeout {
            position,
            timeout: deadline
                .map(|deadline| deadline.saturating_duration_since(started))
                .unwrap_or_default(),
        };

        // Positions are relative to the start of presentation, which is not
        // pts 0 in every container (MPEG-TS, edit lists).
        let seek_timestamp = crate::utilities::duration_to_seek_timestamp(position)
            + crate::utilities::stream_timestamp_to_micros(open.start_pts, open.time_base);
        open.input
            .seek(seek_timestamp, ..seek_timestamp)
            .map_err(|error| TimeloopError::SeekError(format!("{position:?}: {error}")))?;
        open.decoder.flush();
        open.current = None;

        let target_pts =
            crate::utilities::duration_to_stream_timestamp(position, open.time_base) + open.start_pts;
        let mut decoded = VideoFrame::empty();
        let mut previous: Option<VideoFrame> = None;

        for (stream, packet) in open.input.packets() {
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                return Err(timed_out());
            }
            if stream.index() != open.stream_index {
                continue;
            }

            open.decoder.send_packet(&packet)?;
            while open.decoder.receive_frame(&mut decoded).is_ok() {
                if let Some(frame) = settle_frame(&mut decoded, &mut previous, target_pts) {
                    open.current = Some(frame);
                    return Ok(());
                }
            }
        }

        // Ran off the end of the stream: drain the decoder.
        open.decoder.send_eof()?;
        while open.decoder.receive_frame(&mut decoded).is_ok() {
            if let Some(frame) = settle_frame(&mut decoded, &mut previous, target_pts) {
                open.current = Some(frame);
                return Ok(());
            }
        }

        match previous {
            Some(frame) => {
                open.current = Some(frame);
                Ok(())
            }
            None => Err(TimeloopError::SeekError(format!(
                "no frame decoded at {position:?}"
            ))),
        }
    }

    fn capture_frame(&mut self) -> Result<DynamicImage, TimeloopError> {
        let open = self.open.as_ref().ok_or(TimeloopError::MediaNotLoaded)?;
        let frame = open.current.as_ref().ok_or_else(|| {
            TimeloopError::CaptureError("no frame at the current position".to_string())
        })?;

        let width = frame.width();
        let height = frame.height();
        let mut scaler = ScalingContext::get(
            frame.format(),
            width,
            height,
            Pixel::RGB24,
            width,
            height,
            ScalingFlags::BILINEAR,
        )?;
        let mut rgb_frame = VideoFrame::empty();
        scaler.run(frame, &mut rgb_frame)?;

        let buffer = crate::utilities::frame_to_rgb_buffer(&rgb_frame, width, height);
        let image = RgbImage::from_raw(width, height, buffer).ok_or_else(|| {
            TimeloopError::VideoDecodeError(
                "Failed to construct RGB image from decoded frame data".to_string(),
            )
        })?;
        Ok(DynamicImage::ImageRgb8(image))
    }

    fn release(&mut self) {
        if self.open.take().is_some() {
            log::debug!("Released media: {}", self.locator);
        }
    }
}

/// FFmpeg's own console verbosity.
///
/// FFmpeg logs to stderr independently of the Rust `log` facade; this only
/// controls that output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DecoderLogLevel {
    /// Print nothing.
    Quiet,
    /// Errors only.
    #[default]
    Error,
    /// Warnings and errors (FFmpeg's default).
    Warning,
    /// Informational messages.
    Info,
    /// Debugging output.
    Debug,
}

impl DecoderLogLevel {
    /// Parse a level name as accepted on the command line.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "quiet" | "off" => Some(Self::Quiet),
            "error" => Some(Self::Error),
            "warning" | "warn" => Some(Self::Warning),
            "info" => Some(Self::Info),
            "debug" => Some(Self::Debug),
            _ => None,
        }
    }
}

/// Set FFmpeg's internal log level.
pub fn set_decoder_log_level(level: DecoderLogLevel) {
    let level = match level {
        DecoderLogLevel::Quiet => Level::Quiet,
        DecoderLogLevel::Error => Level::Error,
        DecoderLogLevel::Warning => Level::Warning,
        DecoderLogLevel::Info => Level::Info,
        DecoderLogLevel::Debug => Level::Debug,
    };
    ffmpeg_next::util::log::set_level(level);
}
