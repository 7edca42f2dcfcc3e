//! Error types for the `timeloop` crate.
//!
//! This module defines [`TimeloopError`], the unified error type returned by
//! all fallible operations in the crate. Variants carry the locator, timestamp,
//! or provider status that produced them so a failure can be diagnosed without
//! additional logging at the call site.
//!
//! The frame extractor distinguishes two classes of error. Fatal errors
//! ([`MediaOpen`](TimeloopError::MediaOpen),
//! [`NoVideoStream`](TimeloopError::NoVideoStream),
//! [`MetadataUnavailable`](TimeloopError::MetadataUnavailable)) abort a whole
//! batch. Per-segment errors ([`SeekError`](TimeloopError::SeekError),
//! [`SeekTimeout`](TimeloopError::SeekTimeout),
//! [`CaptureError`](TimeloopError::CaptureError),
//! [`DegenerateTimestamp`](TimeloopError::DegenerateTimestamp)) are logged and
//! swallowed; they only show up as a segment without an image.

use std::{io::Error as IoError, time::Duration};

use ffmpeg_next::Error as FfmpegError;
use image::ImageError;
use thiserror::Error;

/// The unified error type for all `timeloop` operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TimeloopError {
    /// The media resource could not be opened.
    #[error("Failed to open media at {locator}: {reason}")]
    MediaOpen {
        /// Path or URL that was passed to [`crate::MediaFile::new`].
        locator: String,
        /// Underlying reason the open failed.
        reason: String,
    },

    /// The media resource does not contain a video stream.
    #[error("No video stream found in media")]
    NoVideoStream,

    /// Duration or frame dimensions could not be established.
    #[error("Media metadata unavailable: {0}")]
    MetadataUnavailable(String),

    /// An operation that needs loaded media was called before
    /// [`load_metadata`](crate::MediaSource::load_metadata) or after release.
    #[error("Media is not loaded")]
    MediaNotLoaded,

    /// A video frame could not be decoded.
    #[error("Failed to decode video frame: {0}")]
    VideoDecodeError(String),

    /// Seeking to a position failed.
    #[error("Seek failed: {0}")]
    SeekError(String),

    /// A seek did not complete before its deadline.
    #[error("Seek to {position:?} did not complete within {timeout:?}")]
    SeekTimeout {
        /// The clamped seek position.
        position: Duration,
        /// The configured per-seek timeout.
        timeout: Duration,
    },

    /// The clamped seek position is negative or not a finite number.
    #[error("Degenerate seek time {effective} (requested {requested})")]
    DegenerateTimestamp {
        /// The timestamp the model asked for.
        requested: f64,
        /// The result of clamping it against the media duration.
        effective: f64,
    },

    /// Rasterising or encoding the current frame failed.
    #[error("Frame capture failed: {0}")]
    CaptureError(String),

    /// An error originating from the FFmpeg libraries.
    #[error("FFmpeg error: {0}")]
    FfmpegError(String),

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    IoError(#[from] IoError),

    /// An error from the `image` crate during frame encoding.
    #[error("Image processing error: {0}")]
    ImageError(#[from] ImageError),

    /// A JSON payload could not be parsed or produced.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The blocking extraction task panicked.
    #[error("Extraction task panicked: {0}")]
    TaskPanicked(String),

    /// The operation was cancelled via a [`CancellationToken`](crate::CancellationToken).
    #[error("Operation cancelled")]
    Cancelled,

    /// An uploaded video was rejected before analysis.
    #[error("Upload rejected: {0}")]
    UploadRejected(String),

    /// A required setting is missing or malformed.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A workflow event arrived in a state that does not accept it.
    #[error("Cannot apply {event} while {state}")]
    InvalidTransition {
        /// Name of the current application state.
        state: &'static str,
        /// Name of the rejected event.
        event: &'static str,
    },

    /// The analysis model returned an error or an unusable response.
    #[cfg(feature = "analysis")]
    #[error("Analysis failed: {0}")]
    Analysis(String),

    /// An outbound HTTP request failed.
    #[cfg(any(feature = "analysis", feature = "payments"))]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The webhook secret is not configured.
    #[cfg(feature = "payments")]
    #[error("Webhook secret not configured")]
    WebhookSecretMissing,

    /// The webhook request carried no signature header.
    #[cfg(feature = "payments")]
    #[error("Missing signature header")]
    MissingSignature,

    /// The webhook signature does not match the body.
    #[cfg(feature = "payments")]
    #[error("Invalid webhook signature")]
    InvalidSignature,

    /// A payment provider rejected a request.
    #[cfg(feature = "payments")]
    #[error("{provider} returned HTTP {status}: {message}")]
    PaymentProvider {
        /// Provider name (`"razorpay"`, `"stripe"`).
        provider: &'static str,
        /// HTTP status returned by the provider.
        status: u16,
        /// Provider error message.
        message: String,
    },

    /// A payment request was missing a required field.
    #[cfg(feature = "payments")]
    #[error("Invalid payment request: {0}")]
    InvalidPaymentRequest(String),
}

impl From<FfmpegError> for TimeloopError {
    fn from(error: FfmpegError) -> Self {
        TimeloopError::FfmpegError(error.to_string())
    }
}

impl TimeloopError {
    /// Returns `true` for errors that abort a whole extraction batch.
    ///
    /// Everything else raised while processing a single segment is recorded
    /// against that segment and the batch moves on.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TimeloopError::MediaOpen { .. }
                | TimeloopError::NoVideoStream
                | TimeloopError::MetadataUnavailable(_)
                | TimeloopError::TaskPanicked(_)
                | TimeloopError::Cancelled
        )
    }
}
