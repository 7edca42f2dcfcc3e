//! Extraction configuration.
//!
//! [`ExtractOptions`] is a builder that threads progress callbacks,
//! cancellation tokens, seek timeouts, and the capture encoding through
//! [`FrameExtractor`](crate::FrameExtractor) without widening every signature.
//!
//! # Example
//!
//! ```
//! use std::{sync::Arc, time::Duration};
//!
//! use timeloop::{CancellationToken, CaptureFormat, ExtractOptions, ProgressCallback, ProgressInfo};
//!
//! struct LogProgress;
//! impl ProgressCallback for LogProgress {
//!     fn on_progress(&self, info: &ProgressInfo) {
//!         println!("{} of {} segments", info.current, info.total);
//!     }
//! }
//!
//! let token = CancellationToken::new();
//! let options = ExtractOptions::new()
//!     .with_progress(Arc::new(LogProgress))
//!     .with_cancellation(token.clone())
//!     .with_seek_timeout(Duration::from_secs(5))
//!     .with_capture_format(CaptureFormat::Jpeg { quality: 90 });
//! assert_eq!(options.seek_timeout(), Some(Duration::from_secs(5)));
//! ```

use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    sync::Arc,
    time::Duration,
};

use crate::progress::{CancellationToken, NoOpProgress, ProgressCallback};

/// Default JPEG quality for captured keyframes.
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

/// Encoding applied to each captured frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureFormat {
    /// Lossy JPEG at the given quality (1-100).
    Jpeg {
        /// Encoder quality. Values outside 1-100 are clamped.
        quality: u8,
    },
    /// Lossless PNG.
    Png,
}

impl Default for CaptureFormat {
    fn default() -> Self {
        CaptureFormat::Jpeg {
            quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl CaptureFormat {
    /// MIME type of images produced in this format.
    pub fn mime_type(self) -> &'static str {
        match self {
            CaptureFormat::Jpeg { .. } => "image/jpeg",
            CaptureFormat::Png => "image/png",
        }
    }
}

/// Configuration for a frame extraction batch.
///
/// A default-constructed value reports nothing, never cancels, waits
/// indefinitely for seeks, and encodes JPEG at quality 80.
#[derive(Clone)]
pub struct ExtractOptions {
    pub(crate) progress: Arc<dyn ProgressCallback>,
    pub(crate) cancellation: Option<CancellationToken>,
    pub(crate) batch_size: u64,
    pub(crate) seek_timeout: Option<Duration>,
    pub(crate) capture_format: CaptureFormat,
}

impl Debug for ExtractOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("ExtractOptions")
            .field("has_cancellation", &self.cancellation.is_some())
            .field("batch_size", &self.batch_size)
            .field("seek_timeout", &self.seek_timeout)
            .field("capture_format", &self.capture_format)
            .finish_non_exhaustive()
    }
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtractOptions {
    /// Create options with default settings.
    pub fn new() -> Self {
        Self {
            progress: Arc::new(NoOpProgress),
            cancellation: None,
            batch_size: 1,
            seek_timeout: None,
            capture_format: CaptureFormat::default(),
        }
    }

    /// Attach a progress callback.
    ///
    /// The callback is invoked every [`batch_size`](ExtractOptions::with_batch_size)
    /// segments and on every state transition.
    #[must_use]
    pub fn with_progress(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = callback;
        self
    }

    /// Attach a cancellation token.
    ///
    /// The token is checked before each seek. Once cancelled no further
    /// segment is processed, the media is still released, and the batch
    /// fails with [`TimeloopError::Cancelled`](crate::TimeloopError::Cancelled).
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Set how often the progress callback fires (every N segments).
    ///
    /// Clamped to a minimum of 1.
    #[must_use]
    pub fn with_batch_size(mut self, size: u64) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Give up on a seek after `timeout`.
    ///
    /// An expired seek counts as a failure of that segment only.
    #[must_use]
    pub fn with_seek_timeout(mut self, timeout: Duration) -> Self {
        self.seek_timeout = Some(timeout);
        self
    }

    /// Set the encoding for captured frames.
    #[must_use]
    pub fn with_capture_format(mut self, format: CaptureFormat) -> Self {
        self.capture_format = format;
        self
    }

    /// The configured per-seek timeout.
    pub fn seek_timeout(&self) -> Option<Duration> {
        self.seek_timeout
    }

    /// The configured capture encoding.
    pub fn capture_format(&self) -> CaptureFormat {
        self.capture_format
    }

    /// Returns `true` if cancellation has been requested.
    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(|token| token.is_cancelled())
    }
}
