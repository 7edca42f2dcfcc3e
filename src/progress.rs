//! Progress reporting and cancellation support.
//!
//! [`ProgressCallback`] observes an extraction batch: it is told about every
//! [`ExtractionState`] transition and receives a [`ProgressInfo`] snapshot
//! as segments complete. [`CancellationToken`] stops a batch between
//! segments.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use timeloop::{
//!     ExtractOptions, ExtractionState, FrameExtractor, MediaFile, ProgressCallback,
//!     ProgressInfo, Segment,
//! };
//!
//! struct PrintProgress;
//!
//! impl ProgressCallback for PrintProgress {
//!     fn on_progress(&self, info: &ProgressInfo) {
//!         println!("{:.0}% ({} captured)", info.percentage(), info.captured);
//!     }
//!
//!     fn on_state(&self, state: ExtractionState) {
//!         println!("-> {state}");
//!     }
//! }
//!
//! let extractor = FrameExtractor::new(ExtractOptions::new().with_progress(Arc::new(PrintProgress)));
//! let mut media = MediaFile::new("input.mp4");
//! let segments = extractor.extract(&mut media, vec![Segment::new(1.0, "intro", "")])?;
//! # Ok::<(), timeloop::TimeloopError>(())
//! ```

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use crate::extractor::ExtractionState;

/// A snapshot of batch progress.
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// Segments processed so far, captured or not.
    pub current: u64,
    /// Segments in the batch.
    pub total: u64,
    /// Segments that received an image so far.
    pub captured: u64,
    /// Wall-clock time since the batch started.
    pub elapsed: Duration,
    /// Estimated time remaining, based on throughput so far.
    pub estimated_remaining: Option<Duration>,
    /// Requested timestamp of the segment just processed.
    pub current_target_seconds: Option<f64>,
}

impl ProgressInfo {
    /// Completion percentage (0.0-100.0). An empty batch is complete.
    pub fn percentage(&self) -> f32 {
        if self.total == 0 {
            100.0
        } else {
            (self.current as f32 / self.total as f32) * 100.0
        }
    }
}

/// Receives progress updates during extraction.
///
/// Callbacks are infallible: they observe but cannot halt the batch. Use a
/// [`CancellationToken`] for that.
pub trait ProgressCallback: Send + Sync {
    /// Called as segments complete.
    fn on_progress(&self, info: &ProgressInfo);

    /// Called on every state transition of the extraction state machine.
    fn on_state(&self, _state: ExtractionState) {}
}

pub(crate) struct NoOpProgress;

impl ProgressCallback for NoOpProgress {
    fn on_progress(&self, _info: &ProgressInfo) {}
}

/// Cooperative cancellation token backed by an [`AtomicBool`].
///
/// Clones share the flag; cancel from any thread.
///
/// ```
/// use timeloop::CancellationToken;
///
/// let token = CancellationToken::new();
/// let shared = token.clone();
/// shared.cancel();
/// assert!(token.is_cancelled());
/// ```
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a new, non-cancelled token.
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request cancellation. All clones observe it.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Check whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracks batch timing and emits callbacks.
pub(crate) struct ProgressTracker {
    callback: Arc<dyn ProgressCallback>,
    total: u64,
    current: u64,
    captured: u64,
    batch_size: u64,
    start_time: Instant,
    since_last_report: u64,
}

impl ProgressTracker {
    pub(crate) fn new(callback: Arc<dyn ProgressCallback>, total: u64, batch_size: u64) -> Self {
        Self {
            callback,
            total,
            current: 0,
            captured: 0,
            batch_size: batch_size.max(1),
            start_time: Instant::now(),
            since_last_report: 0,
        }
    }

    pub(crate) fn transition(&self, state: ExtractionState) {
        log::debug!("Extraction state: {state}");
        self.callback.on_state(state);
    }

    /// Record one processed segment and report if the batch threshold is reached.
    pub(crate) fn advance(&mut self, captured: bool, target_seconds: f64) {
        self.current += 1;
        if captured {
            self.captured += 1;
        }
        self.since_last_report += 1;

        if self.since_last_report >= self.batch_size {
            self.report(Some(target_seconds));
            self.since_last_report = 0;
        }
    }

    /// Emit a final report unless the last advance already did.
    pub(crate) fn finish(&mut self) {
        if self.since_last_report > 0 || self.current == 0 {
            self.report(None);
            self.since_last_report = 0;
        }
    }

    pub(crate) fn captured(&self) -> u64 {
        self.captured
    }

    fn report(&self, current_target_seconds: Option<f64>) {
        let elapsed = self.start_time.elapsed();
        let estimated_remaining = (self.current > 0).then(|| {
            let remaining = self.total.saturating_sub(self.current);
            elapsed.div_f64(self.current as f64).mul_f64(remaining as f64)
        });

        self.callback.on_progress(&ProgressInfo {
            current: self.current,
            total: self.total,
            captured: self.captured,
            elapsed,
            estimated_remaining,
            current_target_seconds,
        });
    }
}
