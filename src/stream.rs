//! Async entry points for frame extraction.
//!
//! Decoding is CPU-bound FFmpeg work, so both entry points run the
//! sequential [`FrameExtractor`] on a `tokio::task::spawn_blocking` thread.
//! [`ExtractionFuture`] resolves to the whole batch; [`CaptureStream`]
//! yields each segment as soon as it has been processed.
//!
//! # Example
//!
//! ```no_run
//! use timeloop::{ExtractOptions, Segment, TimeloopError, extract_frames};
//!
//! # async fn example() -> Result<(), TimeloopError> {
//! let segments = vec![Segment::new(2.0, "opening", ""), Segment::new(30.0, "finale", "")];
//! let segments = extract_frames("input.mp4", segments, ExtractOptions::new()).await?;
//! println!("{} frames captured", segments.iter().filter(|s| s.has_image()).count());
//! # Ok(())
//! # }
//! ```

use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use tokio::{
    sync::mpsc::{Receiver, Sender},
    task::{JoinError, JoinHandle},
};
use tokio_stream::Stream;

use crate::{
    configuration::ExtractOptions,
    error::TimeloopError,
    extractor::FrameExtractor,
    media::{MediaFile, MediaSource},
    segment::Segment,
};

/// Bounded channel capacity for [`CaptureStream`].
///
/// Each item carries an encoded image, so keep it small.
const DEFAULT_CHANNEL_CAPACITY: usize = 4;

/// A future resolving to the segments of one extraction batch.
///
/// Dropping the future does not stop the blocking extraction; use a
/// [`CancellationToken`](crate::CancellationToken) for that.
pub struct ExtractionFuture {
    handle: JoinHandle<Result<Vec<Segment>, TimeloopError>>,
}

impl Future for ExtractionFuture {
    type Output = Result<Vec<Segment>, TimeloopError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.handle)
            .poll(cx)
            .map(|result| result.unwrap_or_else(|error| Err(join_failure(error))))
    }
}

/// A panicked task is an error of its own; an aborted one counts as cancelled.
fn join_failure(error: JoinError) -> TimeloopError {
    if error.is_panic() {
        log::error!("Extraction task panicked: {error}");
        TimeloopError::TaskPanicked(error.to_string())
    } else {
        log::warn!("Extraction task aborted: {error}");
        TimeloopError::Cancelled
    }
}

/// Capture keyframes for `segments` from the media at `locator`.
///
/// The media is opened on the blocking thread and released before the
/// future resolves. Must be called from within a Tokio runtime.
pub fn extract_frames(
    locator: impl Into<String>,
    segments: Vec<Segment>,
    options: ExtractOptions,
) -> ExtractionFuture {
    let locator = locator.into();
    let handle = tokio::task::spawn_blocking(move || {
        let mut media = MediaFile::new(locator);
        FrameExtractor::new(options).extract(&mut media, segments)
    });
    ExtractionFuture { handle }
}

/// Capture keyframes from a caller-supplied [`MediaSource`].
///
/// The source is moved onto the blocking thread for the duration of the
/// batch, which keeps it out of reach of any concurrent extraction.
pub fn extract_frames_with<S>(
    mut source: S,
    segments: Vec<Segment>,
    options: ExtractOptions,
) -> ExtractionFuture
where
    S: MediaSource + Send + 'static,
{
    let handle = tokio::task::spawn_blocking(move || {
        FrameExtractor::new(options).extract(&mut source, segments)
    });
    ExtractionFuture { handle }
}

/// Segments delivered one at a time as they are processed.
///
/// Items are `(index, segment)` in input order. A fatal load error arrives
/// as the only item. Dropping the stream stops the extraction after the
/// segment in flight.
///
/// ```no_run
/// use tokio_stream::StreamExt;
///
/// use timeloop::{ExtractOptions, Segment, TimeloopError, capture_stream};
///
/// # async fn example() -> Result<(), TimeloopError> {
/// let mut stream = capture_stream("input.mp4", vec![Segment::new(1.0, "", "")], ExtractOptions::new());
/// while let Some(item) = stream.next().await {
///     let (index, segment) = item?;
///     println!("{index}: captured={}", segment.has_image());
/// }
/// # Ok(())
/// # }
/// ```
pub struct CaptureStream {
    receiver: Receiver<Result<(usize, Segment), TimeloopError>>,
    #[allow(dead_code)]
    handle: JoinHandle<()>,
}

impl Stream for CaptureStream {
    type Item = Result<(usize, Segment), TimeloopError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

/// Stream keyframes for `segments` from the media at `locator`.
pub fn capture_stream(
    locator: impl Into<String>,
    segments: Vec<Segment>,
    options: ExtractOptions,
) -> CaptureStream {
    let locator = locator.into();
    spawn_capture_stream(move || MediaFile::new(locator), segments, options)
}

/// Stream keyframes from a caller-supplied [`MediaSource`].
pub fn capture_stream_with<S>(source: S, segments: Vec<Segment>, options: ExtractOptions) -> CaptureStream
where
    S: MediaSource + Send + 'static,
{
    spawn_capture_stream(move || source, segments, options)
}

fn spawn_capture_stream<S, F>(make_source: F, segments: Vec<Segment>, options: ExtractOptions) -> CaptureStream
where
    S: MediaSource,
    F: FnOnce() -> S + Send + 'static,
{
    let (sender, receiver) = tokio::sync::mpsc::channel(DEFAULT_CHANNEL_CAPACITY);

    let handle = tokio::task::spawn_blocking(move || {
        let mut source = make_source();
        if let Err(error) = stream_segments_blocking(&mut source, segments, options, &sender) {
            // The receiver may already be gone.
            let _ = sender.blocking_send(Err(error));
        }
    });

    CaptureStream { receiver, handle }
}

fn stream_segments_blocking<S: MediaSource>(
    source: &mut S,
    segments: Vec<Segment>,
    options: ExtractOptions,
    sender: &Sender<Result<(usize, Segment), TimeloopError>>,
) -> Result<(), TimeloopError> {
    // Closing the receiver cancels the rest of the batch.
    let token = options.cancellation.clone().unwrap_or_default();
    let options = options.with_cancellation(token.clone());

    let result = FrameExtractor::new(options).extract_each(source, segments, |index, segment| {
        if sender.blocking_send(Ok((index, segment.clone()))).is_err() {
            token.cancel();
        }
    });

    match result {
        Ok(_) => Ok(()),
        Err(TimeloopError::Cancelled) if sender.is_closed() => Ok(()),
        Err(error) => Err(error),
    }
}
