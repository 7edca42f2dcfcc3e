//! # timeloop
//!
//! Reverse-engineer generation prompts from video.
//!
//! A video is sent to a multimodal model, which returns a master prompt, a
//! structured scene breakdown, and a handful of keyframe [`Segment`]s with
//! timestamps. `timeloop` then seeks the video to each timestamp in turn and
//! captures the frame there, so every segment comes back with a still image.
//! Payment integrations (order creation, checkout sessions, verified
//! webhooks) and an HTTP service sit alongside.
//!
//! Decoding is powered by FFmpeg via the
//! [`ffmpeg-next`](https://crates.io/crates/ffmpeg-next) crate.
//!
//! ## Quick Start
//!
//! ### Capture keyframes
//!
//! ```no_run
//! use timeloop::{ExtractOptions, FrameExtractor, MediaFile, Segment};
//!
//! let mut media = MediaFile::new("input.mp4");
//! let segments = vec![
//!     Segment::new(1.5, "establishing shot", "wide aerial view of a coastline"),
//!     Segment::new(99.0, "closing shot", "sunset over water"),
//! ];
//!
//! // Timestamps past the end are clamped to just before it.
//! let segments = FrameExtractor::new(ExtractOptions::new()).extract(&mut media, segments)?;
//! for segment in &segments {
//!     if let Some(image) = segment.captured_image() {
//!         image.save(format!("{}.jpg", segment.timestamp.replace(':', "-")))?;
//!     }
//! }
//! # Ok::<(), timeloop::TimeloopError>(())
//! ```
//!
//! ### Analyze and capture
//!
//! ```no_run
//! # #[cfg(feature = "analysis")]
//! # async fn example() -> Result<(), timeloop::TimeloopError> {
//! use timeloop::{
//!     ExtractOptions, GeminiClient, Session, VideoUpload, WorkflowEvent,
//! };
//!
//! let bytes = std::fs::read("input.mp4")?;
//! let analyzer = GeminiClient::new(std::env::var("GEMINI_API_KEY").unwrap_or_default());
//!
//! let mut session = Session::new();
//! session.apply(WorkflowEvent::VideoSelected(VideoUpload::new(bytes, "video/mp4")?))?;
//! let result = session.run(&analyzer, "input.mp4", ExtractOptions::new()).await?;
//! println!("{}", result.master_prompt);
//! # Ok(())
//! # }
//! ```
//!
//! ## Extraction guarantees
//!
//! - Output has the same length and order as the input; target timestamps
//!   are never rewritten.
//! - Segments are processed strictly one at a time against one source.
//! - A failure for one segment leaves it without an image and the batch
//!   continues; only a media load failure fails the batch.
//! - The source is released exactly once, on every exit path.
//!
//! ### Optional Features
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `async` | `extract_frames` / `capture_stream` on Tokio's blocking pool |
//! | `analysis` | `Analyzer` trait, Gemini client, and the session workflow |
//! | `payments` | Webhook verification, order and checkout-session clients |
//! | `server` | `axum` HTTP service |
//! | `full` | Enables all of the above |
//!
//! ## Requirements
//!
//! FFmpeg development libraries must be installed on your system.

#[cfg(feature = "analysis")]
pub mod analysis;
pub mod capture;
pub mod configuration;
pub mod error;
pub mod extractor;
pub mod media;
pub mod metadata;
#[cfg(feature = "payments")]
pub mod payments;
pub mod plans;
pub mod progress;
pub mod segment;
#[cfg(feature = "server")]
pub mod server;
pub mod settings;
#[cfg(feature = "async")]
pub mod stream;
mod utilities;
#[cfg(feature = "payments")]
pub mod webhook;
#[cfg(feature = "analysis")]
pub mod workflow;

#[cfg(feature = "analysis")]
pub use analysis::{Analyzer, GeminiClient};
pub use capture::encode_image;
pub use configuration::{CaptureFormat, DEFAULT_JPEG_QUALITY, ExtractOptions};
pub use error::TimeloopError;
pub use extractor::{
    END_OF_STREAM_MARGIN_SECONDS, ExtractionState, FrameExtractor, effective_seek_time,
};
pub use media::{DecoderLogLevel, MediaFile, MediaSource, set_decoder_log_level};
pub use metadata::{MediaMetadata, VideoMetadata};
#[cfg(feature = "payments")]
pub use payments::{RazorpayClient, StripeClient};
pub use plans::Plan;
pub use progress::{CancellationToken, ProgressCallback, ProgressInfo};
pub use segment::{AnalysisResult, CapturedImage, SceneDetails, Segment};
pub use settings::Settings;
#[cfg(feature = "async")]
pub use stream::{
    CaptureStream, ExtractionFuture, capture_stream, capture_stream_with, extract_frames,
    extract_frames_with,
};
pub use utilities::format_timestamp;
#[cfg(feature = "payments")]
pub use webhook::{PaymentEvent, PaymentEventHandler, WebhookResponse, handle_webhook};
#[cfg(feature = "analysis")]
pub use workflow::{AppState, Session, VideoUpload, WorkflowEvent};
