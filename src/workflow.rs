//! Upload-analyze-capture workflow.
//!
//! [`AppState`] is the state of one user session as a tagged union. It only
//! changes through [`Session::apply`], and only in response to a
//! [`WorkflowEvent`]: a selected upload, a request to analyze, or the
//! completion or failure of the analysis and keyframe capture.
//!
//! ```text
//! Idle --select--> Preview --analyze--> Analyzing --complete--> Success
//!                     ^                     |
//!                     |                     +------fail-------> Error --analyze--> Analyzing
//!                     +------------select (from any settled state)
//! ```
//!
//! [`Session::run`] drives a whole attempt: analysis first, then keyframe
//! capture on the returned segments. A fatal capture failure fails the whole
//! attempt; partial results are never shown.

use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    mem,
    sync::Arc,
};

use crate::{
    analysis::{Analyzer, validate_upload},
    configuration::ExtractOptions,
    error::TimeloopError,
    media::MediaSource,
    segment::{AnalysisResult, Segment},
    stream::{ExtractionFuture, extract_frames, extract_frames_with},
};

/// Message shown when a failure carries no text of its own.
pub const GENERIC_FAILURE_MESSAGE: &str = "Analysis sequence failed.";

/// A validated video upload.
#[derive(Clone)]
pub struct VideoUpload {
    data: Arc<[u8]>,
    mime_type: String,
    file_name: Option<String>,
}

impl Debug for VideoUpload {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("VideoUpload")
            .field("bytes", &self.data.len())
            .field("mime_type", &self.mime_type)
            .field("file_name", &self.file_name)
            .finish()
    }
}

impl VideoUpload {
    /// Validate and wrap an upload.
    ///
    /// # Errors
    ///
    /// Returns [`TimeloopError::UploadRejected`] for non-video MIME types,
    /// empty uploads, and uploads over the size limit.
    pub fn new(data: impl Into<Arc<[u8]>>, mime_type: impl Into<String>) -> Result<Self, TimeloopError> {
        let data = data.into();
        let mime_type = mime_type.into();
        validate_upload(data.len(), &mime_type)?;
        Ok(Self {
            data,
            mime_type,
            file_name: None,
        })
    }

    /// Record the original file name.
    #[must_use]
    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    /// The raw media bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// MIME type reported for the upload.
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Original file name, if known.
    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }
}

/// Progress within [`AppState::Analyzing`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisStage {
    /// Waiting for the model.
    Analyzing,
    /// Capturing keyframes for the returned segments.
    CapturingKeyframes,
}

/// The state of a session.
#[derive(Debug, Clone, Default)]
pub enum AppState {
    /// Nothing selected.
    #[default]
    Idle,
    /// An upload is selected and can be analyzed.
    Preview {
        /// The selected upload.
        upload: VideoUpload,
    },
    /// An attempt is in flight.
    Analyzing {
        /// The upload being analyzed.
        upload: VideoUpload,
        /// How far the attempt has got.
        stage: AnalysisStage,
    },
    /// The attempt finished.
    Success {
        /// The analyzed upload.
        upload: VideoUpload,
        /// The assembled result, keyframes attached.
        result: AnalysisResult,
    },
    /// The attempt failed; it can be retried.
    Error {
        /// The upload that failed.
        upload: VideoUpload,
        /// What went wrong.
        message: String,
    },
}

impl AppState {
    /// Name of the state, for diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            AppState::Idle => "idle",
            AppState::Preview { .. } => "preview",
            AppState::Analyzing { .. } => "analyzing",
            AppState::Success { .. } => "success",
            AppState::Error { .. } => "error",
        }
    }

    /// The upload the session is working on, if any.
    pub fn upload(&self) -> Option<&VideoUpload> {
        match self {
            AppState::Idle => None,
            AppState::Preview { upload }
            | AppState::Analyzing { upload, .. }
            | AppState::Success { upload, .. }
            | AppState::Error { upload, .. } => Some(upload),
        }
    }

    /// The finished result, in [`AppState::Success`].
    pub fn result(&self) -> Option<&AnalysisResult> {
        match self {
            AppState::Success { result, .. } => Some(result),
            _ => None,
        }
    }
}

/// Something that happened to a session.
#[derive(Debug, Clone)]
pub enum WorkflowEvent {
    /// The user picked a video.
    VideoSelected(VideoUpload),
    /// The user asked to analyze (or retry).
    AnalyzeRequested,
    /// Analysis returned segments and capture has started.
    KeyframeCaptureStarted,
    /// Analysis and capture finished.
    AnalysisCompleted(AnalysisResult),
    /// Analysis or capture failed fatally.
    AnalysisFailed(String),
    /// Start over.
    Reset,
}

impl WorkflowEvent {
    /// Name of the event, for diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            WorkflowEvent::VideoSelected(_) => "video-selected",
            WorkflowEvent::AnalyzeRequested => "analyze-requested",
            WorkflowEvent::KeyframeCaptureStarted => "keyframe-capture-started",
            WorkflowEvent::AnalysisCompleted(_) => "analysis-completed",
            WorkflowEvent::AnalysisFailed(_) => "analysis-failed",
            WorkflowEvent::Reset => "reset",
        }
    }
}

/// One user's progress through the workflow.
#[derive(Debug, Clone, Default)]
pub struct Session {
    state: AppState,
}

impl Session {
    /// Start in [`AppState::Idle`].
    pub fn new() -> Self {
        Self::default()
    }

    /// The current state.
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Apply an event.
    ///
    /// # Errors
    ///
    /// Returns [`TimeloopError::InvalidTransition`] and leaves the state
    /// untouched if the current state does not accept the event.
    pub fn apply(&mut self, event: WorkflowEvent) -> Result<&AppState, TimeloopError> {
        let current = mem::take(&mut self.state);
        let state_name = current.name();
        let event_name = event.name();

        let next = match (current, event) {
            (AppState::Analyzing { upload, stage }, WorkflowEvent::VideoSelected(_)) => {
                Err(AppState::Analyzing { upload, stage })
            }
            (_, WorkflowEvent::VideoSelected(upload)) => Ok(AppState::Preview { upload }),

            (AppState::Preview { upload } | AppState::Error { upload, .. }, WorkflowEvent::AnalyzeRequested) => {
                Ok(AppState::Analyzing {
                    upload,
                    stage: AnalysisStage::Analyzing,
                })
            }

            (AppState::Analyzing { upload, .. }, WorkflowEvent::KeyframeCaptureStarted) => {
                Ok(AppState::Analyzing {
                    upload,
                    stage: AnalysisStage::CapturingKeyframes,
                })
            }
            (AppState::Analyzing { upload, .. }, WorkflowEvent::AnalysisCompleted(result)) => {
                Ok(AppState::Success { upload, result })
            }
            (AppState::Analyzing { upload, .. }, WorkflowEvent::AnalysisFailed(message)) => {
                let message = if message.trim().is_empty() {
                    GENERIC_FAILURE_MESSAGE.to_string()
                } else {
                    message
                };
                Ok(AppState::Error { upload, message })
            }

            (_, WorkflowEvent::Reset) => Ok(AppState::Idle),

            (current, _) => Err(current),
        };

        match next {
            Ok(state) => {
                log::debug!("Session {state_name} -> {} on {event_name}", state.name());
                self.state = state;
                Ok(&self.state)
            }
            Err(unchanged) => {
                self.state = unchanged;
                Err(TimeloopError::InvalidTransition {
                    state: state_name,
                    event: event_name,
                })
            }
        }
    }

    /// Analyze the selected upload and capture keyframes from the media at
    /// `locator`.
    ///
    /// The media is opened on the extraction thread. See
    /// [`run_with_source`](Session::run_with_source) for the transitions.
    ///
    /// # Errors
    ///
    /// See [`run_with_source`](Session::run_with_source).
    pub async fn run<A>(
        &mut self,
        analyzer: &A,
        locator: impl Into<String>,
        options: ExtractOptions,
    ) -> Result<&AnalysisResult, TimeloopError>
    where
        A: Analyzer + ?Sized,
    {
        let locator = locator.into();
        self.drive(analyzer, move |segments| extract_frames(locator, segments, options))
            .await
    }

    /// Analyze the selected upload and capture keyframes from `source`.
    ///
    /// Moves the session to `Analyzing`, then to `Success` with the
    /// assembled result, or to `Error` if analysis fails or the media cannot
    /// be loaded. Capture is skipped when the model returns no segments.
    ///
    /// # Errors
    ///
    /// Returns [`TimeloopError::InvalidTransition`] unless the session is in
    /// `Preview` or `Error`; otherwise the error that moved it to `Error`.
    pub async fn run_with_source<A, S>(
        &mut self,
        analyzer: &A,
        source: S,
        options: ExtractOptions,
    ) -> Result<&AnalysisResult, TimeloopError>
    where
        A: Analyzer + ?Sized,
        S: MediaSource + Send + 'static,
    {
        self.drive(analyzer, move |segments| {
            extract_frames_with(source, segments, options)
        })
        .await
    }

    async fn drive<A, F>(&mut self, analyzer: &A, extract: F) -> Result<&AnalysisResult, TimeloopError>
    where
        A: Analyzer + ?Sized,
        F: FnOnce(Vec<Segment>) -> ExtractionFuture,
    {
        self.apply(WorkflowEvent::AnalyzeRequested)?;
        let upload = self
            .state
            .upload()
            .cloned()
            .ok_or(TimeloopError::InvalidTransition {
                state: "analyzing",
                event: "analyze-requested",
            })?;

        match self.attempt(analyzer, &upload, extract).await {
            Ok(result) => {
                self.apply(WorkflowEvent::AnalysisCompleted(result))?;
            }
            Err(error) => {
                log::error!("Analysis attempt failed: {error}");
                self.apply(WorkflowEvent::AnalysisFailed(error.to_string()))?;
                return Err(error);
            }
        }

        self.state.result().ok_or(TimeloopError::InvalidTransition {
            state: "success",
            event: "analysis-completed",
        })
    }

    async fn attempt<A, F>(
        &mut self,
        analyzer: &A,
        upload: &VideoUpload,
        extract: F,
    ) -> Result<AnalysisResult, TimeloopError>
    where
        A: Analyzer + ?Sized,
        F: FnOnce(Vec<Segment>) -> ExtractionFuture,
    {
        let mut result = analyzer.analyze(upload.data(), upload.mime_type()).await?;
        if result.segments.is_empty() {
            return Ok(result);
        }

        self.apply(WorkflowEvent::KeyframeCaptureStarted)?;
        let segments = mem::take(&mut result.segments);
        result.segments = extract(segments).await?;
        Ok(result)
    }
}
