//! Session workflow integration tests.

#![cfg(feature = "analysis")]

mod common;

use std::sync::{
    Mutex,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use common::{FakeSource, release_count, segments_at};
use timeloop::{
    AnalysisResult, Analyzer, AppState, ExtractOptions, SceneDetails, Session, TimeloopError,
    VideoUpload, WorkflowEvent,
    workflow::{AnalysisStage, GENERIC_FAILURE_MESSAGE},
};

/// Analyzer that replays scripted outcomes, one per call.
struct ScriptedAnalyzer {
    outcomes: Mutex<Vec<Result<AnalysisResult, TimeloopError>>>,
    calls: AtomicUsize,
}

impl ScriptedAnalyzer {
    fn new(outcomes: Vec<Result<AnalysisResult, TimeloopError>>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Analyzer for ScriptedAnalyzer {
    async fn analyze(&self, media: &[u8], mime_type: &str) -> Result<AnalysisResult, TimeloopError> {
        assert!(!media.is_empty());
        assert!(mime_type.starts_with("video/"));
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outcomes.lock().unwrap().remove(0)
    }
}

fn analysis(targets: &[f64]) -> AnalysisResult {
    AnalysisResult {
        master_prompt: "A slow dolly shot through a neon-lit alley".to_string(),
        details: SceneDetails {
            subject: "alley".to_string(),
            camera: "dolly".to_string(),
            ..SceneDetails::default()
        },
        segments: segments_at(targets),
    }
}

fn upload() -> VideoUpload {
    VideoUpload::new(vec![0_u8; 64], "video/mp4")
        .unwrap()
        .with_file_name("clip.mp4")
}

fn previewing() -> Session {
    let mut session = Session::new();
    session.apply(WorkflowEvent::VideoSelected(upload())).unwrap();
    session
}

// ── Transitions ────────────────────────────────────────────────────

#[test]
fn new_session_is_idle() {
    let session = Session::new();
    assert!(matches!(session.state(), AppState::Idle));
    assert!(session.state().upload().is_none());
}

#[test]
fn select_then_analyze() {
    let mut session = previewing();
    assert_eq!(session.state().name(), "preview");
    assert_eq!(session.state().upload().unwrap().file_name(), Some("clip.mp4"));

    session.apply(WorkflowEvent::AnalyzeRequested).unwrap();
    assert!(matches!(
        session.state(),
        AppState::Analyzing { stage: AnalysisStage::Analyzing, .. }
    ));

    session.apply(WorkflowEvent::KeyframeCaptureStarted).unwrap();
    assert!(matches!(
        session.state(),
        AppState::Analyzing { stage: AnalysisStage::CapturingKeyframes, .. }
    ));

    session
        .apply(WorkflowEvent::AnalysisCompleted(analysis(&[1.0])))
        .unwrap();
    assert_eq!(session.state().name(), "success");
    assert_eq!(session.state().result().unwrap().segments.len(), 1);
}

#[test]
fn analyze_requires_an_upload() {
    let mut session = Session::new();
    let error = session.apply(WorkflowEvent::AnalyzeRequested).unwrap_err();

    assert!(matches!(
        error,
        TimeloopError::InvalidTransition { state: "idle", event: "analyze-requested" }
    ));
    assert!(matches!(session.state(), AppState::Idle));
}

#[test]
fn selecting_during_analysis_is_rejected() {
    let mut session = previewing();
    session.apply(WorkflowEvent::AnalyzeRequested).unwrap();

    assert!(session.apply(WorkflowEvent::VideoSelected(upload())).is_err());
    assert_eq!(session.state().name(), "analyzing");
}

#[test]
fn completion_outside_analysis_is_rejected() {
    let mut session = previewing();
    assert!(
        session
            .apply(WorkflowEvent::AnalysisCompleted(analysis(&[])))
            .is_err()
    );
    assert_eq!(session.state().name(), "preview");
}

#[test]
fn blank_failure_message_uses_generic_text() {
    let mut session = previewing();
    session.apply(WorkflowEvent::AnalyzeRequested).unwrap();
    session
        .apply(WorkflowEvent::AnalysisFailed("  ".to_string()))
        .unwrap();

    match session.state() {
        AppState::Error { message, .. } => assert_eq!(message, GENERIC_FAILURE_MESSAGE),
        other => panic!("Expected Error, got: {other:?}"),
    }
}

#[test]
fn error_state_allows_retry_and_reselect() {
    let mut session = previewing();
    session.apply(WorkflowEvent::AnalyzeRequested).unwrap();
    session
        .apply(WorkflowEvent::AnalysisFailed("boom".to_string()))
        .unwrap();

    session.apply(WorkflowEvent::AnalyzeRequested).unwrap();
    assert_eq!(session.state().name(), "analyzing");
    session
        .apply(WorkflowEvent::AnalysisFailed("boom".to_string()))
        .unwrap();

    session.apply(WorkflowEvent::VideoSelected(upload())).unwrap();
    assert_eq!(session.state().name(), "preview");
}

#[test]
fn reset_from_any_state() {
    let mut session = previewing();
    session.apply(WorkflowEvent::AnalyzeRequested).unwrap();
    session.apply(WorkflowEvent::Reset).unwrap();
    assert!(matches!(session.state(), AppState::Idle));
}

#[test]
fn upload_validation() {
    assert!(VideoUpload::new(Vec::new(), "video/mp4").is_err());
    assert!(VideoUpload::new(vec![1_u8], "image/jpeg").is_err());
    let upload = VideoUpload::new(vec![1_u8, 2, 3], "video/webm").unwrap();
    assert_eq!(upload.data(), &[1, 2, 3]);
    assert_eq!(upload.mime_type(), "video/webm");
    assert_eq!(upload.file_name(), None);
}

// ── Full attempts ──────────────────────────────────────────────────

#[tokio::test]
async fn run_attaches_keyframes() {
    let analyzer = ScriptedAnalyzer::new(vec![Ok(analysis(&[2.0, 9.95, 15.0, -1.0]))]);
    let source = FakeSource::new(10.0).fail_capture(2);
    let log = source.call_log();
    let mut session = previewing();

    let result = session
        .run_with_source(&analyzer, source, ExtractOptions::new())
        .await
        .unwrap()
        .clone();

    assert_eq!(result.segments.len(), 4);
    assert_eq!(result.captured_count(), 3);
    assert!(!result.segments[2].has_image());
    assert_eq!(result.master_prompt, "A slow dolly shot through a neon-lit alley");
    assert_eq!(session.state().name(), "success");
    assert_eq!(release_count(&log.lock().unwrap()), 1);
}

#[tokio::test]
async fn run_without_segments_skips_capture() {
    let analyzer = ScriptedAnalyzer::new(vec![Ok(analysis(&[]))]);
    let source = FakeSource::new(10.0);
    let log = source.call_log();
    let mut session = previewing();

    let result = session
        .run_with_source(&analyzer, source, ExtractOptions::new())
        .await
        .unwrap();

    assert!(result.segments.is_empty());
    assert!(log.lock().unwrap().is_empty());
}

#[tokio::test]
async fn analysis_failure_moves_to_error() {
    let analyzer = ScriptedAnalyzer::new(vec![Err(TimeloopError::Analysis(
        "quota exceeded".to_string(),
    ))]);
    let mut session = previewing();

    let error = session
        .run_with_source(&analyzer, FakeSource::new(10.0), ExtractOptions::new())
        .await
        .unwrap_err();

    assert!(matches!(error, TimeloopError::Analysis(_)));
    match session.state() {
        AppState::Error { message, .. } => assert!(message.contains("quota exceeded")),
        other => panic!("Expected Error, got: {other:?}"),
    }
}

#[tokio::test]
async fn fatal_capture_failure_discards_partial_result() {
    let analyzer = ScriptedAnalyzer::new(vec![Ok(analysis(&[1.0, 2.0]))]);
    let mut session = previewing();

    let error = session
        .run_with_source(
            &analyzer,
            FakeSource::new(10.0).failing_load(),
            ExtractOptions::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(error, TimeloopError::MediaOpen { .. }));
    assert_eq!(session.state().name(), "error");
    assert!(session.state().result().is_none());
}

#[tokio::test]
async fn retry_after_failure_runs_analysis_again() {
    let analyzer = ScriptedAnalyzer::new(vec![
        Err(TimeloopError::Analysis("transient".to_string())),
        Ok(analysis(&[1.0])),
    ]);
    let mut session = previewing();

    assert!(
        session
            .run_with_source(&analyzer, FakeSource::new(10.0), ExtractOptions::new())
            .await
            .is_err()
    );
    let result = session
        .run_with_source(&analyzer, FakeSource::new(10.0), ExtractOptions::new())
        .await
        .unwrap();

    assert_eq!(result.captured_count(), 1);
    assert_eq!(analyzer.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn run_from_idle_is_rejected() {
    let analyzer = ScriptedAnalyzer::new(Vec::new());
    let mut session = Session::new();

    let error = session
        .run_with_source(&analyzer, FakeSource::new(10.0), ExtractOptions::new())
        .await
        .unwrap_err();

    assert!(matches!(error, TimeloopError::InvalidTransition { .. }));
    assert_eq!(analyzer.calls.load(Ordering::SeqCst), 0);
}
