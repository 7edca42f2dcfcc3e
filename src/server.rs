//! HTTP service.
//!
//! | Route                          | Handler                                  |
//! |--------------------------------|------------------------------------------|
//! | `POST /api/analyze`            | analyze a raw video body, attach keyframes |
//! | `POST /api/webhooks/razorpay`  | verify and acknowledge a payment webhook |
//! | `POST /api/orders`             | create a payment order                   |
//! | `POST /api/checkout-sessions`  | create a hosted checkout session         |
//! | `GET /api/plans`               | subscription plan catalog                |
//! | `GET /health`                  | liveness                                 |
//!
//! Secret keys stay on the server; every collaborator is optional and a
//! request that needs a missing one gets a 500 naming the setting.

use std::{io::Write, sync::Arc};

use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::{HeaderMap, StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use tempfile::NamedTempFile;
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::{
    analysis::{Analyzer, GeminiClient, MAX_UPLOAD_BYTES},
    configuration::ExtractOptions,
    error::TimeloopError,
    payments::{CheckoutRequest, CheckoutSession, OrderRequest, OrderResponse, RazorpayClient, StripeClient},
    plans::{PLANS, Plan},
    segment::AnalysisResult,
    settings::Settings,
    webhook::{LoggingEventHandler, PaymentEventHandler, SIGNATURE_HEADER, handle_webhook},
    workflow::{Session, VideoUpload, WorkflowEvent},
};

/// Error returned by handlers, rendered as `{"error": "..."}`.
#[derive(Debug)]
pub struct ApiError(TimeloopError);

impl From<TimeloopError> for ApiError {
    fn from(error: TimeloopError) -> Self {
        Self(error)
    }
}

impl From<std::io::Error> for ApiError {
    fn from(error: std::io::Error) -> Self {
        Self(TimeloopError::IoError(error))
    }
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match &self.0 {
            TimeloopError::UploadRejected(_)
            | TimeloopError::InvalidPaymentRequest(_)
            | TimeloopError::Json(_)
            | TimeloopError::MissingSignature
            | TimeloopError::InvalidSignature => StatusCode::BAD_REQUEST,
            TimeloopError::MediaOpen { .. }
            | TimeloopError::NoVideoStream
            | TimeloopError::MetadataUnavailable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            TimeloopError::InvalidTransition { .. } => StatusCode::CONFLICT,
            TimeloopError::Analysis(_) | TimeloopError::Http(_) => StatusCode::BAD_GATEWAY,
            TimeloopError::PaymentProvider { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            log::error!("Request failed: {}", self.0);
        } else {
            log::warn!("Request rejected: {}", self.0);
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Shared handler state.
#[derive(Clone)]
pub struct ServerState {
    analyzer: Option<Arc<dyn Analyzer>>,
    razorpay: Option<RazorpayClient>,
    stripe: Option<StripeClient>,
    webhook_secret: Option<Arc<str>>,
    event_handler: Arc<dyn PaymentEventHandler>,
    extract_options: ExtractOptions,
}

impl Default for ServerState {
    fn default() -> Self {
        Self {
            analyzer: None,
            razorpay: None,
            stripe: None,
            webhook_secret: None,
            event_handler: Arc::new(LoggingEventHandler),
            extract_options: ExtractOptions::new(),
        }
    }
}

impl ServerState {
    /// Build state from settings, enabling every collaborator that has
    /// credentials.
    pub fn from_settings(settings: &Settings) -> Self {
        let mut state = Self::default();
        if let Ok(client) = GeminiClient::from_settings(settings) {
            state.analyzer = Some(Arc::new(client));
        }
        state.razorpay = RazorpayClient::from_settings(settings).ok();
        state.stripe = StripeClient::from_settings(settings).ok();
        state.webhook_secret = settings.razorpay_webhook_secret.as_deref().map(Arc::from);
        state
    }

    /// Use `analyzer` for `/api/analyze`.
    #[must_use]
    pub fn with_analyzer(mut self, analyzer: Arc<dyn Analyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    /// Use `client` for `/api/orders`.
    #[must_use]
    pub fn with_razorpay(mut self, client: RazorpayClient) -> Self {
        self.razorpay = Some(client);
        self
    }

    /// Use `client` for `/api/checkout-sessions`.
    #[must_use]
    pub fn with_stripe(mut self, client: StripeClient) -> Self {
        self.stripe = Some(client);
        self
    }

    /// Verify webhooks with `secret`.
    #[must_use]
    pub fn with_webhook_secret(mut self, secret: impl Into<Arc<str>>) -> Self {
        self.webhook_secret = Some(secret.into());
        self
    }

    /// Dispatch verified webhook events to `handler`.
    #[must_use]
    pub fn with_event_handler(mut self, handler: Arc<dyn PaymentEventHandler>) -> Self {
        self.event_handler = handler;
        self
    }

    /// Options for keyframe extraction.
    #[must_use]
    pub fn with_extract_options(mut self, options: ExtractOptions) -> Self {
        self.extract_options = options;
        self
    }
}

/// Build the router.
pub fn router(state: ServerState) -> Router {
    let api = Router::new()
        .route(
            "/analyze",
            post(analyze).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/webhooks/razorpay", post(razorpay_webhook))
        .route("/orders", post(create_order))
        .route("/checkout-sessions", post(create_checkout_session))
        .route("/plans", get(list_plans));

    Router::new()
        .route("/health", get(health))
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `settings.bind_address` and serve until the process exits.
///
/// # Errors
///
/// Returns [`TimeloopError::IoError`] if the address cannot be bound.
pub async fn serve(settings: &Settings) -> Result<(), TimeloopError> {
    let state = ServerState::from_settings(settings);
    let listener = tokio::net::TcpListener::bind(&settings.bind_address).await?;
    log::info!("Listening on {}", listener.local_addr()?);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn list_plans() -> Json<&'static [Plan]> {
    Json(&PLANS[..])
}

fn extension_for(mime_type: &str) -> &'static str {
    match mime_type {
        "video/webm" => ".webm",
        "video/quicktime" => ".mov",
        "video/x-matroska" => ".mkv",
        "video/x-msvideo" => ".avi",
        _ => ".mp4",
    }
}

/// Write an upload to a named temp file on the blocking pool.
async fn persist_upload(body: Bytes, suffix: &'static str) -> Result<NamedTempFile, TimeloopError> {
    tokio::task::spawn_blocking(move || {
        let mut file = tempfile::Builder::new()
            .prefix("timeloop-")
            .suffix(suffix)
            .tempfile()?;
        file.write_all(&body)?;
        file.flush()?;
        Ok::<_, TimeloopError>(file)
    })
    .await
    .map_err(|error| TimeloopError::TaskPanicked(error.to_string()))?
}

async fn analyze(
    State(state): State<ServerState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<AnalysisResult>> {
    let mime_type = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .map(|value| value.trim().to_ascii_lowercase())
        .unwrap_or_default();

    let upload = VideoUpload::new(body.to_vec(), mime_type)?;
    let analyzer = state
        .analyzer
        .clone()
        .ok_or_else(|| TimeloopError::Configuration("GEMINI_API_KEY not configured".to_string()))?;

    // FFmpeg reads from a path; keep the file alive until extraction finishes.
    let file = persist_upload(body, extension_for(upload.mime_type())).await?;
    let locator = file.path().to_string_lossy().into_owned();

    let mut session = Session::new();
    session.apply(WorkflowEvent::VideoSelected(upload))?;
    let result = session
        .run(analyzer.as_ref(), locator, state.extract_options.clone())
        .await?
        .clone();

    log::info!(
        "Analyzed upload: {} segments, {} keyframes",
        result.segments.len(),
        result.captured_count()
    );
    drop(file);
    Ok(Json(result))
}

async fn razorpay_webhook(State(state): State<ServerState>, headers: HeaderMap, body: Bytes) -> Response {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    let outcome = handle_webhook(
        state.webhook_secret.as_deref(),
        &body,
        signature,
        state.event_handler.as_ref(),
    );

    let status = StatusCode::from_u16(outcome.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(outcome.body)).into_response()
}

async fn create_order(
    State(state): State<ServerState>,
    Json(request): Json<OrderRequest>,
) -> ApiResult<Json<OrderResponse>> {
    let client = state
        .razorpay
        .as_ref()
        .ok_or_else(|| TimeloopError::Configuration("Razorpay keys not configured".to_string()))?;
    Ok(Json(client.create_order(&request).await?))
}

async fn create_checkout_session(
    State(state): State<ServerState>,
    Json(request): Json<CheckoutRequest>,
) -> ApiResult<Json<CheckoutSession>> {
    let client = state
        .stripe
        .as_ref()
        .ok_or_else(|| TimeloopError::Configuration("STRIPE_SECRET_KEY not configured".to_string()))?;
    Ok(Json(client.create_checkout_session(&request).await?))
}
