//! Video analysis through a multimodal model.
//!
//! [`Analyzer`] is the seam the rest of the crate depends on: one call takes
//! the raw media bytes and returns a typed [`AnalysisResult`] whose segments
//! feed the frame extractor. [`GeminiClient`] implements it against Google's
//! `generateContent` REST endpoint, sending the video inline and asking for
//! JSON that matches a fixed response schema.
//!
//! There is no retry policy; provider errors are surfaced with the message
//! the provider returned.

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{error::TimeloopError, segment::AnalysisResult, settings::Settings};

/// Model used when none is configured.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Base URL of the Generative Language API.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Largest upload accepted for analysis (20 MiB).
pub const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// Returned by [`GeminiClient::adapt_prompt_to_product`] when the model
/// produces no text.
pub const ADAPTATION_FALLBACK: &str = "Failed to generate modified prompt.";

const SYSTEM_INSTRUCTION: &str = "\
You are an expert AI Video Prompt Engineer and Cinematographer.
Your task is to analyze a video and reverse-engineer the exact text prompt needed to generate it.

Perform two tasks:
1. GLOBAL ANALYSIS: A comprehensive prompt for the entire video.
2. SCENE BREAKDOWN: Identify 3 to 6 distinct key moments (keyframes) in the video. For each moment, provide the timestamp, a description, and a specific generation prompt for that exact shot.

Focus on:
- Subject extraction
- Camera movement specific to the shot
- Lighting conditions
";

const ANALYSIS_REQUEST: &str = "Analyze this video. Provide a main prompt and break it down into key visual segments with specific prompts for each. Return ONLY valid JSON.";

/// Check an upload before it is sent for analysis.
///
/// ```
/// use timeloop::analysis::validate_upload;
///
/// assert!(validate_upload(1024, "video/mp4").is_ok());
/// assert!(validate_upload(1024, "image/png").is_err());
/// assert!(validate_upload(21 * 1024 * 1024, "video/webm").is_err());
/// ```
///
/// # Errors
///
/// Returns [`TimeloopError::UploadRejected`] for empty uploads, non-video
/// MIME types, and anything larger than [`MAX_UPLOAD_BYTES`].
pub fn validate_upload(size: usize, mime_type: &str) -> Result<(), TimeloopError> {
    if !mime_type.trim().to_ascii_lowercase().starts_with("video/") {
        return Err(TimeloopError::UploadRejected(format!(
            "expected a video file, got {mime_type:?}"
        )));
    }
    if size == 0 {
        return Err(TimeloopError::UploadRejected("upload is empty".to_string()));
    }
    if size > MAX_UPLOAD_BYTES {
        return Err(TimeloopError::UploadRejected(format!(
            "file size {:.1} MB exceeds the {} MB limit",
            size as f64 / (1024.0 * 1024.0),
            MAX_UPLOAD_BYTES / (1024 * 1024)
        )));
    }
    Ok(())
}

/// Produces an [`AnalysisResult`] from raw media.
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Analyze `media` encoded as `mime_type`.
    async fn analyze(&self, media: &[u8], mime_type: &str) -> Result<AnalysisResult, TimeloopError>;
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
}

impl<'a> Part<'a> {
    fn text(text: &'a str) -> Self {
        Self {
            inline_data: None,
            text: Some(text),
        }
    }

    fn inline(mime_type: &'a str, data: String) -> Self {
        Self {
            inline_data: Some(InlineData { mime_type, data }),
            text: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct InlineData<'a> {
    mime_type: &'a str,
    data: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    response_mime_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

impl GenerateResponse {
    fn first_text(self) -> Option<String> {
        self.candidates
            .into_iter()
            .next()?
            .content?
            .parts
            .into_iter()
            .next()?
            .text
            .filter(|text| !text.trim().is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

fn response_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "masterPrompt": {
                "type": "STRING",
                "description": "The master prompt for the entire video."
            },
            "details": {
                "type": "OBJECT",
                "properties": {
                    "subject": { "type": "STRING" },
                    "action": { "type": "STRING" },
                    "camera": { "type": "STRING" },
                    "lighting": { "type": "STRING" },
                    "style": { "type": "STRING" }
                },
                "required": ["subject", "camera", "lighting", "style"]
            },
            "segments": {
                "type": "ARRAY",
                "description": "Key visual moments in the video.",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "timestamp": { "type": "STRING", "description": "Time format MM:SS" },
                        "timestampSeconds": { "type": "NUMBER", "description": "Time in seconds" },
                        "description": { "type": "STRING" },
                        "prompt": { "type": "STRING" }
                    },
                    "required": ["timestamp", "timestampSeconds", "description", "prompt"]
                }
            }
        },
        "required": ["masterPrompt", "details", "segments"]
    })
}

/// Strip a Markdown code fence the model sometimes wraps JSON in.
fn strip_code_fence(text: &str) -> &str {
    let text = text.trim();
    let text = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))
        .unwrap_or(text);
    text.strip_suffix("```").unwrap_or(text).trim()
}

/// Client for the Gemini `generateContent` endpoint.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    api_key: String,
    model: String,
    base_url: String,
    client: Client,
}

impl GeminiClient {
    /// Create a client for the default model.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            client: Client::new(),
        }
    }

    /// Create a client from loaded [`Settings`].
    ///
    /// # Errors
    ///
    /// Returns [`TimeloopError::Configuration`] if no API key is set.
    pub fn from_settings(settings: &Settings) -> Result<Self, TimeloopError> {
        let api_key = Settings::require(&settings.gemini_api_key, "GEMINI_API_KEY")?;
        Ok(Self::new(api_key).with_model(settings.gemini_model.clone()))
    }

    /// Use a different model.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Point the client at a different API root.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// The configured model name.
    pub fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: &GenerateRequest<'_>) -> Result<Option<String>, TimeloopError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        log::debug!("POST {url}");

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorEnvelope>(&body)
                .map(|envelope| envelope.error.message)
                .unwrap_or_else(|_| format!("Gemini API returned {status}"));
            log::warn!("Gemini request failed with {status}: {message}");
            return Err(TimeloopError::Analysis(message));
        }

        let response: GenerateResponse = response.json().await?;
        Ok(response.first_text())
    }

    /// Rewrite `original_prompt` so it features the product in `image`.
    ///
    /// Camera, lighting, style, and action are kept; the main subject is
    /// replaced with a description of the product. Returns plain text, or
    /// [`ADAPTATION_FALLBACK`] when the model produces nothing.
    ///
    /// # Errors
    ///
    /// Returns [`TimeloopError::Analysis`] with the provider's message on an
    /// error response, or [`TimeloopError::Http`] if the request fails.
    pub async fn adapt_prompt_to_product(
        &self,
        original_prompt: &str,
        image: &[u8],
        image_mime_type: &str,
    ) -> Result<String, TimeloopError> {
        let instruction = format!(
            "ORIGINAL PROMPT: \"{original_prompt}\"\n\n\
             TASK: Rewrite the ORIGINAL PROMPT to feature the specific product shown in the attached image.\n\
             1. Keep the original camera angles, lighting, style, and action exactly the same.\n\
             2. Replace the original subject's clothing or the main object with a detailed description of the product in the image.\n\
             3. Ensure the description includes the color, texture, logo, and fit of the product in the image.\n\n\
             Return ONLY the modified prompt text, nothing else."
        );

        let request = GenerateRequest {
            system_instruction: None,
            contents: vec![Content {
                parts: vec![
                    Part::inline(image_mime_type, STANDARD.encode(image)),
                    Part::text(&instruction),
                ],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "text/plain",
                response_schema: None,
            },
        };

        let text = self.generate(&request).await?;
        Ok(text
            .map(|text| text.trim().to_string())
            .unwrap_or_else(|| ADAPTATION_FALLBACK.to_string()))
    }
}

#[async_trait]
impl Analyzer for GeminiClient {
    async fn analyze(&self, media: &[u8], mime_type: &str) -> Result<AnalysisResult, TimeloopError> {
        log::info!(
            "Analyzing {} bytes of {mime_type} with {}",
            media.len(),
            self.model
        );

        let request = GenerateRequest {
            system_instruction: Some(Content {
                parts: vec![Part::text(SYSTEM_INSTRUCTION)],
            }),
            contents: vec![Content {
                parts: vec![
                    Part::inline(mime_type, STANDARD.encode(media)),
                    Part::text(ANALYSIS_REQUEST),
                ],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
                response_schema: Some(response_schema()),
            },
        };

        let text = self
            .generate(&request)
            .await?
            .ok_or_else(|| TimeloopError::Analysis("No response from Gemini".to_string()))?;

        let result = AnalysisResult::from_json(strip_code_fence(&text))?;
        log::info!(
            "Analysis returned {} segments",
            result.segments.len()
        );
        Ok(result)
    }
}
