//! Scene segments and analysis results.
//!
//! A [`Segment`] is one candidate keyframe proposed by the analysis model: a
//! target timestamp, a description, and a generation prompt for that shot.
//! The frame extractor attaches a [`CapturedImage`] to each segment it
//! manages to capture. [`AnalysisResult`] bundles the segments with the
//! master prompt and the structured scene details.
//!
//! The serde layout matches the JSON the model is asked to produce
//! (`timestampSeconds`, `description`, `prompt`, ...), so a model response can
//! be deserialized directly and the assembled result serialized back for a
//! browser, with captured images rendered as `screenshotUrl` data URIs.

use std::path::Path;

use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize, Serializer};

use crate::error::TimeloopError;

/// An encoded still image captured from the media.
///
/// Holds the compressed bytes together with their MIME type and the pixel
/// dimensions of the frame they were rasterised from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedImage {
    data: Vec<u8>,
    mime_type: &'static str,
    width: u32,
    height: u32,
}

impl CapturedImage {
    /// Wrap already-encoded image bytes.
    pub fn new(data: Vec<u8>, mime_type: &'static str, width: u32, height: u32) -> Self {
        Self {
            data,
            mime_type,
            width,
            height,
        }
    }

    /// The encoded image bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// MIME type of the encoded bytes (e.g. `"image/jpeg"`).
    pub fn mime_type(&self) -> &'static str {
        self.mime_type
    }

    /// Frame width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Frame height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Render the image as a self-contained `data:` URI.
    ///
    /// # Example
    ///
    /// ```
    /// use timeloop::CapturedImage;
    ///
    /// let image = CapturedImage::new(vec![0xFF, 0xD8], "image/jpeg", 1, 1);
    /// assert_eq!(image.to_data_uri(), "data:image/jpeg;base64,/9g=");
    /// ```
    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, STANDARD.encode(&self.data))
    }

    /// Write the encoded bytes to a file.
    ///
    /// # Errors
    ///
    /// Returns [`TimeloopError::IoError`] if the file cannot be written.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), TimeloopError> {
        std::fs::write(path, &self.data)?;
        Ok(())
    }

    /// Conventional file extension for the MIME type.
    pub fn extension(&self) -> &'static str {
        match self.mime_type {
            "image/png" => "png",
            _ => "jpg",
        }
    }
}

fn serialize_data_uri<S>(image: &Option<CapturedImage>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match image {
        Some(image) => serializer.serialize_some(&image.to_data_uri()),
        None => serializer.serialize_none(),
    }
}

/// One candidate keyframe.
///
/// `target_time_seconds` is untrusted model output: it may be negative or lie
/// beyond the end of the media. The extractor clamps a copy of it when
/// seeking but never rewrites the field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Display label for the timestamp, e.g. `"00:05"`.
    #[serde(default)]
    pub timestamp: String,
    /// Requested seek position in seconds.
    #[serde(rename = "timestampSeconds")]
    pub target_time_seconds: f64,
    /// Human-readable description of the moment.
    #[serde(rename = "description", default)]
    pub label: String,
    /// Generation prompt for this shot, carried through unchanged.
    #[serde(rename = "prompt", default)]
    pub generation_text: String,
    #[serde(
        rename = "screenshotUrl",
        serialize_with = "serialize_data_uri",
        skip_serializing_if = "Option::is_none",
        skip_deserializing
    )]
    captured_image: Option<CapturedImage>,
}

impl Segment {
    /// Create a segment without an image.
    ///
    /// The display timestamp is derived from `target_time_seconds`.
    pub fn new(
        target_time_seconds: f64,
        label: impl Into<String>,
        generation_text: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: crate::utilities::format_timestamp(target_time_seconds),
            target_time_seconds,
            label: label.into(),
            generation_text: generation_text.into(),
            captured_image: None,
        }
    }

    /// The captured image, if extraction succeeded for this segment.
    pub fn captured_image(&self) -> Option<&CapturedImage> {
        self.captured_image.as_ref()
    }

    /// Returns `true` if an image has been attached.
    pub fn has_image(&self) -> bool {
        self.captured_image.is_some()
    }

    /// Attach a captured image.
    ///
    /// An image is set at most once; returns `false` and leaves the existing
    /// image in place if one is already attached.
    pub fn attach_image(&mut self, image: CapturedImage) -> bool {
        if self.captured_image.is_some() {
            return false;
        }
        self.captured_image = Some(image);
        true
    }

    /// Fill in the display timestamp when the model left it empty.
    pub(crate) fn normalize(&mut self) {
        if self.timestamp.trim().is_empty() {
            self.timestamp = crate::utilities::format_timestamp(self.target_time_seconds);
        }
    }
}

/// Structured breakdown of the whole video.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneDetails {
    /// Main subject.
    pub subject: String,
    /// What the subject is doing.
    pub action: String,
    /// Camera movement and framing.
    pub camera: String,
    /// Lighting conditions.
    pub lighting: String,
    /// Visual style.
    #[serde(alias = "aesthetics")]
    pub style: String,
}

/// The model's analysis of a video, optionally augmented with keyframes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Prompt describing the video as a whole.
    #[serde(rename = "masterPrompt", alias = "prompt")]
    pub master_prompt: String,
    /// Structured scene details.
    #[serde(default)]
    pub details: SceneDetails,
    /// Key moments, in the order the model listed them.
    #[serde(default)]
    pub segments: Vec<Segment>,
}

impl AnalysisResult {
    /// Parse the JSON text a model produced.
    ///
    /// Missing display timestamps are derived from the numeric ones.
    ///
    /// # Errors
    ///
    /// Returns [`TimeloopError::Json`] if the text does not match the
    /// expected shape.
    pub fn from_json(text: &str) -> Result<Self, TimeloopError> {
        let mut result: AnalysisResult = serde_json::from_str(text)?;
        for segment in &mut result.segments {
            segment.normalize();
        }
        Ok(result)
    }

    /// Number of segments that carry a captured image.
    pub fn captured_count(&self) -> usize {
        self.segments.iter().filter(|segment| segment.has_image()).count()
    }
}
