//! Result types returned by the top-level entry points.

use serde::{Deserialize, Serialize};

/// The outcome of capturing a page and generating HTML from it.
///
/// `success` is `true` whenever the screenshot was captured. A generation
/// failure leaves `generated_html` empty and fills `error`, so the caller
/// can still show the screenshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenshotOutput {
    pub success: bool,
    /// Human-readable summary of what happened.
    pub message: String,
    /// Base64 of the captured screenshot, exactly as the provider returned it.
    pub image_data: Option<String>,
    pub generated_html: Option<String>,
    /// Description of the generation failure, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub stats: GenerationStats,
}

/// A successful HTML generation from one screenshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Generation {
    pub html: String,
    pub stats: GenerationStats,
}

/// Per-segment encoding facts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentStats {
    pub index: usize,
    pub width: u32,
    pub height: u32,
    /// Source rows `[top, bottom)`.
    pub top: u32,
    pub bottom: u32,
    /// JPEG quality that fit the payload ceiling.
    pub quality: u8,
    /// base64 length in bytes.
    pub encoded_bytes: usize,
}

/// Timing and size statistics for one request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationStats {
    pub source_width: u32,
    pub source_height: u32,
    pub segments: Vec<SegmentStats>,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    /// Model attempts made (1 unless the caller enabled retries).
    pub attempts: u32,
    pub capture_duration_ms: u64,
    pub encode_duration_ms: u64,
    pub model_duration_ms: u64,
    pub total_duration_ms: u64,
}

impl GenerationStats {
    /// Sum of base64 payload sizes across segments.
    pub fn total_encoded_bytes(&self) -> usize {
        self.segments.iter().map(|s| s.encoded_bytes).sum()
    }
}
