//! Error types for the page2html library.
//!
//! The pipeline has four layers that can fail independently, and each gets
//! its own type so callers can match on the layer instead of on strings:
//!
//! * [`ImageValidationError`] — the screenshot could not be made to fit the
//!   model's input limits (decode failure, a slice still too large, or a
//!   slice that will not compress under the payload ceiling).
//!
//! * [`ModelError`] — the chat-completion call failed or returned a response
//!   with no usable content. Every variant carries a [`RetryHint`] so callers
//!   can implement backoff without parsing messages.
//!
//! * [`CaptureError`] — the screenshot provider could not produce an image.
//!
//! * [`Page2HtmlError`] — **Fatal** errors returned from the top-level entry
//!   points. The layer errors above convert into it with `?`.
//!
//! [`crate::convert::screenshot_to_html`] is the only place where a failure
//! is downgraded: when capture succeeded but generation failed, the caller
//! still receives the screenshot together with the error description.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// All fatal errors returned by the page2html library.
#[derive(Debug, Error)]
pub enum Page2HtmlError {
    // ── Config errors ─────────────────────────────────────────────────────
    /// No API credential was supplied. Fatal at startup, never per-request.
    #[error("No API key configured.\nSet {env_var}=<key> or pass --api-key.")]
    MissingApiKey { env_var: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Input errors ──────────────────────────────────────────────────────
    /// The input is neither an http(s) URL nor a readable image path, or the
    /// pipeline was handed nothing to work with.
    #[error("Invalid input '{input}': {reason}")]
    InvalidInput { input: String, reason: String },

    /// The screenshot provider failed. Distinct from a generation failure:
    /// there is no artefact to hand back to the caller.
    #[error("Failed to capture screenshot of '{url}': {source}\nThe URL might be invalid or the page might be blocking automated access.")]
    CaptureFailed {
        url: String,
        #[source]
        source: CaptureError,
    },

    // ── Pipeline errors ───────────────────────────────────────────────────
    #[error(transparent)]
    Image(#[from] ImageValidationError),

    #[error(transparent)]
    Model(#[from] ModelError),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output HTML file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A screenshot or one of its slices cannot be made compliant with the
/// model's input limits.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ImageValidationError {
    /// The raw screenshot bytes are not a decodable image.
    #[error("Screenshot could not be decoded: {detail}")]
    Decode { detail: String },

    /// The screenshot holds more pixels than the decoder is allowed to
    /// allocate for.
    #[error("Screenshot {width}x{height} exceeds the decode budget of {max_pixels} pixels")]
    PixelBudgetExceeded {
        width: u32,
        height: u32,
        max_pixels: u64,
    },

    /// A segment has a dimension at or above the model's limit. Recompression
    /// cannot fix this; only slicing can.
    #[error("Slice {index} dimensions ({width}x{height}) exceed {max_dimension}px limit")]
    DimensionExceeded {
        index: usize,
        width: u32,
        height: u32,
        max_dimension: u32,
    },

    /// The segment stays above the payload ceiling even at the lowest quality.
    #[error("Slice {index} cannot be compressed to under {max_bytes} bytes even at quality {min_quality} (last attempt: {last_size} bytes)")]
    TooLarge {
        index: usize,
        min_quality: u8,
        max_bytes: usize,
        last_size: usize,
    },

    /// The JPEG encoder itself failed.
    #[error("Slice {index}: JPEG encoding failed at quality {quality}: {detail}")]
    Encode {
        index: usize,
        quality: u8,
        detail: String,
    },
}

/// What a caller may reasonably do after a [`ModelError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryHint {
    /// Wait before retrying. `after` is the server-specified delay when the
    /// provider sent one.
    BackOff { after: Option<Duration> },
    /// The same request may succeed if sent again.
    RetrySame,
    /// Retrying the identical request will not help.
    DoNotRetry,
}

/// Failure of a single chat-completion call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ModelError {
    /// The provider answered with zero choices.
    #[error("Empty response from model API: no choices returned")]
    EmptyResponse,

    /// The first choice carries no message.
    #[error("No message in model API response")]
    NoMessage,

    /// The message content is missing or blank.
    #[error("Empty content in model API response")]
    EmptyContent,

    /// HTTP 429. Check `retry_after_secs` for a server-specified delay.
    #[error("Rate limit exceeded for model '{model}'")]
    RateLimited {
        model: String,
        retry_after_secs: Option<u64>,
    },

    /// The call did not complete in time.
    #[error("Model API call timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    /// The provider rejected the request. `status` is `None` when the error
    /// arrived inside a 200 response body.
    #[error("Model provider error (status {}): {message}", display_status(.status))]
    Provider {
        status: Option<u16>,
        message: String,
    },

    /// Anything not covered above (connection failure, undecodable body).
    #[error("Unexpected error during model API call: {0}")]
    Unknown(String),
}

impl ModelError {
    /// Retry guidance for this failure.
    pub fn retry_hint(&self) -> RetryHint {
        match self {
            ModelError::RateLimited {
                retry_after_secs, ..
            } => RetryHint::BackOff {
                after: retry_after_secs.map(Duration::from_secs),
            },
            ModelError::Timeout { .. } => RetryHint::RetrySame,
            // 5xx from a gateway usually means an upstream hiccup.
            ModelError::Provider {
                status: Some(s), ..
            } if *s >= 500 => RetryHint::BackOff { after: None },
            // A blank answer is a sampling outcome; the same request can
            // produce a full one.
            ModelError::EmptyResponse | ModelError::NoMessage | ModelError::EmptyContent => {
                RetryHint::RetrySame
            }
            ModelError::Provider { .. } | ModelError::Unknown(_) => RetryHint::DoNotRetry,
        }
    }

    pub fn is_retryable(&self) -> bool {
        !matches!(self.retry_hint(), RetryHint::DoNotRetry)
    }
}

fn display_status(status: &Option<u16>) -> String {
    status
        .map(|s| s.to_string())
        .unwrap_or_else(|| "n/a".to_string())
}

/// Failure inside a [`crate::pipeline::capture::ScreenshotProvider`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CaptureError {
    /// The page could not be loaded.
    #[error("navigation failed: {0}")]
    Navigation(String),

    /// The browser could not be launched or driven.
    #[error("browser error: {0}")]
    Browser(String),

    /// A local screenshot file could not be read.
    #[error("failed to read '{path}': {detail}")]
    Io { path: PathBuf, detail: String },

    /// The provider ran but produced no bytes.
    #[error("provider returned no image data")]
    Empty,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimension_exceeded_display() {
        let e = ImageValidationError::DimensionExceeded {
            index: 2,
            width: 8000,
            height: 600,
            max_dimension: 7990,
        };
        let msg = e.to_string();
        assert!(msg.contains("8000x600"), "got: {msg}");
        assert!(msg.contains("7990px"), "got: {msg}");
    }

    #[test]
    fn rate_limit_hint_carries_retry_after() {
        let e = ModelError::RateLimited {
            model: "anthropic/claude-sonnet-4".into(),
            retry_after_secs: Some(30),
        };
        assert_eq!(
            e.retry_hint(),
            RetryHint::BackOff {
                after: Some(Duration::from_secs(30))
            }
        );
        assert!(e.is_retryable());
    }

    #[test]
    fn client_errors_are_not_retryable() {
        let e = ModelError::Provider {
            status: Some(400),
            message: "image too large".into(),
        };
        assert_eq!(e.retry_hint(), RetryHint::DoNotRetry);
        assert!(!ModelError::Unknown("boom".into()).is_retryable());
    }

    #[test]
    fn server_errors_back_off() {
        let e = ModelError::Provider {
            status: Some(502),
            message: "bad gateway".into(),
        };
        assert_eq!(e.retry_hint(), RetryHint::BackOff { after: None });
    }

    #[test]
    fn provider_error_without_status_display() {
        let e = ModelError::Provider {
            status: None,
            message: "overloaded".into(),
        };
        assert!(e.to_string().contains("n/a"));
        assert!(e.to_string().contains("overloaded"));
    }

    #[test]
    fn capture_failed_wraps_source() {
        let e = Page2HtmlError::CaptureFailed {
            url: "https://example.com".into(),
            source: CaptureError::Navigation("net::ERR_NAME_NOT_RESOLVED".into()),
        };
        let msg = e.to_string();
        assert!(msg.contains("example.com"));
        assert!(msg.contains("ERR_NAME_NOT_RESOLVED"));
    }

    #[test]
    fn missing_api_key_names_env_var() {
        let e = Page2HtmlError::MissingApiKey {
            env_var: "OPENROUTER_API_KEY".into(),
        };
        assert!(e.to_string().contains("OPENROUTER_API_KEY"));
    }
}
