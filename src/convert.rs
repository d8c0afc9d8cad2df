//! End-to-end entry points: screenshot bytes or URL → HTML.
//!
//! Each call is one independent async task with exactly one outstanding
//! model request. Segments are encoded in order on a blocking-pool thread
//! and all of them travel in a single chat-completion call.
//!
//! ```text
//! capture ──▶ decode ──▶ slice ──▶ normalize ──▶ compose ──▶ model ──▶ (postprocess)
//! (provider)  (RGB)     (bands)   (JPEG/b64)    (messages)  (1 call)   (opt-in)
//! ```

use crate::config::{GenerationConfig, ImageLimits};
use crate::error::{CaptureError, ImageValidationError, ModelError, Page2HtmlError, RetryHint};
use crate::output::{Generation, GenerationStats, ScreenshotOutput, SegmentStats};
use crate::pipeline::capture::ScreenshotProvider;
use crate::pipeline::compose::{compose, ModelRequest};
use crate::pipeline::model::{ModelCompletion, OpenRouterClient, VisionModel};
use crate::pipeline::normalize::{normalize_segment, EncodedSegment};
use crate::pipeline::{postprocess, slice};
use crate::progress::ProgressCallback;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// A screenshot that has been decoded, sliced and encoded.
#[derive(Debug, Clone)]
pub struct PreparedScreenshot {
    pub width: u32,
    pub height: u32,
    pub segments: Vec<EncodedSegment>,
    pub stats: Vec<SegmentStats>,
}

/// Decode, slice and normalize a raw screenshot. CPU-bound and blocking.
///
/// Stops at the first segment that cannot be made compliant.
pub fn prepare_screenshot(
    image_bytes: &[u8],
    limits: &ImageLimits,
    progress: Option<&ProgressCallback>,
) -> Result<PreparedScreenshot, ImageValidationError> {
    let img = slice::decode_screenshot(image_bytes, limits)?;
    let (width, height) = img.dimensions();

    let slices = slice::slice_image(img, limits);
    let total = slices.len();
    info!("Number of slices: {}", total);
    if let Some(cb) = progress {
        cb.on_slicing_complete(width, height, total);
    }

    let mut segments = Vec::with_capacity(total);
    let mut stats = Vec::with_capacity(total);
    for (seg, band) in slices {
        let encoded = normalize_segment(&band, seg.index, limits)?;
        if let Some(cb) = progress {
            cb.on_segment_encoded(seg.index, total, encoded.quality, encoded.data.len());
        }
        stats.push(SegmentStats {
            index: seg.index,
            width: seg.width,
            height: seg.height,
            top: seg.top,
            bottom: seg.bottom,
            quality: encoded.quality,
            encoded_bytes: encoded.data.len(),
        });
        segments.push(encoded);
    }

    Ok(PreparedScreenshot {
        width,
        height,
        segments,
        stats,
    })
}

/// Generate HTML from raw screenshot bytes (PNG or JPEG).
///
/// # Errors
/// * [`Page2HtmlError::Image`] — the screenshot cannot fit the model limits
/// * [`Page2HtmlError::Model`] — the model call failed (after any opt-in
///   retries configured via `max_retries`)
pub async fn generate_html(
    image_bytes: &[u8],
    config: &GenerationConfig,
    model: &dyn VisionModel,
) -> Result<Generation, Page2HtmlError> {
    let total_start = Instant::now();
    let mut stats = GenerationStats::default();
    let html = run_generation(image_bytes, config, model, &mut stats).await?;
    stats.total_duration_ms = total_start.elapsed().as_millis() as u64;

    info!(
        "Generated {} chars of HTML from {} segment(s) in {}ms",
        html.len(),
        stats.segments.len(),
        stats.total_duration_ms
    );

    Ok(Generation { html, stats })
}

/// Capture `url` and generate HTML from the screenshot.
///
/// # Returns
/// * `Err(Page2HtmlError::CaptureFailed)` — nothing was captured
/// * `Ok` with `generated_html: Some(..)` — full success
/// * `Ok` with `generated_html: None` and `error: Some(..)` — the screenshot
///   was captured but generation failed; `image_data` is still populated and
///   `stats` keeps whatever stages completed before the failure
pub async fn screenshot_to_html(
    url: &str,
    config: &GenerationConfig,
    provider: &dyn ScreenshotProvider,
    model: &dyn VisionModel,
) -> Result<ScreenshotOutput, Page2HtmlError> {
    let total_start = Instant::now();
    let (image_bytes, capture_duration_ms) = capture(url, config, provider).await?;
    let image_data = STANDARD.encode(&image_bytes);

    let mut stats = GenerationStats {
        capture_duration_ms,
        ..Default::default()
    };
    let result = run_generation(&image_bytes, config, model, &mut stats).await;
    stats.total_duration_ms = total_start.elapsed().as_millis() as u64;

    match result {
        Ok(html) => Ok(ScreenshotOutput {
            success: true,
            message: "Screenshot captured and HTML generated successfully".into(),
            image_data: Some(image_data),
            generated_html: Some(html),
            error: None,
            stats,
        }),
        Err(e) => {
            warn!("HTML generation failed: {}", e);
            Ok(ScreenshotOutput {
                success: true,
                message: "Screenshot captured but HTML generation failed".into(),
                image_data: Some(image_data),
                generated_html: None,
                error: Some(e.to_string()),
                stats,
            })
        }
    }
}

/// Capture, generate, and write the HTML to `output_path`.
///
/// Uses atomic write (temp file + rename) to prevent partial files. When
/// generation fails nothing is written and the returned output carries the
/// error; the screenshot is still available in `image_data`.
pub async fn convert_to_file(
    url: &str,
    output_path: impl AsRef<Path>,
    config: &GenerationConfig,
    provider: &dyn ScreenshotProvider,
    model: &dyn VisionModel,
) -> Result<ScreenshotOutput, Page2HtmlError> {
    let output = screenshot_to_html(url, config, provider, model).await?;
    if let Some(ref html) = output.generated_html {
        write_atomic(output_path.as_ref(), html.as_bytes()).await?;
        info!("Wrote {}", output_path.as_ref().display());
    }
    Ok(output)
}

/// Synchronous wrapper around [`screenshot_to_html`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    url: &str,
    config: &GenerationConfig,
    provider: &dyn ScreenshotProvider,
    model: &dyn VisionModel,
) -> Result<ScreenshotOutput, Page2HtmlError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Page2HtmlError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(screenshot_to_html(url, config, provider, model))
}

/// Build the default OpenAI-compatible client for `config`.
pub fn model_from_config(config: &GenerationConfig) -> Result<OpenRouterClient, Page2HtmlError> {
    Ok(OpenRouterClient::from_config(config)?)
}

/// Write `bytes` to `path` via a sibling temp file and rename.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), Page2HtmlError> {
    let write_err = |source| Page2HtmlError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    tokio::fs::write(&tmp_path, bytes).await.map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;
    Ok(())
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Decode → encode → compose → model → cleanup, recording each finished
/// stage in `stats` so a later failure still reports the earlier ones.
async fn run_generation(
    image_bytes: &[u8],
    config: &GenerationConfig,
    model: &dyn VisionModel,
    stats: &mut GenerationStats,
) -> Result<String, Page2HtmlError> {
    // ── Step 1: Decode, slice, encode (blocking) ─────────────────────────
    let encode_start = Instant::now();
    let bytes = image_bytes.to_vec();
    let limits = config.limits;
    let cb = config.progress_callback.clone();
    let prepared = tokio::task::spawn_blocking(move || {
        prepare_screenshot(&bytes, &limits, cb.as_ref())
    })
    .await
    .map_err(|e| Page2HtmlError::Internal(format!("Encode task panicked: {}", e)))??;
    stats.encode_duration_ms = encode_start.elapsed().as_millis() as u64;
    stats.source_width = prepared.width;
    stats.source_height = prepared.height;
    stats.segments = prepared.stats;

    // ── Step 2: Compose request ──────────────────────────────────────────
    let request = compose(&prepared.segments, config.system_prompt.as_deref())?;
    drop(prepared.segments);

    // ── Step 3: One model call (plus opt-in retries) ─────────────────────
    let model_start = Instant::now();
    let outcome = call_model(model, &request, config).await;
    stats.model_duration_ms = model_start.elapsed().as_millis() as u64;
    let (completion, attempts) = outcome.map_err(|(e, attempts)| {
        stats.attempts = attempts;
        e
    })?;
    stats.attempts = attempts;
    stats.prompt_tokens = completion.prompt_tokens;
    stats.completion_tokens = completion.completion_tokens;

    // ── Step 4: Optional cleanup ─────────────────────────────────────────
    Ok(if config.postprocess {
        postprocess::clean_html(&completion.content)
    } else {
        completion.content
    })
}

async fn capture(
    url: &str,
    config: &GenerationConfig,
    provider: &dyn ScreenshotProvider,
) -> Result<(Vec<u8>, u64), Page2HtmlError> {
    info!("Capturing screenshot: {}", url);
    if let Some(ref cb) = config.progress_callback {
        cb.on_capture_start(url);
    }

    let start = Instant::now();
    let captured = provider
        .capture(url)
        .await
        .and_then(|bytes| {
            if bytes.is_empty() {
                Err(CaptureError::Empty)
            } else {
                Ok(bytes)
            }
        })
        .map_err(|source| Page2HtmlError::CaptureFailed {
            url: url.to_string(),
            source,
        })?;
    let elapsed = start.elapsed().as_millis() as u64;

    debug!("Captured {} bytes in {}ms", captured.len(), elapsed);
    if let Some(ref cb) = config.progress_callback {
        cb.on_capture_complete(captured.len());
    }
    Ok((captured, elapsed))
}

/// Send `request`, retrying only when the caller opted in via
/// `config.max_retries` and the error's hint allows it.
async fn call_model(
    model: &dyn VisionModel,
    request: &ModelRequest,
    config: &GenerationConfig,
) -> Result<(ModelCompletion, u32), (ModelError, u32)> {
    let cb = config.progress_callback.as_ref();
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        if let Some(cb) = cb {
            cb.on_model_call_start(request.image_count());
        }

        match model.complete(request).await {
            Ok(completion) => {
                if let Some(cb) = cb {
                    cb.on_model_call_complete(completion.content.len());
                }
                return Ok((completion, attempt));
            }
            Err(e) => {
                let will_retry = attempt <= config.max_retries && e.is_retryable();
                if let Some(cb) = cb {
                    cb.on_model_call_error(attempt, e.to_string(), will_retry);
                }
                if !will_retry {
                    return Err((e, attempt));
                }
                let delay = retry_delay(&e, config.retry_backoff_ms, attempt);
                warn!(
                    "{}: attempt {} failed ({}), retrying in {:?}",
                    model.model_name(),
                    attempt,
                    e,
                    delay
                );
                sleep(delay).await;
            }
        }
    }
}

/// Server-specified delay when present, else `backoff_ms * 2^(attempt-1)`.
fn retry_delay(err: &ModelError, backoff_ms: u64, attempt: u32) -> Duration {
    match err.retry_hint() {
        RetryHint::BackOff { after: Some(d) } => d,
        _ => {
            let exp = attempt.saturating_sub(1).min(16);
            Duration::from_millis(backoff_ms.saturating_mul(1u64 << exp))
        }
    }
}
