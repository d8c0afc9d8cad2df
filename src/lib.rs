//! # page2html
//!
//! Turn a screenshot of a web page into a single self-contained HTML
//! document using a Vision Language Model (VLM).
//!
//! ## Why this crate?
//!
//! Vision models accept images only within hard limits on pixel dimensions
//! and payload size, while full-page screenshots of real sites are often
//! 2 560 px wide and tens of thousands of pixels tall. This crate cuts such
//! screenshots into ordered horizontal bands, compresses each band until it
//! fits, and sends all of them in one request so the model can reconstruct
//! the whole page with consistent styling.
//!
//! ## Pipeline Overview
//!
//! ```text
//! URL
//!  │
//!  ├─ 1. Capture    ScreenshotProvider (headless Chrome, file, fixed bytes)
//!  ├─ 2. Slice      decode + cut into bands of at most max_dimension
//!  ├─ 3. Normalize  JPEG quality ladder 85 → 20 under a 5 MiB base64 ceiling
//!  ├─ 4. Compose    system prompt + "Segment i of n:" labelled images
//!  ├─ 5. Model      one chat-completion call (OpenRouter-compatible)
//!  └─ 6. Output     screenshot + HTML + stats, or screenshot + error
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use page2html::{model_from_config, screenshot_to_html, FileScreenshot, GenerationConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Reads OPENROUTER_API_KEY (required) and HTTP_REFERER (optional)
//!     let config = GenerationConfig::from_env()?;
//!     let model = model_from_config(&config)?;
//!     let provider = FileScreenshot("landing.png".into());
//!
//!     let output = screenshot_to_html("https://example.com", &config, &provider, &model).await?;
//!     match output.generated_html {
//!         Some(html) => println!("{html}"),
//!         None => eprintln!("generation failed: {:?}", output.error),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `cli`    | on      | Enables the `page2html` binary (clap + anyhow + tracing-subscriber) |
//! | `chrome` | off     | `ChromeScreenshot`, full-page capture through headless Chrome |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! page2html = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{GenerationConfig, GenerationConfigBuilder, ImageLimits};
pub use convert::{
    convert_sync, convert_to_file, generate_html, model_from_config, prepare_screenshot,
    screenshot_to_html, PreparedScreenshot,
};
pub use error::{CaptureError, ImageValidationError, ModelError, Page2HtmlError, RetryHint};
pub use output::{Generation, GenerationStats, ScreenshotOutput, SegmentStats};
pub use pipeline::capture::{is_url, FileScreenshot, ScreenshotProvider, StaticScreenshot};
#[cfg(feature = "chrome")]
pub use pipeline::capture::{ChromeOptions, ChromeScreenshot};
pub use pipeline::compose::{compose, ModelRequest};
pub use pipeline::model::{ModelCompletion, OpenRouterClient, VisionModel};
pub use pipeline::normalize::EncodedSegment;
pub use pipeline::slice::ImageSegment;
pub use progress::{GenerationProgressCallback, NoopProgressCallback, ProgressCallback};
