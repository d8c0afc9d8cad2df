//! CLI binary for page2html.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `GenerationConfig`, picks a screenshot provider, and prints results.

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use page2html::config::{DEFAULT_BASE_URL, DEFAULT_HTTP_REFERER, DEFAULT_MODEL};
use page2html::convert::write_atomic;
use page2html::{
    is_url, model_from_config, screenshot_to_html, FileScreenshot, GenerationConfig,
    GenerationProgressCallback, ProgressCallback, ScreenshotOutput, ScreenshotProvider,
};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner that follows the single request through its stages and prints
/// one line per encoded segment.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl GenerationProgressCallback for CliProgressCallback {
    fn on_capture_start(&self, url: &str) {
        self.bar.set_prefix("Capturing");
        self.bar.set_message(url.to_string());
    }

    fn on_capture_complete(&self, bytes: usize) {
        self.bar.println(format!(
            "  {} Screenshot  {}",
            green("✓"),
            dim(&format!("{:.2} MB", bytes as f64 / 1024.0 / 1024.0))
        ));
    }

    fn on_slicing_complete(&self, width: u32, height: u32, segments: usize) {
        self.bar.set_prefix("Encoding");
        self.bar.set_message(format!("{width}x{height} → {segments} segment(s)"));
    }

    fn on_segment_encoded(&self, index: usize, total: usize, quality: u8, bytes: usize) {
        self.bar.println(format!(
            "  {} Segment {:>2}/{:<2}  quality {:>2}  {}",
            green("✓"),
            index,
            total,
            quality,
            dim(&format!("{:.2} MB", bytes as f64 / 1024.0 / 1024.0))
        ));
    }

    fn on_model_call_start(&self, segments: usize) {
        self.bar.set_prefix("Generating");
        self.bar.set_message(format!("{segments} image(s) sent"));
    }

    fn on_model_call_complete(&self, content_len: usize) {
        self.bar.finish_and_clear();
        eprintln!("{} {} chars of HTML generated", green("✔"), bold(&content_len.to_string()));
    }

    fn on_model_call_error(&self, attempt: u32, error: String, will_retry: bool) {
        let msg = if error.chars().count() > 100 {
            format!("{}\u{2026}", error.chars().take(99).collect::<String>())
        } else {
            error
        };
        self.bar.println(format!(
            "  {} Attempt {}  {}{}",
            red("✗"),
            attempt,
            red(&msg),
            if will_retry { dim("  (retrying)") } else { String::new() }
        ));
        if !will_retry {
            self.bar.finish_and_clear();
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Capture a live page (requires the `chrome` feature) and print HTML
  page2html https://example.com

  # Generate from a screenshot you already have
  page2html --image landing.png -o landing.html

  # Keep the screenshot next to the output
  page2html https://example.com -o site.html --save-screenshot site.png

  # Structured JSON (screenshot base64 + HTML + stats)
  page2html --image landing.png --json > result.json

  # Another model on an OpenAI-compatible endpoint
  page2html --image landing.png --model openai/gpt-4.1 --base-url http://localhost:4000/v1

LIMITS:
  Images taller than 7990 px are cut into bands and each band is JPEG-encoded
  at quality 85, stepping down by 5 to a floor of 20 until its base64 payload
  is at most 5 MiB. Screenshots 7990 px or wider are rejected.

ENVIRONMENT VARIABLES:
  OPENROUTER_API_KEY   API key (required)
  HTTP_REFERER         Attribution header (default http://localhost:3000)
  PAGE2HTML_MODEL      Override model ID
  PAGE2HTML_BASE_URL   Override API base URL
  RUST_LOG             Override log filter
"#;

/// Turn web page screenshots into HTML using Vision LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "page2html",
    version,
    about = "Turn web page screenshots into HTML using Vision LLMs",
    long_about = "Capture a full-page screenshot of a URL (or load one from disk), slice it into \
model-sized segments, and ask a vision model on an OpenAI-compatible endpoint (OpenRouter by \
default) to reproduce the page as a single HTML document.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Page URL to capture. Optional with --image, where it is only recorded.
    #[arg(required_unless_present = "image")]
    url: Option<String>,

    /// Use an existing PNG/JPEG screenshot instead of capturing.
    #[arg(long, env = "PAGE2HTML_IMAGE")]
    image: Option<PathBuf>,

    /// Write HTML to this file instead of stdout.
    #[arg(short, long, env = "PAGE2HTML_OUTPUT")]
    output: Option<PathBuf>,

    /// Also write the captured screenshot to this path.
    #[arg(long)]
    save_screenshot: Option<PathBuf>,

    /// Vision model ID.
    #[arg(long, env = "PAGE2HTML_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    /// OpenAI-compatible API base URL.
    #[arg(long, env = "PAGE2HTML_BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// API key for the endpoint.
    #[arg(long, env = "OPENROUTER_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Value of the HTTP-Referer attribution header.
    #[arg(long, env = "HTTP_REFERER", default_value = DEFAULT_HTTP_REFERER)]
    referer: String,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, env = "PAGE2HTML_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Max output tokens for the model.
    #[arg(long, env = "PAGE2HTML_MAX_TOKENS")]
    max_tokens: Option<u32>,

    /// Sampling temperature (0.0–2.0).
    #[arg(long, env = "PAGE2HTML_TEMPERATURE")]
    temperature: Option<f32>,

    /// Retries on retryable model failures (rate limits, timeouts).
    #[arg(long, env = "PAGE2HTML_MAX_RETRIES", default_value_t = 0)]
    max_retries: u32,

    /// Model call timeout in seconds.
    #[arg(long, env = "PAGE2HTML_API_TIMEOUT", default_value_t = 300)]
    api_timeout: u64,

    /// Strip code fences and chatter around the returned document.
    #[arg(long, env = "PAGE2HTML_POSTPROCESS")]
    postprocess: bool,

    /// Output structured JSON (ScreenshotOutput) instead of HTML.
    #[arg(long, env = "PAGE2HTML_JSON")]
    json: bool,

    /// Disable the progress spinner.
    #[arg(long, env = "PAGE2HTML_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PAGE2HTML_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PAGE2HTML_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner replaces INFO logs unless --verbose asks for everything.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn GenerationProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb).await?;
    let model = model_from_config(&config).context("Failed to create model client")?;

    // ── Pick a screenshot provider ───────────────────────────────────────
    let provider = build_provider(&cli)?;
    let url = cli
        .url
        .clone()
        .or_else(|| cli.image.as_ref().map(|p| p.display().to_string()))
        .unwrap_or_default();

    // ── Run ──────────────────────────────────────────────────────────────
    let output = screenshot_to_html(&url, &config, provider.as_ref(), &model)
        .await
        .context("Screenshot capture failed")?;

    if let Some(ref path) = cli.save_screenshot {
        save_screenshot(&output, path).await?;
    }

    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
    }

    let Some(ref html) = output.generated_html else {
        anyhow::bail!(
            "{}: {}",
            output.message,
            output.error.as_deref().unwrap_or("unknown error")
        );
    };

    if let Some(ref output_path) = cli.output {
        write_atomic(output_path, html.as_bytes())
            .await
            .context("Failed to write HTML")?;
    } else if !cli.json {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle
            .write_all(html.as_bytes())
            .context("Failed to write to stdout")?;
        if !html.ends_with('\n') {
            handle.write_all(b"\n").ok();
        }
    }

    if !cli.quiet && !cli.json {
        let stats = &output.stats;
        eprintln!(
            "{}  {} segment(s)  {}ms{}",
            green("✔"),
            stats.segments.len(),
            stats.total_duration_ms,
            cli.output
                .as_ref()
                .map(|p| format!("  →  {}", bold(&p.display().to_string())))
                .unwrap_or_default(),
        );
        eprintln!(
            "   {} tokens in  /  {} tokens out",
            dim(&stats.prompt_tokens.to_string()),
            dim(&stats.completion_tokens.to_string()),
        );
    }

    Ok(())
}

/// Map CLI args to `GenerationConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<GenerationConfig> {
    let mut builder = GenerationConfig::builder()
        .api_key(cli.api_key.clone().unwrap_or_default())
        .base_url(cli.base_url.clone())
        .model(cli.model.clone())
        .http_referer(cli.referer.clone())
        .max_retries(cli.max_retries)
        .api_timeout_secs(cli.api_timeout)
        .postprocess(cli.postprocess);

    if let Some(ref path) = cli.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }
    if let Some(n) = cli.max_tokens {
        builder = builder.max_tokens(n);
    }
    if let Some(t) = cli.temperature {
        builder = builder.temperature(t);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn build_provider(cli: &Cli) -> Result<Box<dyn ScreenshotProvider>> {
    if let Some(ref path) = cli.image {
        return Ok(Box::new(FileScreenshot(path.clone())));
    }

    let url = cli.url.as_deref().unwrap_or_default();
    if !is_url(url) {
        anyhow::bail!("'{}' is not an http(s) URL; pass a screenshot with --image", url);
    }

    #[cfg(feature = "chrome")]
    {
        Ok(Box::new(page2html::ChromeScreenshot::default()))
    }

    #[cfg(not(feature = "chrome"))]
    {
        anyhow::bail!(
            "Live capture needs the `chrome` feature; rebuild with --features chrome or pass --image"
        )
    }
}

async fn save_screenshot(output: &ScreenshotOutput, path: &Path) -> Result<()> {
    let Some(ref data) = output.image_data else {
        return Ok(());
    };
    let bytes = STANDARD
        .decode(data)
        .context("Screenshot payload is not valid base64")?;
    write_atomic(path, &bytes)
        .await
        .context("Failed to save screenshot")?;
    Ok(())
}
