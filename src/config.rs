//! Configuration types for screenshot-to-HTML generation.
//!
//! All behaviour is controlled through [`GenerationConfig`], built via its
//! [`GenerationConfigBuilder`] or loaded with [`GenerationConfig::from_env`].
//! Nothing in the pipeline reads process-wide state: limits and credentials
//! are passed explicitly, so concurrent requests share nothing mutable.

use crate::error::Page2HtmlError;
use crate::progress::ProgressCallback;
use std::fmt;

/// Environment variable holding the chat-completion API key.
pub const API_KEY_ENV: &str = "OPENROUTER_API_KEY";

/// Default OpenAI-compatible gateway.
pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Default vision model identifier.
pub const DEFAULT_MODEL: &str = "anthropic/claude-sonnet-4";

/// Default `HTTP-Referer` attribution header.
pub const DEFAULT_HTTP_REFERER: &str = "http://localhost:3000";

/// Default `X-Title` attribution header.
pub const DEFAULT_APP_TITLE: &str = "page2html";

/// Hard input constraints of the destination vision model.
///
/// The defaults match Claude's documented image limits with a small safety
/// margin on the dimension (8000 px → 7990 px).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageLimits {
    /// Maximum width or height in pixels. Segments must be strictly below it.
    pub max_dimension: u32,
    /// Maximum length of the base64 payload for one image part.
    pub max_base64_bytes: usize,
    /// JPEG quality of the first encoding attempt.
    pub initial_quality: u8,
    /// Lowest JPEG quality the normalizer will try.
    pub min_quality: u8,
    /// Quality decrement between attempts.
    pub quality_step: u8,
    /// Largest screenshot, in pixels, the decoder will allocate for. The
    /// default admits 5 120 px wide captures up to about 34 900 px tall.
    pub max_decode_pixels: u64,
}

impl Default for ImageLimits {
    fn default() -> Self {
        Self {
            max_dimension: 7990,
            max_base64_bytes: 5 * 1024 * 1024,
            initial_quality: 85,
            min_quality: 20,
            quality_step: 5,
            max_decode_pixels: 178_956_970,
        }
    }
}

impl ImageLimits {
    /// The descending sequence of JPEG qualities the normalizer tries:
    /// `initial_quality`, then minus `quality_step` until `min_quality`.
    pub fn quality_ladder(&self) -> impl Iterator<Item = u8> {
        let min = self.min_quality;
        let step = self.quality_step.max(1);
        std::iter::successors(Some(self.initial_quality), move |&q| {
            q.checked_sub(step).filter(|&next| next >= min)
        })
        .take_while(move |&q| q >= min)
    }
}

/// Configuration for one screenshot-to-HTML generation.
///
/// # Example
/// ```rust
/// use page2html::GenerationConfig;
///
/// let config = GenerationConfig::builder()
///     .api_key("sk-or-...")
///     .model("anthropic/claude-sonnet-4")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct GenerationConfig {
    /// Bearer credential for the chat-completion endpoint. Required.
    pub api_key: String,

    /// Base URL of the OpenAI-compatible API. Default: OpenRouter.
    pub base_url: String,

    /// Model identifier sent with every request.
    pub model: String,

    /// Value of the `HTTP-Referer` attribution header.
    pub http_referer: String,

    /// Value of the `X-Title` attribution header.
    pub app_title: String,

    /// Image constraints applied by the slicer and normalizer.
    pub limits: ImageLimits,

    /// Optional cap on generated tokens. `None` leaves it to the provider.
    ///
    /// Full pages with repeated sections routinely exceed 8 000 output
    /// tokens; a low cap truncates the document mid-tag.
    pub max_tokens: Option<u32>,

    /// Optional sampling temperature. `None` leaves it to the provider.
    pub temperature: Option<f32>,

    /// Custom system prompt replacing both built-in prompts.
    pub system_prompt: Option<String>,

    /// Per-call timeout for the model request in seconds. Default: 300.
    ///
    /// Generating a complete page is slow: multi-segment requests commonly
    /// stream for two to four minutes before finishing.
    pub api_timeout_secs: u64,

    /// Model-call retries performed by the orchestrator. Default: 0.
    ///
    /// The adapter never retries on its own; this is opt-in caller policy
    /// and only applies to errors whose retry hint allows it.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (exponential backoff). Default: 1000.
    pub retry_backoff_ms: u64,

    /// Apply [`crate::pipeline::postprocess::clean_html`] to the model output.
    /// Default: false, so output is returned verbatim.
    pub postprocess: bool,

    /// Optional progress callback.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            http_referer: DEFAULT_HTTP_REFERER.to_string(),
            app_title: DEFAULT_APP_TITLE.to_string(),
            limits: ImageLimits::default(),
            max_tokens: None,
            temperature: None,
            system_prompt: None,
            api_timeout_secs: 300,
            max_retries: 0,
            retry_backoff_ms: 1000,
            postprocess: false,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for GenerationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationConfig")
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("http_referer", &self.http_referer)
            .field("app_title", &self.app_title)
            .field("limits", &self.limits)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("postprocess", &self.postprocess)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn GenerationProgressCallback>"),
            )
            .finish()
    }
}

fn redact(key: &str) -> &'static str {
    if key.is_empty() {
        "<unset>"
    } else {
        "<redacted>"
    }
}

impl GenerationConfig {
    /// Create a new builder for `GenerationConfig`.
    pub fn builder() -> GenerationConfigBuilder {
        GenerationConfigBuilder {
            config: Self::default(),
        }
    }

    /// Load configuration from the environment.
    ///
    /// * `OPENROUTER_API_KEY` — required
    /// * `HTTP_REFERER` — optional attribution, default `http://localhost:3000`
    /// * `PAGE2HTML_MODEL`, `PAGE2HTML_BASE_URL` — optional overrides
    ///
    /// A missing key is a startup failure, reported before any request runs.
    pub fn from_env() -> Result<Self, Page2HtmlError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Page2HtmlError> {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let mut builder = Self::builder();
        if let Some(key) = non_empty(API_KEY_ENV) {
            builder = builder.api_key(key);
        }
        if let Some(referer) = non_empty("HTTP_REFERER") {
            builder = builder.http_referer(referer);
        }
        if let Some(model) = non_empty("PAGE2HTML_MODEL") {
            builder = builder.model(model);
        }
        if let Some(url) = non_empty("PAGE2HTML_BASE_URL") {
            builder = builder.base_url(url);
        }
        builder.build()
    }
}

/// Builder for [`GenerationConfig`].
pub struct GenerationConfigBuilder {
    config: GenerationConfig,
}

impl fmt::Debug for GenerationConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl GenerationConfigBuilder {
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = key.into();
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn http_referer(mut self, referer: impl Into<String>) -> Self {
        self.config.http_referer = referer.into();
        self
    }

    pub fn app_title(mut self, title: impl Into<String>) -> Self {
        self.config.app_title = title.into();
        self
    }

    pub fn limits(mut self, limits: ImageLimits) -> Self {
        self.config.limits = limits;
        self
    }

    pub fn max_dimension(mut self, px: u32) -> Self {
        self.config.limits.max_dimension = px;
        self
    }

    pub fn max_decode_pixels(mut self, pixels: u64) -> Self {
        self.config.limits.max_decode_pixels = pixels;
        self
    }

    pub fn max_base64_bytes(mut self, bytes: usize) -> Self {
        self.config.limits.max_base64_bytes = bytes;
        self
    }

    pub fn max_tokens(mut self, n: u32) -> Self {
        self.config.max_tokens = Some(n);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = Some(t.clamp(0.0, 2.0));
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn postprocess(mut self, v: bool) -> Self {
        self.config.postprocess = v;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<GenerationConfig, Page2HtmlError> {
        let c = &self.config;
        if c.api_key.trim().is_empty() {
            return Err(Page2HtmlError::MissingApiKey {
                env_var: API_KEY_ENV.to_string(),
            });
        }
        if c.model.trim().is_empty() {
            return Err(Page2HtmlError::InvalidConfig("Model must not be empty".into()));
        }
        let l = &c.limits;
        if l.max_dimension < 2 {
            return Err(Page2HtmlError::InvalidConfig(format!(
                "max_dimension must be ≥ 2, got {}",
                l.max_dimension
            )));
        }
        if l.max_base64_bytes == 0 {
            return Err(Page2HtmlError::InvalidConfig(
                "max_base64_bytes must be ≥ 1".into(),
            ));
        }
        if l.max_decode_pixels == 0 {
            return Err(Page2HtmlError::InvalidConfig(
                "max_decode_pixels must be ≥ 1".into(),
            ));
        }
        if l.initial_quality > 100 || l.min_quality == 0 || l.min_quality > l.initial_quality {
            return Err(Page2HtmlError::InvalidConfig(format!(
                "JPEG quality range must satisfy 1 ≤ min ≤ initial ≤ 100, got {}..{}",
                l.min_quality, l.initial_quality
            )));
        }
        if l.quality_step == 0 {
            return Err(Page2HtmlError::InvalidConfig("quality_step must be ≥ 1".into()));
        }
        Ok(self.config)
    }
}
