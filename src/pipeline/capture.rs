//! Screenshot providers: turn a URL into raw image bytes.
//!
//! The pipeline treats capture as an opaque collaborator behind
//! [`ScreenshotProvider`]. Three implementations ship with the crate:
//!
//! * [`StaticScreenshot`] — fixed bytes; for tests and pre-captured images
//! * [`FileScreenshot`]   — reads a PNG/JPEG from disk
//! * `ChromeScreenshot`   — drives headless Chrome (feature `chrome`)

use crate::error::CaptureError;
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::{debug, info};

/// Something that can produce a full-page screenshot for a URL.
#[async_trait]
pub trait ScreenshotProvider: Send + Sync {
    /// Capture `url` and return encoded image bytes (PNG or JPEG).
    async fn capture(&self, url: &str) -> Result<Vec<u8>, CaptureError>;
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Returns the same bytes for every URL.
#[derive(Debug, Clone)]
pub struct StaticScreenshot(pub Vec<u8>);

#[async_trait]
impl ScreenshotProvider for StaticScreenshot {
    async fn capture(&self, url: &str) -> Result<Vec<u8>, CaptureError> {
        debug!("Static screenshot for {}: {} bytes", url, self.0.len());
        Ok(self.0.clone())
    }
}

/// Reads a previously captured screenshot from disk, ignoring the URL.
#[derive(Debug, Clone)]
pub struct FileScreenshot(pub PathBuf);

#[async_trait]
impl ScreenshotProvider for FileScreenshot {
    async fn capture(&self, _url: &str) -> Result<Vec<u8>, CaptureError> {
        let bytes = tokio::fs::read(&self.0).await.map_err(|e| CaptureError::Io {
            path: self.0.clone(),
            detail: e.to_string(),
        })?;
        info!("Loaded screenshot {} ({} bytes)", self.0.display(), bytes.len());
        Ok(bytes)
    }
}

#[cfg(feature = "chrome")]
pub use chrome::{ChromeOptions, ChromeScreenshot};

#[cfg(feature = "chrome")]
mod chrome {
    //! Full-page capture through the Chrome DevTools Protocol.
    //!
    //! `headless_chrome` is a blocking API, so the whole session runs inside
    //! `spawn_blocking`.

    use super::ScreenshotProvider;
    use crate::error::CaptureError;
    use async_trait::async_trait;
    use headless_chrome::protocol::cdp::Page;
    use headless_chrome::browser::tab::Tab;
    use headless_chrome::{Browser, LaunchOptions};
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;
    use tracing::{info, warn};

    /// Browser settings for a capture.
    #[derive(Debug, Clone)]
    pub struct ChromeOptions {
        pub viewport_width: u32,
        pub viewport_height: u32,
        /// Device pixel ratio; 2 gives retina-sharp text.
        pub device_scale_factor: f64,
        pub user_agent: String,
        /// How long to wait for the page's load event.
        pub capture_timeout: Duration,
        /// Settle time after falling back to DOM-ready when the load event
        /// does not arrive within `capture_timeout`.
        pub fallback_settle: Duration,
        /// Pause after each scroll step so lazy images can start loading.
        pub scroll_pause: Duration,
    }

    impl Default for ChromeOptions {
        fn default() -> Self {
            Self {
                viewport_width: 2560,
                viewport_height: 1440,
                device_scale_factor: 2.0,
                user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36".to_string(),
                capture_timeout: Duration::from_secs(60),
                fallback_settle: Duration::from_secs(4),
                scroll_pause: Duration::from_millis(800),
            }
        }
    }

    const EXTRA_HEADERS: [(&str, &str); 4] = [
        (
            "Accept",
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
        ),
        ("Accept-Language", "en-US,en;q=0.5"),
        ("DNT", "1"),
        ("Upgrade-Insecure-Requests", "1"),
    ];

    /// Resolves once every `<img>` and every CSS `background-image` has
    /// loaded or failed.
    const WAIT_FOR_IMAGES_JS: &str = r#"
        Promise.all([
            ...Array.from(document.images)
                .filter(img => !img.complete)
                .map(img => new Promise(resolve => { img.onload = img.onerror = resolve; })),
            ...Array.from(document.querySelectorAll('*'))
                .map(el => window.getComputedStyle(el).backgroundImage)
                .filter(bg => bg && bg !== 'none')
                .flatMap(bg => Array.from(bg.matchAll(/url\(\s*['"]?([^'")]+)['"]?\s*\)/g), m => m[1]))
                .map(src => new Promise(resolve => {
                    const img = new Image();
                    img.onload = img.onerror = resolve;
                    img.src = src;
                }))
        ]).then(() => true)
    "#;

    /// Captures pages with a freshly launched headless Chrome per call.
    #[derive(Debug, Clone, Default)]
    pub struct ChromeScreenshot {
        options: ChromeOptions,
    }

    impl ChromeScreenshot {
        pub fn new(options: ChromeOptions) -> Self {
            Self { options }
        }
    }

    #[async_trait]
    impl ScreenshotProvider for ChromeScreenshot {
        async fn capture(&self, url: &str) -> Result<Vec<u8>, CaptureError> {
            let options = self.options.clone();
            let url = url.to_string();
            tokio::task::spawn_blocking(move || capture_blocking(&url, &options))
                .await
                .map_err(|e| CaptureError::Browser(format!("capture task panicked: {e}")))?
        }
    }

    fn capture_blocking(url: &str, opts: &ChromeOptions) -> Result<Vec<u8>, CaptureError> {
        let launch = LaunchOptions::default_builder()
            .headless(true)
            .window_size(Some((opts.viewport_width, opts.viewport_height)))
            .build()
            .map_err(|e| CaptureError::Browser(format!("launch options: {e}")))?;
        let browser = Browser::new(launch)
            .map_err(|e| CaptureError::Browser(format!("failed to launch browser: {e}")))?;
        let tab = browser
            .new_tab()
            .map_err(|e| CaptureError::Browser(format!("failed to create tab: {e}")))?;

        tab.set_default_timeout(opts.capture_timeout);
        tab.set_user_agent(&opts.user_agent, None, None)
            .map_err(|e| CaptureError::Browser(format!("failed to set user agent: {e}")))?;
        let headers: HashMap<&str, &str> = EXTRA_HEADERS.into_iter().collect();
        tab.set_extra_http_headers(headers)
            .map_err(|e| CaptureError::Browser(format!("failed to set headers: {e}")))?;

        info!("Navigating to {}", url);
        tab.navigate_to(url)
            .map_err(|e| CaptureError::Navigation(e.to_string()))?;
        if let Err(e) = tab.wait_until_navigated() {
            warn!("Page load did not finish ({}), falling back to DOM-ready", e);
            tab.wait_for_element("body")
                .map_err(|e| CaptureError::Navigation(e.to_string()))?;
            std::thread::sleep(opts.fallback_settle);
        }

        if let Err(e) = trigger_lazy_loading(&tab, opts.scroll_pause) {
            warn!("Lazy-loading pass failed, capturing as-is: {}", e);
        }

        let (width, height) = document_size(&tab)?;
        info!("Capturing full page {}x{} CSS px", width, height);

        let clip = Page::Viewport {
            x: 0.0,
            y: 0.0,
            width,
            height,
            scale: opts.device_scale_factor,
        };
        tab.capture_screenshot(
            Page::CaptureScreenshotFormatOption::Png,
            None,
            Some(clip),
            true,
        )
        .map_err(|e| CaptureError::Browser(format!("screenshot failed: {e}")))
    }

    /// Scroll through the page in half-viewport steps, then back to the top,
    /// and wait for pending images.
    fn trigger_lazy_loading(tab: &Arc<Tab>, pause: Duration) -> Result<(), CaptureError> {
        let eval_f64 = |js: &str| -> Result<f64, CaptureError> {
            tab.evaluate(js, false)
                .map_err(|e| CaptureError::Browser(format!("evaluate failed: {e}")))
                .map(|r| r.value.and_then(|v| v.as_f64()).unwrap_or(0.0))
        };

        let page_height = eval_f64("document.documentElement.scrollHeight")?;
        let viewport_height = eval_f64("window.innerHeight")?;
        let step = (viewport_height / 2.0).max(1.0);

        let mut y = 0.0;
        while y < page_height {
            eval_f64(&format!("window.scrollTo(0, {y}); 0"))?;
            std::thread::sleep(pause);
            y += step;
        }
        eval_f64("window.scrollTo(0, 0); 0")?;

        tab.evaluate(WAIT_FOR_IMAGES_JS, true)
            .map_err(|e| CaptureError::Browser(format!("waiting for images failed: {e}")))?;
        std::thread::sleep(Duration::from_secs(1));
        Ok(())
    }

    fn document_size(tab: &Arc<Tab>) -> Result<(f64, f64), CaptureError> {
        let result = tab
            .evaluate(
                "JSON.stringify([document.documentElement.scrollWidth, document.documentElement.scrollHeight])",
                false,
            )
            .map_err(|e| CaptureError::Browser(format!("evaluate failed: {e}")))?;
        let raw = result
            .value
            .and_then(|v| v.as_str().map(str::to_string))
            .ok_or_else(|| CaptureError::Browser("document size unavailable".into()))?;
        let dims: Vec<f64> = serde_json::from_str(&raw)
            .map_err(|e| CaptureError::Browser(format!("bad document size '{raw}': {e}")))?;
        match dims.as_slice() {
            [w, h] if *w > 0.0 && *h > 0.0 => Ok((*w, *h)),
            _ => Err(CaptureError::Browser(format!("bad document size '{raw}'"))),
        }
    }

}
