//! Progress-callback trait for generation events.
//!
//! Inject an [`Arc<dyn GenerationProgressCallback>`] via
//! [`crate::config::GenerationConfigBuilder::progress_callback`] to follow a
//! request through capture, per-segment encoding and the model call.
//!
//! # Example
//!
//! ```rust
//! use page2html::{GenerationConfig, GenerationProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct SegmentCounter {
//!     encoded: Arc<AtomicUsize>,
//! }
//!
//! impl GenerationProgressCallback for SegmentCounter {
//!     fn on_segment_encoded(&self, index: usize, total: usize, quality: u8, bytes: usize) {
//!         self.encoded.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("segment {index}/{total}: q{quality}, {bytes} bytes");
//!     }
//! }
//!
//! let counter = Arc::new(SegmentCounter {
//!     encoded: Arc::new(AtomicUsize::new(0)),
//! });
//!
//! let config = GenerationConfig::builder()
//!     .api_key("sk-or-...")
//!     .progress_callback(counter as Arc<dyn GenerationProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the pipeline as a request moves through its stages.
///
/// Implementations must be `Send + Sync`: the encode stage runs on a
/// blocking-pool thread. All methods default to no-ops.
pub trait GenerationProgressCallback: Send + Sync {
    /// Called before the screenshot provider is invoked.
    fn on_capture_start(&self, url: &str) {
        let _ = url;
    }

    /// Called once the screenshot has been captured.
    fn on_capture_complete(&self, bytes: usize) {
        let _ = bytes;
    }

    /// Called after slicing, before any segment is encoded.
    ///
    /// # Arguments
    /// * `width`, `height` — source image dimensions
    /// * `segments` — number of vertical segments that will be encoded
    fn on_slicing_complete(&self, width: u32, height: u32, segments: usize) {
        let _ = (width, height, segments);
    }

    /// Called when a segment fits the payload ceiling.
    ///
    /// # Arguments
    /// * `index`   — 1-indexed segment number
    /// * `total`   — total segments
    /// * `quality` — JPEG quality that produced the accepted payload
    /// * `bytes`   — base64 length of the payload
    fn on_segment_encoded(&self, index: usize, total: usize, quality: u8, bytes: usize) {
        let _ = (index, total, quality, bytes);
    }

    /// Called just before the chat-completion request is sent.
    fn on_model_call_start(&self, segments: usize) {
        let _ = segments;
    }

    /// Called when the model returned usable content.
    fn on_model_call_complete(&self, content_len: usize) {
        let _ = content_len;
    }

    /// Called when a model attempt fails. `will_retry` tells whether the
    /// orchestrator is going to try again.
    fn on_model_call_error(&self, attempt: u32, error: String, will_retry: bool) {
        let _ = (attempt, error, will_retry);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl GenerationProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::GenerationConfig`].
pub type ProgressCallback = Arc<dyn GenerationProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct TrackingCallback {
        encoded: AtomicUsize,
        qualities: Mutex<Vec<u8>>,
        errors: AtomicUsize,
    }

    impl GenerationProgressCallback for TrackingCallback {
        fn on_segment_encoded(&self, _index: usize, _total: usize, quality: u8, _bytes: usize) {
            self.encoded.fetch_add(1, Ordering::SeqCst);
            self.qualities.lock().unwrap().push(quality);
        }

        fn on_model_call_error(&self, _attempt: u32, _error: String, _will_retry: bool) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_capture_start("https://example.com");
        cb.on_capture_complete(1024);
        cb.on_slicing_complete(1280, 800, 1);
        cb.on_segment_encoded(1, 1, 85, 4096);
        cb.on_model_call_start(1);
        cb.on_model_call_error(1, "timeout".into(), false);
        cb.on_model_call_complete(2048);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_segment_encoded(1, 2, 85, 100);
        tracker.on_segment_encoded(2, 2, 70, 100);
        tracker.on_model_call_error(1, "rate limited".into(), true);

        assert_eq!(tracker.encoded.load(Ordering::SeqCst), 2);
        assert_eq!(*tracker.qualities.lock().unwrap(), vec![85, 70]);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_slicing_complete(2000, 20000, 3);
    }
}
