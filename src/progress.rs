//! Progress-callback trait for extraction events.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::OcrConfigBuilder::progress_callback`] to follow a run:
//! one OCR submission for a whole document, or one per detected table.
//!
//! # Example
//!
//! ```rust
//! use ocr2md::{ExtractionProgressCallback, OcrConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     done: AtomicUsize,
//! }
//!
//! impl ExtractionProgressCallback for CountingCallback {
//!     fn on_region_complete(&self, index: usize, total: usize, text_len: usize) {
//!         self.done.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("Table {}/{} done ({} bytes)", index, total, text_len);
//!     }
//! }
//!
//! let config = OcrConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { done: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the extraction pipeline as it moves through a run.
///
/// All methods default to no-ops. With `concurrency > 1` the region events
/// may arrive from several tasks at once and out of order.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called once before anything is sent.
    ///
    /// `mode` is the endpoint that will read the document.
    fn on_extraction_start(&self, mode: &str) {
        let _ = mode;
    }

    /// Called after table detection, with the number of tables kept.
    fn on_tables_detected(&self, count: usize) {
        let _ = count;
    }

    /// Called when table cropping is abandoned for whole-image OCR.
    fn on_fallback(&self, reason: &str) {
        let _ = reason;
    }

    /// Called just before a table crop is submitted (1-indexed).
    fn on_region_start(&self, index: usize, total: usize) {
        let _ = (index, total);
    }

    /// Called when a table crop came back.
    fn on_region_complete(&self, index: usize, total: usize, text_len: usize) {
        let _ = (index, total, text_len);
    }

    /// Called when a table crop failed. The run stops after this.
    fn on_region_error(&self, index: usize, total: usize, error: &str) {
        let _ = (index, total, error);
    }

    /// Called once after the output is assembled.
    fn on_extraction_complete(&self, char_count: usize) {
        let _ = char_count;
    }
}

/// Callback that ignores every event.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Type stored in [`crate::config::OcrConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        regions: AtomicUsize,
        errors: AtomicUsize,
        fallbacks: Mutex<Vec<String>>,
    }

    impl ExtractionProgressCallback for Recorder {
        fn on_fallback(&self, reason: &str) {
            self.fallbacks.lock().unwrap().push(reason.to_string());
        }

        fn on_region_complete(&self, _index: usize, _total: usize, _text_len: usize) {
            self.regions.fetch_add(1, Ordering::SeqCst);
        }

        fn on_region_error(&self, _index: usize, _total: usize, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_extraction_start("structured");
        cb.on_tables_detected(2);
        cb.on_region_start(1, 2);
        cb.on_region_complete(1, 2, 42);
        cb.on_region_error(2, 2, "HTTP 429");
        cb.on_fallback("no tables");
        cb.on_extraction_complete(42);
    }

    #[test]
    fn recorder_receives_events() {
        let cb: Arc<dyn ExtractionProgressCallback> = Arc::new(Recorder::default());
        cb.on_region_complete(1, 3, 10);
        cb.on_region_complete(2, 3, 10);
        cb.on_region_error(3, 3, "boom");
        cb.on_fallback("detector crashed");
        cb.on_tables_detected(3);
        // Unimplemented hooks fall through to the defaults.
        cb.on_extraction_complete(20);
    }

    #[test]
    fn recorder_counts() {
        let rec = Recorder::default();
        rec.on_region_complete(1, 2, 5);
        rec.on_region_complete(2, 2, 5);
        rec.on_fallback("zero tables");
        assert_eq!(rec.regions.load(Ordering::SeqCst), 2);
        assert_eq!(rec.errors.load(Ordering::SeqCst), 0);
        assert_eq!(rec.fallbacks.lock().unwrap().as_slice(), ["zero tables"]);
    }
}
