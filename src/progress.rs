//! Progress-callback trait for per-stage processing events.
//!
//! Attach an [`Arc<dyn ProcessingProgressCallback>`] with
//! [`crate::process::DocumentProcessor::with_progress`] to receive events as
//! the pipeline extracts, renders and converts.
//!
//! # Why callbacks instead of channels?
//!
//! A callback is the least-invasive integration point: the CLI drives an
//! `indicatif` spinner from it, a server could forward events to a
//! WebSocket, and the library knows nothing about either. All methods have
//! no-op defaults so implementors override only what they need.
//!
//! # Example
//!
//! ```rust
//! use markdownforge::ProcessingProgressCallback;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct CountFailures(AtomicUsize);
//!
//! impl ProcessingProgressCallback for CountFailures {
//!     fn on_diagram_failed(&self, _index: usize, _total: usize, error: &str) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("diagram failed: {error}");
//!     }
//! }
//! ```

use std::path::Path;
use std::sync::Arc;

/// Called by the orchestrator as a run moves through its stages.
///
/// Events arrive in pipeline order from a single task; diagram and format
/// events are never delivered concurrently.
pub trait ProcessingProgressCallback: Send + Sync {
    /// Called once the input has been read.
    fn on_start(&self, input: &Path) {
        let _ = input;
    }

    /// Called after extraction, even when `count == 0`.
    fn on_diagrams_found(&self, count: usize) {
        let _ = count;
    }

    /// Called when a diagram renders successfully.
    ///
    /// # Arguments
    /// * `index` — 1-based diagram number
    /// * `total` — diagrams found
    fn on_diagram_rendered(&self, index: usize, total: usize) {
        let _ = (index, total);
    }

    /// Called when a diagram fails; its fence stays in the document.
    fn on_diagram_failed(&self, index: usize, total: usize, error: &str) {
        let _ = (index, total, error);
    }

    /// Called just before a format converter is invoked.
    fn on_format_start(&self, format: &str) {
        let _ = format;
    }

    /// Called when a format produced its output file.
    fn on_format_complete(&self, format: &str, path: &Path, size_bytes: u64) {
        let _ = (format, path, size_bytes);
    }

    /// Called when a format failed or is unsupported.
    fn on_format_error(&self, format: &str, error: &str) {
        let _ = (format, error);
    }

    /// Called once after cleanup with the number of produced files.
    fn on_complete(&self, produced: usize, failed: usize) {
        let _ = (produced, failed);
    }
}

/// A no-op implementation. This is the default when no callback is attached.
pub struct NoopProgressCallback;

impl ProcessingProgressCallback for NoopProgressCallback {}

/// Convenience alias for the type stored on the processor.
pub type ProgressCallback = Arc<dyn ProcessingProgressCallback>;
