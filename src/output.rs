//! Result types produced by a processing run.
//!
//! A run yields one [`DiagramRenderResult`] per diagram fence and one
//! [`ConversionOutcome`] per requested format; both carry their failure as a
//! value rather than unwinding. [`ProcessingResult`] aggregates them.

use crate::error::{ConversionError, DiagramError};
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::path::{Path, PathBuf};

/// Outcome of rendering one diagram fence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagramRenderResult {
    /// 0-based position of the fence in the document.
    pub index: usize,
    /// Exact fence text, carried through for substitution.
    pub original_match: String,
    /// Byte range of `original_match` in the source document.
    pub span: Range<usize>,
    /// Path of the rendered image, or why rendering failed.
    pub outcome: Result<PathBuf, DiagramError>,
}

impl DiagramRenderResult {
    pub fn succeeded(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn output_path(&self) -> Option<&Path> {
        self.outcome.as_ref().ok().map(PathBuf::as_path)
    }

    pub fn error_message(&self) -> Option<String> {
        self.outcome.as_ref().err().map(ToString::to_string)
    }
}

/// A file written by a format converter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProducedFile {
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// Outcome of converting the document to one requested format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionOutcome {
    /// The format name as requested (lower-cased).
    pub format: String,
    pub result: Result<ProducedFile, ConversionError>,
}

impl ConversionOutcome {
    pub fn succeeded(&self) -> bool {
        self.result.is_ok()
    }

    pub fn output_path(&self) -> Option<&Path> {
        self.result.as_ref().ok().map(|f| f.path.as_path())
    }

    pub fn size_bytes(&self) -> Option<u64> {
        self.result.as_ref().ok().map(|f| f.size_bytes)
    }

    /// Human-readable failure line, e.g. `DOCX conversion failed: pandoc is not available: ...`.
    ///
    /// Unsupported formats report just `Unsupported format: <name>`.
    pub fn error_message(&self) -> Option<String> {
        match &self.result {
            Ok(_) => None,
            Err(e @ ConversionError::UnsupportedFormat { .. }) => Some(e.to_string()),
            Err(e) => Some(format!(
                "{} conversion failed: {}",
                self.format.to_ascii_uppercase(),
                e
            )),
        }
    }
}

/// Diagram counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagramStats {
    /// Fences found by the extractor.
    pub found: usize,
    /// Diagrams rendered and copied into the persistent directory.
    pub rendered: usize,
    /// Diagrams left in place as literal code.
    pub failed: usize,
    /// `<output>/diagrams`, when at least one diagram was found.
    pub persisted_dir: Option<PathBuf>,
}

/// Aggregate result of [`crate::process::DocumentProcessor::process_document`].
///
/// `produced` and `errors` are independent lists: a run can have both.
/// Construct through [`ProcessingResult::from_outcomes`] so that the two
/// lists always agree with `conversions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingResult {
    /// Absolute paths of produced files, in requested-format order.
    pub produced: Vec<PathBuf>,
    /// One message per failed format, in requested-format order.
    pub errors: Vec<String>,
    /// Per-format detail behind `produced` and `errors`.
    pub conversions: Vec<ConversionOutcome>,
    pub diagrams: DiagramStats,
    /// Wall-clock time for the whole run.
    pub elapsed_ms: u64,
    /// Temp session identifier of the run, for log correlation.
    pub session_id: String,
}

impl ProcessingResult {
    pub fn from_outcomes(
        conversions: Vec<ConversionOutcome>,
        diagrams: DiagramStats,
        elapsed_ms: u64,
        session_id: impl Into<String>,
    ) -> Self {
        let produced = conversions
            .iter()
            .filter_map(|c| c.output_path().map(Path::to_path_buf))
            .collect();
        let errors = conversions
            .iter()
            .filter_map(ConversionOutcome::error_message)
            .collect();
        Self {
            produced,
            errors,
            conversions,
            diagrams,
            elapsed_ms,
            session_id: session_id.into(),
        }
    }

    /// True iff at least one format produced output. Partial success is success.
    pub fn succeeded(&self) -> bool {
        !self.produced.is_empty()
    }

    /// Total size of all produced files.
    pub fn total_bytes(&self) -> u64 {
        self.conversions.iter().filter_map(|c| c.size_bytes()).sum()
    }
}
