//! Error types for the markdownforge library.
//!
//! Three error types reflect three distinct failure scopes:
//!
//! * [`ForgeError`] — **Fatal**: the run cannot proceed at all (input file
//!   missing, output directory cannot be created). Returned as
//!   `Err(ForgeError)` from [`crate::process::DocumentProcessor::process_document`]
//!   after temporary resources have been released.
//!
//! * [`DiagramError`] — **Non-fatal, per diagram**: one Mermaid block failed
//!   to render. The fence stays in the document as literal code and every
//!   other diagram is still attempted. Stored inside
//!   [`crate::output::DiagramRenderResult`].
//!
//! * [`ConversionError`] — **Non-fatal, per format**: one output format
//!   failed (pandoc missing, browser crashed) while the others may still
//!   succeed. Stored inside [`crate::output::ConversionOutcome`].
//!
//! Every error classifies itself into an [`ErrorKind`] band so the CLI can
//! pick an exit code without string matching.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Coarse classification used for exit-code mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Missing, unreadable, oversized or binary input.
    Input,
    /// Output directory or file cannot be written.
    Output,
    /// Generic pipeline failure.
    Processing,
    /// An external renderer, browser or tool is unavailable.
    Dependency,
    /// Invalid or missing configuration.
    Config,
}

/// Machine-readable error code carried by every [`ForgeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InputNotFound,
    InputInvalid,
    InputTooLarge,
    InputBinary,
    OutputPermission,
    OutputInvalidPath,
    ProcessingError,
    MermaidRenderFailed,
    PdfGenerationFailed,
    DocxGenerationFailed,
    PandocNotFound,
    BrowserLaunchFailed,
    DependencyError,
    ConfigInvalid,
    ConfigNotFound,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::InputNotFound => "INPUT_NOT_FOUND",
            ErrorCode::InputInvalid => "INPUT_INVALID",
            ErrorCode::InputTooLarge => "INPUT_TOO_LARGE",
            ErrorCode::InputBinary => "INPUT_BINARY",
            ErrorCode::OutputPermission => "OUTPUT_PERMISSION",
            ErrorCode::OutputInvalidPath => "OUTPUT_INVALID_PATH",
            ErrorCode::ProcessingError => "PROCESSING_ERROR",
            ErrorCode::MermaidRenderFailed => "MERMAID_RENDER_FAILED",
            ErrorCode::PdfGenerationFailed => "PDF_GENERATION_FAILED",
            ErrorCode::DocxGenerationFailed => "DOCX_GENERATION_FAILED",
            ErrorCode::PandocNotFound => "PANDOC_NOT_FOUND",
            ErrorCode::BrowserLaunchFailed => "BROWSER_LAUNCH_FAILED",
            ErrorCode::DependencyError => "DEPENDENCY_ERROR",
            ErrorCode::ConfigInvalid => "CONFIG_INVALID",
            ErrorCode::ConfigNotFound => "CONFIG_NOT_FOUND",
        }
    }

    /// The band this code belongs to.
    pub fn kind(self) -> ErrorKind {
        match self {
            ErrorCode::InputNotFound
            | ErrorCode::InputInvalid
            | ErrorCode::InputTooLarge
            | ErrorCode::InputBinary => ErrorKind::Input,
            ErrorCode::OutputPermission | ErrorCode::OutputInvalidPath => ErrorKind::Output,
            ErrorCode::ProcessingError
            | ErrorCode::MermaidRenderFailed
            | ErrorCode::PdfGenerationFailed
            | ErrorCode::DocxGenerationFailed => ErrorKind::Processing,
            ErrorCode::PandocNotFound
            | ErrorCode::BrowserLaunchFailed
            | ErrorCode::DependencyError => ErrorKind::Dependency,
            ErrorCode::ConfigInvalid | ErrorCode::ConfigNotFound => ErrorKind::Config,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// All fatal errors returned by the markdownforge library.
///
/// Diagram- and format-level failures use [`DiagramError`] and
/// [`ConversionError`] and are collected into the run's result instead.
#[derive(Debug, Error)]
pub enum ForgeError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Input file not found: '{path}'\nCheck the path exists and is readable.")]
    InputNotFound { path: PathBuf },

    /// Input path exists but is a directory or special file.
    #[error("Input path is not a regular file: '{path}'")]
    InputNotAFile { path: PathBuf },

    /// Input has an extension other than `.md` / `.markdown`.
    #[error("Invalid input '{path}': {reason}")]
    InputInvalid { path: PathBuf, reason: String },

    /// Input exceeds the size limit.
    #[error("Input file too large: '{path}' is {size} (maximum {max})")]
    InputTooLarge {
        path: PathBuf,
        size: String,
        max: String,
    },

    /// Input contains nothing but whitespace.
    #[error("Input file is empty: '{path}'")]
    InputEmpty { path: PathBuf },

    /// Input contains NUL bytes or is not valid UTF-8.
    #[error("Input file appears to be binary: '{path}'")]
    InputBinary { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    // ── Output errors ─────────────────────────────────────────────────────
    /// The output directory could not be created.
    #[error("Failed to create output directory '{path}': {source}\nCheck write permissions for the output directory.")]
    OutputDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder or config-file validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// An explicitly named config file does not exist.
    #[error("Configuration file not found: '{path}'")]
    ConfigNotFound { path: PathBuf },

    // ── Dependency errors ─────────────────────────────────────────────────
    /// A required external tool is unavailable.
    #[error("{tool} is not available: {detail}\n{hint}")]
    DependencyMissing {
        tool: String,
        detail: String,
        hint: String,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Any failure before the per-format stage that has no better category.
    #[error("Document processing failed: {message}")]
    Processing {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl ForgeError {
    /// Wrap an arbitrary failure as a processing-level error.
    pub fn processing(message: impl Into<String>) -> Self {
        ForgeError::Processing {
            message: message.into(),
            source: None,
        }
    }

    /// Wrap a failure and keep it as the `source()`.
    pub fn processing_with<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        ForgeError::Processing {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            ForgeError::InputNotFound { .. } => ErrorCode::InputNotFound,
            ForgeError::InputNotAFile { .. }
            | ForgeError::InputInvalid { .. }
            | ForgeError::InputEmpty { .. }
            | ForgeError::PermissionDenied { .. } => ErrorCode::InputInvalid,
            ForgeError::InputTooLarge { .. } => ErrorCode::InputTooLarge,
            ForgeError::InputBinary { .. } => ErrorCode::InputBinary,
            ForgeError::OutputDirectory { .. } => ErrorCode::OutputPermission,
            ForgeError::InvalidConfig(_) => ErrorCode::ConfigInvalid,
            ForgeError::ConfigNotFound { .. } => ErrorCode::ConfigNotFound,
            ForgeError::DependencyMissing { tool, .. } if tool == "pandoc" => {
                ErrorCode::PandocNotFound
            }
            ForgeError::DependencyMissing { .. } => ErrorCode::DependencyError,
            ForgeError::Processing { .. } => ErrorCode::ProcessingError,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.code().kind()
    }
}

/// A non-fatal error for a single diagram.
///
/// The renderer never propagates these; the diagram's fence stays in the
/// document and the run continues.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum DiagramError {
    /// The headless browser could not be started.
    #[error("failed to launch browser: {detail}")]
    BackendLaunch { detail: String },

    /// The rendering page did not finish loading in time.
    #[error("diagram page did not load within {secs}s: {detail}")]
    ContentLoad { secs: u64, detail: String },

    /// Mermaid never signalled completion.
    #[error("diagram rendering did not complete within {secs}s")]
    RenderTimeout { secs: u64 },

    /// Mermaid rejected the diagram source.
    #[error("Mermaid syntax error: {message}")]
    Syntax { message: String },

    /// The page finished but the expected element is absent.
    #[error("rendered element '{selector}' not found")]
    MissingElement { selector: String },

    /// The backend produced zero bytes or bytes of the wrong type.
    #[error("invalid {format} output: {detail}")]
    InvalidOutput { format: String, detail: String },

    /// The rendered image could not be written to disk.
    #[error("failed to write '{path}': {detail}")]
    WriteFailed { path: PathBuf, detail: String },

    /// Any other engine failure.
    #[error("{0}")]
    Backend(String),
}

/// A non-fatal error for a single requested output format.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum ConversionError {
    /// The requested format name is not one this crate produces.
    #[error("Unsupported format: {format}")]
    UnsupportedFormat { format: String },

    /// An external tool or engine is not installed or failed to start.
    #[error("{tool} is not available: {detail}")]
    Dependency { tool: String, detail: String },

    /// The working document could not be read.
    #[error("failed to read '{path}': {detail}")]
    ReadFailed { path: PathBuf, detail: String },

    /// The output file could not be written.
    #[error("failed to write '{path}': {detail}")]
    OutputWrite { path: PathBuf, detail: String },

    /// The produced file exists but is empty.
    #[error("generated file '{path}' is empty")]
    EmptyOutput { path: PathBuf },

    /// The engine itself reported a failure.
    #[error("{0}")]
    Backend(String),
}

impl ConversionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConversionError::UnsupportedFormat { .. } => ErrorKind::Config,
            ConversionError::Dependency { .. } => ErrorKind::Dependency,
            ConversionError::ReadFailed { .. } => ErrorKind::Input,
            ConversionError::OutputWrite { .. } => ErrorKind::Output,
            ConversionError::EmptyOutput { .. } | ConversionError::Backend(_) => {
                ErrorKind::Processing
            }
        }
    }
}
