//! # markdownforge
//!
//! Convert Markdown documents with Mermaid diagrams and admonitions into
//! styled PDF and DOCX files.
//!
//! ## Why this crate?
//!
//! Technical writers keep one Markdown source and need polished deliverables
//! from it. Plain converters print Mermaid fences as code and ignore callout
//! syntax. This crate renders every diagram to an image first, rewrites the
//! document to reference those images, then hands the result to a themed
//! browser print (PDF) and to pandoc (DOCX). One failing diagram or one
//! missing tool never costs you the other outputs.
//!
//! ## Pipeline Overview
//!
//! ```text
//! Markdown
//!  │
//!  ├─ 1. Extract  find ```mermaid fences in document order
//!  ├─ 2. Render   one diagram at a time in headless Chrome (PNG or SVG)
//!  ├─ 3. Rewrite  copy images to <output>/diagrams, splice in references
//!  ├─ 4. Convert  per format, independently:
//!  │               pdf  → themed HTML, images inlined, printed by Chrome
//!  │               docx → pandoc + generated formatting filter
//!  └─ 5. Cleanup  scratch session removed, browser released, always
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use markdownforge::{DocumentProcessor, ProcessorConfig, Theme};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ProcessorConfig::builder()
//!         .formats(["pdf", "docx"])
//!         .output_dir("dist")
//!         .theme(Theme::Github)
//!         .build()?;
//!     let mut processor = DocumentProcessor::new(config);
//!     let result = processor.process_document("guide.md").await?;
//!     for path in &result.produced {
//!         println!("wrote {}", path.display());
//!     }
//!     for error in &result.errors {
//!         eprintln!("{error}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `markdownforge` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! ## External tools
//!
//! | Output | Needs |
//! |--------|-------|
//! | PDF, diagrams | Chrome or Chromium (found automatically, or `chrome_path`) |
//! | DOCX | `pandoc` on `PATH` (or `docx.pandoc_path`) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod chrome;
pub mod config;
pub mod error;
pub mod location;
pub mod output;
pub mod pipeline;
pub mod process;
pub mod progress;
pub mod temp;
pub mod themes;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    DiagramFormat, DocxFormatting, DocxOptions, MermaidOptions, MermaidTheme, PageFormat, PdfOptions,
    ProcessorConfig, ProcessorConfigBuilder, Theme,
};
pub use error::{ConversionError, DiagramError, ErrorCode, ErrorKind, ForgeError};
pub use location::{OutputLocation, OutputReport};
pub use output::{ConversionOutcome, DiagramRenderResult, DiagramStats, ProcessingResult, ProducedFile};
pub use pipeline::diagram::DiagramBackend;
pub use pipeline::docx::{DocxBackend, DocxJob};
pub use pipeline::pdf::PdfBackend;
pub use process::DocumentProcessor;
pub use progress::{NoopProgressCallback, ProcessingProgressCallback, ProgressCallback};
pub use temp::{CleanupReport, TempSession};
