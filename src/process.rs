//! Pipeline orchestrator: one Markdown file in, one file per format out.
//!
//! ## Why this shape?
//!
//! A run moves strictly forward through
//! `input → extract → [render → rewrite] → output dir → formats → cleanup`.
//! Per-diagram and per-format failures are *values* collected into the
//! [`ProcessingResult`]; only conditions that stop all progress (missing
//! input, unreadable input, output directory not creatable) come back as
//! `Err(ForgeError)`. Either way the scratch session is removed and the
//! browser backends are released before the call returns.
//!
//! The processor owns its backends exclusively. A headless browser launched
//! for the first diagram is reused for every later diagram of the run and
//! dropped at the end; nothing is shared between processors.

use crate::chrome::locate_chrome;
use crate::config::ProcessorConfig;
use crate::error::{ConversionError, ForgeError};
use crate::location::{resolve_base_name, OutputLocation};
use crate::output::{ConversionOutcome, DiagramStats, ProcessingResult};
use crate::pipeline::diagram::{ChromeDiagramBackend, DiagramBackend, DiagramRenderer};
use crate::pipeline::docx::{DocxBackend, DocxConverter, PandocBackend};
use crate::pipeline::extract::extract_diagrams;
use crate::pipeline::input::unsupported_formats;
use crate::pipeline::pdf::{ChromePdfBackend, PdfBackend, PdfConverter};
use crate::pipeline::rewrite::{persist_diagrams, rewrite_document};
use crate::progress::{NoopProgressCallback, ProgressCallback};
use crate::temp::TempSession;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Converts Markdown documents according to one [`ProcessorConfig`].
pub struct DocumentProcessor {
    config: ProcessorConfig,
    diagrams: DiagramRenderer,
    pdf: PdfConverter,
    docx: DocxConverter,
    progress: ProgressCallback,
    uses_chrome: bool,
}

impl DocumentProcessor {
    /// Processor with the default engines: headless Chrome for diagrams and
    /// PDF, pandoc for DOCX. Nothing is launched until it is needed.
    pub fn new(config: ProcessorConfig) -> Self {
        let diagram = ChromeDiagramBackend::new(config.mermaid.clone(), config.chrome_path.clone());
        let pdf = ChromePdfBackend::new(config.chrome_path.clone());
        let docx = PandocBackend::new(config.docx.pandoc_path.clone());
        let mut processor = Self::with_backends(config, Box::new(diagram), Box::new(pdf), Box::new(docx));
        processor.uses_chrome = true;
        processor
    }

    /// Processor with caller-supplied engines.
    pub fn with_backends(
        config: ProcessorConfig,
        diagram: Box<dyn DiagramBackend>,
        pdf: Box<dyn PdfBackend>,
        docx: Box<dyn DocxBackend>,
    ) -> Self {
        Self {
            diagrams: DiagramRenderer::new(diagram, config.diagram_format),
            pdf: PdfConverter::new(pdf, config.theme, config.pdf.clone()),
            docx: DocxConverter::new(docx, config.docx.clone()),
            progress: Arc::new(NoopProgressCallback),
            uses_chrome: false,
            config,
        }
    }

    /// Attach a progress callback.
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = callback;
        self
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Probe the external tools the requested formats need.
    ///
    /// Returns one human-readable warning per problem; empty means ready.
    pub async fn validate_dependencies(&self) -> Vec<String> {
        let mut warnings: Vec<String> = unsupported_formats(&self.config.formats)
            .into_iter()
            .map(|f| format!("Unsupported format: {f} (supported: pdf, docx)"))
            .collect();

        let wants = |f: &str| self.config.formats.iter().any(|x| x == f);

        if wants("docx") {
            match self.docx.backend().check().await {
                Ok(version) => debug!("DOCX engine available: {}", version),
                Err(e) => warnings.push(format!(
                    "DOCX output unavailable: {e}. Install pandoc: https://pandoc.org/installing.html \
                     (macOS: brew install pandoc, Debian/Ubuntu: apt install pandoc)"
                )),
            }
        }
        if self.uses_chrome {
            if let Err(e) = locate_chrome(self.config.chrome_path.as_ref()) {
                warnings.push(format!(
                    "PDF output and diagram rendering need Chrome or Chromium: {e}. \
                     Install Chrome or pass --chrome-path"
                ));
            }
        }
        warnings
    }

    /// Convert `input` into every configured format.
    ///
    /// # Errors
    /// `Err` only when the run cannot proceed at all: the input is missing
    /// (checked before anything is created), the input cannot be read, the
    /// output directory cannot be created, or scratch space is unavailable.
    /// Per-diagram and per-format failures are reported inside the result.
    pub async fn process_document(&mut self, input: impl AsRef<Path>) -> Result<ProcessingResult, ForgeError> {
        let start = Instant::now();
        let input = input.as_ref();
        let input = std::path::absolute(input).unwrap_or_else(|_| input.to_path_buf());

        let mut session = match &self.config.temp_root {
            Some(root) => TempSession::new_in(root),
            None => TempSession::new(),
        };
        let span = info_span!("process", session = %session.id(), input = %input.display());

        async {
            match tokio::fs::metadata(&input).await {
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Err(ForgeError::InputNotFound { path: input.clone() });
                }
                Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                    return Err(ForgeError::PermissionDenied { path: input.clone() });
                }
                Err(e) => {
                    return Err(ForgeError::processing_with(
                        format!("cannot access {}", input.display()),
                        e,
                    ))
                }
            }
            info!("Processing {}", input.display());

            let run = self.run(&input, &mut session).await;

            let report = session.cleanup().await;
            debug!(
                "Cleanup removed {} files and {} directories",
                report.files_removed, report.directories_removed
            );
            for failure in &report.failures {
                warn!("Temp cleanup failure: {}", failure);
            }
            self.release_backends().await;

            let (conversions, diagrams) = run?;
            let elapsed_ms = start.elapsed().as_millis() as u64;
            let result = ProcessingResult::from_outcomes(conversions, diagrams, elapsed_ms, session.id());

            self.progress
                .on_complete(result.produced.len(), result.errors.len());
            if result.succeeded() {
                info!(
                    "Produced {} of {} formats in {}ms",
                    result.produced.len(),
                    result.conversions.len(),
                    elapsed_ms
                );
            } else {
                error!("No output produced: {}", result.errors.join("; "));
            }
            Ok(result)
        }
        .instrument(span)
        .await
    }

    async fn run(
        &mut self,
        input: &Path,
        session: &mut TempSession,
    ) -> Result<(Vec<ConversionOutcome>, DiagramStats), ForgeError> {
        // ── Step 1: Read ─────────────────────────────────────────────────
        let content = tokio::fs::read_to_string(input)
            .await
            .map_err(|e| ForgeError::processing_with(format!("failed to read {}", input.display()), e))?;
        self.progress.on_start(input);

        // Rendering pages and pandoc inputs live under the session too.
        let work = session
            .create_dir("work")
            .await
            .map_err(|e| ForgeError::processing_with("failed to create scratch directory", e))?;
        self.set_scratch_dir(Some(&work));

        // ── Step 2: Extract ──────────────────────────────────────────────
        let found = extract_diagrams(&content);
        self.progress.on_diagrams_found(found.len());
        let location = OutputLocation::new(&self.config.output_dir);
        let mut stats = DiagramStats {
            found: found.len(),
            ..Default::default()
        };

        // ── Step 3: Render + rewrite ─────────────────────────────────────
        let working: PathBuf = if found.is_empty() {
            debug!("No diagrams found, using the original document");
            location.ensure_dir().await?;
            input.to_path_buf()
        } else {
            info!("Found {} Mermaid diagrams", found.len());
            let scratch = session
                .create_dir("diagrams")
                .await
                .map_err(|e| ForgeError::processing_with("failed to create diagram scratch directory", e))?;
            let rendered = self
                .diagrams
                .render_all(&found, &scratch, self.progress.as_ref())
                .await;

            location.ensure_dir().await?;
            let persistent = location.diagrams_dir();
            tokio::fs::create_dir_all(&persistent)
                .await
                .map_err(|source| ForgeError::OutputDirectory {
                    path: persistent.clone(),
                    source,
                })?;
            let persisted = persist_diagrams(rendered, &persistent).await;
            stats.rendered = persisted.iter().filter(|r| r.succeeded()).count();
            stats.failed = stats.found - stats.rendered;
            stats.persisted_dir = Some(persistent);

            let rewritten = rewrite_document(&content, &persisted);
            session
                .create_file(rewritten, "md", "processed")
                .await
                .map_err(|e| ForgeError::processing_with("failed to write the processed document", e))?
        };

        // ── Step 4: Convert each format ──────────────────────────────────
        let base = resolve_base_name(self.config.name.as_deref(), input);
        let mut outcomes = Vec::with_capacity(self.config.formats.len());
        for format in &self.config.formats {
            self.progress.on_format_start(format);
            let output = location.output_path(&base, format);
            let outcome = match format.as_str() {
                "pdf" => self.pdf.convert(&working, &output, input).await,
                "docx" => self.docx.convert(&working, &output, input).await,
                other => ConversionOutcome {
                    format: other.to_string(),
                    result: Err(ConversionError::UnsupportedFormat {
                        format: other.to_string(),
                    }),
                },
            };

            match (&outcome.result, outcome.error_message()) {
                (Ok(file), _) => {
                    self.progress
                        .on_format_complete(format, &file.path, file.size_bytes);
                }
                (Err(e), Some(message)) => {
                    error!(kind = ?e.kind(), "{}", message);
                    self.progress.on_format_error(format, &message);
                }
                (Err(_), None) => {}
            }
            outcomes.push(outcome);
        }
        Ok((outcomes, stats))
    }

    fn set_scratch_dir(&mut self, dir: Option<&Path>) {
        self.diagrams.set_scratch_dir(dir);
        self.pdf.set_scratch_dir(dir);
        self.docx.set_scratch_dir(dir);
    }

    async fn release_backends(&mut self) {
        self.set_scratch_dir(None);
        self.diagrams.cleanup().await;
        self.pdf.cleanup().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DiagramFormat;
    use crate::error::DiagramError;
    use crate::pipeline::docx::DocxJob;
    use futures::future::{BoxFuture, FutureExt};
    use tempfile::TempDir;

    struct NoDiagrams;

    impl DiagramBackend for NoDiagrams {
        fn render<'a>(
            &'a mut self,
            _source: &'a str,
            _format: DiagramFormat,
        ) -> BoxFuture<'a, Result<Vec<u8>, DiagramError>> {
            async { Err(DiagramError::Backend("disabled".into())) }.boxed()
        }

        fn release(&mut self) -> BoxFuture<'_, ()> {
            async {}.boxed()
        }
    }

    struct BlankPdf;

    impl PdfBackend for BlankPdf {
        fn print<'a>(
            &'a mut self,
            _html: &'a str,
            _options: &'a crate::config::PdfOptions,
        ) -> BoxFuture<'a, Result<Vec<u8>, ConversionError>> {
            async { Ok(b"%PDF-1.4".to_vec()) }.boxed()
        }

        fn release(&mut self) -> BoxFuture<'_, ()> {
            async {}.boxed()
        }
    }

    /// Remembers every scratch directory it is pointed at.
    #[derive(Clone, Default)]
    struct ScratchPdf {
        seen: Arc<std::sync::Mutex<Vec<Option<PathBuf>>>>,
    }

    impl PdfBackend for ScratchPdf {
        fn print<'a>(
            &'a mut self,
            _html: &'a str,
            _options: &'a crate::config::PdfOptions,
        ) -> BoxFuture<'a, Result<Vec<u8>, ConversionError>> {
            async { Ok(b"%PDF-1.4".to_vec()) }.boxed()
        }

        fn release(&mut self) -> BoxFuture<'_, ()> {
            async {}.boxed()
        }

        fn set_scratch_dir(&mut self, dir: Option<PathBuf>) {
            self.seen.lock().unwrap().push(dir);
        }
    }

    struct BrokenDocx;

    impl DocxBackend for BrokenDocx {
        fn check(&self) -> BoxFuture<'_, Result<String, ConversionError>> {
            async {
                Err(ConversionError::Dependency {
                    tool: "pandoc".into(),
                    detail: "not installed".into(),
                })
            }
            .boxed()
        }

        fn convert<'a>(&'a self, _job: &'a DocxJob) -> BoxFuture<'a, Result<(), ConversionError>> {
            async {
                Err(ConversionError::Dependency {
                    tool: "pandoc".into(),
                    detail: "not installed".into(),
                })
            }
            .boxed()
        }
    }

    fn processor(out: &Path, temp: &Path, formats: &[&str]) -> DocumentProcessor {
        let config = ProcessorConfig::builder()
            .formats(formats.iter().copied())
            .output_dir(out)
            .temp_root(temp)
            .build()
            .unwrap();
        DocumentProcessor::with_backends(config, Box::new(NoDiagrams), Box::new(BlankPdf), Box::new(BrokenDocx))
    }

    #[tokio::test]
    async fn dependency_warnings_name_pandoc_and_unknown_formats() {
        let dir = TempDir::new().unwrap();
        let p = processor(&dir.path().join("out"), dir.path(), &["pdf", "docx", "rtf"]);
        let warnings = p.validate_dependencies().await;
        assert_eq!(warnings.len(), 2, "{warnings:?}");
        assert!(warnings[0].contains("rtf"));
        assert!(warnings[1].contains("pandoc"));
    }

    #[tokio::test]
    async fn plain_document_produces_pdf() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("note.md");
        std::fs::write(&input, "# Note\n\nbody").unwrap();
        let out = dir.path().join("out");
        let mut p = processor(&out, &dir.path().join("tmp"), &["pdf"]);

        let result = p.process_document(&input).await.unwrap();
        assert!(result.succeeded());
        assert_eq!(result.produced, vec![out.join("note.pdf")]);
        assert_eq!(result.diagrams.found, 0);
        assert!(!out.join("diagrams").exists());
        assert!(result.session_id.starts_with("session_"));
    }

    #[tokio::test]
    async fn backends_get_a_scratch_dir_inside_the_session() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("note.md");
        std::fs::write(&input, "# Note").unwrap();
        let temp = dir.path().join("tmp");
        let config = ProcessorConfig::builder()
            .formats(["pdf"])
            .output_dir(dir.path().join("out"))
            .temp_root(&temp)
            .build()
            .unwrap();
        let pdf = ScratchPdf::default();
        let mut p =
            DocumentProcessor::with_backends(config, Box::new(NoDiagrams), Box::new(pdf.clone()), Box::new(BrokenDocx));

        let result = p.process_document(&input).await.unwrap();
        assert!(result.succeeded());

        let seen = pdf.seen.lock().unwrap();
        assert_eq!(seen.len(), 2, "{seen:?}");
        let scratch = seen[0].as_ref().unwrap();
        assert!(scratch.starts_with(temp.join(&result.session_id)), "{}", scratch.display());
        assert!(!scratch.exists());
        assert_eq!(seen[1], None);
    }

    #[tokio::test]
    async fn failed_diagram_keeps_fence_and_run_continues() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("d.md");
        std::fs::write(&input, "```mermaid\ngraph TD\n```\n").unwrap();
        let out = dir.path().join("out");
        let mut p = processor(&out, &dir.path().join("tmp"), &["pdf"]);

        let result = p.process_document(&input).await.unwrap();
        assert!(result.succeeded());
        assert!(result.errors.is_empty());
        assert_eq!(result.diagrams.found, 1);
        assert_eq!(result.diagrams.failed, 1);
        assert!(out.join("diagrams").is_dir());
    }
}
