//! PDF conversion: Markdown file → themed HTML → printed PDF.
//!
//! ## Why print from a browser?
//!
//! The themes are CSS, the admonitions are styled `<div>`s and diagrams may
//! be SVG. A browser's print path renders all of it exactly as a preview
//! would, with real page geometry and header/footer templates, and needs no
//! separate layout engine. [`PdfBackend`] keeps the browser swappable.

use crate::chrome::{BrowserSlot, ChromeOptions};
use crate::config::{PdfOptions, Theme};
use crate::error::ConversionError;
use crate::output::{ConversionOutcome, ProducedFile};
use crate::pipeline::html::render_html_document;
use futures::future::{BoxFuture, FutureExt};
use headless_chrome::types::PrintToPdfOptions;
use headless_chrome::Browser;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Header used when header/footer display is on but no template is set.
const DEFAULT_HEADER: &str = "<span></span>";
const DEFAULT_FOOTER: &str = r#"<div style="font-size:9px;width:100%;text-align:center;color:#666;"><span class="pageNumber"></span> / <span class="totalPages"></span></div>"#;

/// Anything that can print a complete HTML page to PDF bytes.
pub trait PdfBackend: Send {
    fn print<'a>(
        &'a mut self,
        html: &'a str,
        options: &'a PdfOptions,
    ) -> BoxFuture<'a, Result<Vec<u8>, ConversionError>>;

    fn release(&mut self) -> BoxFuture<'_, ()>;

    /// Directory for the intermediate print page. `None` falls back to the
    /// system temp directory.
    fn set_scratch_dir(&mut self, _dir: Option<PathBuf>) {}
}

/// Converts one Markdown file to one PDF file.
pub struct PdfConverter {
    backend: Box<dyn PdfBackend>,
    theme: Theme,
    options: PdfOptions,
}

impl PdfConverter {
    pub fn new(backend: Box<dyn PdfBackend>, theme: Theme, options: PdfOptions) -> Self {
        Self {
            backend,
            theme,
            options,
        }
    }

    /// Convert `document` to `output`.
    ///
    /// Relative image paths resolve against the directory of `original`,
    /// which differs from `document` when diagrams were rewritten into a
    /// scratch copy.
    pub async fn convert(&mut self, document: &Path, output: &Path, original: &Path) -> ConversionOutcome {
        ConversionOutcome {
            format: "pdf".to_string(),
            result: self.try_convert(document, output, original).await,
        }
    }

    async fn try_convert(
        &mut self,
        document: &Path,
        output: &Path,
        original: &Path,
    ) -> Result<ProducedFile, ConversionError> {
        info!("Converting to PDF: {}", output.display());
        let markdown = tokio::fs::read_to_string(document)
            .await
            .map_err(|e| ConversionError::ReadFailed {
                path: document.to_path_buf(),
                detail: e.to_string(),
            })?;

        let base_dir = original.parent().unwrap_or_else(|| Path::new("."));
        let title = output
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        let html = render_html_document(&markdown, self.theme, base_dir, &title).await;
        debug!("Generated {} bytes of HTML", html.len());

        let bytes = self.backend.print(&html, &self.options).await?;
        if bytes.is_empty() {
            return Err(ConversionError::EmptyOutput {
                path: output.to_path_buf(),
            });
        }

        write_atomically(output, &bytes).await?;
        let size_bytes = tokio::fs::metadata(output)
            .await
            .map(|m| m.len())
            .map_err(|e| ConversionError::OutputWrite {
                path: output.to_path_buf(),
                detail: e.to_string(),
            })?;
        if size_bytes == 0 {
            return Err(ConversionError::EmptyOutput {
                path: output.to_path_buf(),
            });
        }

        info!("PDF generated: {} ({} bytes)", output.display(), size_bytes);
        Ok(ProducedFile {
            path: output.to_path_buf(),
            size_bytes,
        })
    }

    pub fn set_scratch_dir(&mut self, dir: Option<&Path>) {
        self.backend.set_scratch_dir(dir.map(Path::to_path_buf));
    }

    /// Release the backend. Safe to call repeatedly.
    pub async fn cleanup(&mut self) {
        self.backend.release().await;
    }
}

/// Write to `<output>.tmp`, then rename, so a failed write never leaves a
/// truncated PDF behind.
async fn write_atomically(output: &Path, bytes: &[u8]) -> Result<(), ConversionError> {
    let write_err = |e: std::io::Error| ConversionError::OutputWrite {
        path: output.to_path_buf(),
        detail: e.to_string(),
    };
    let mut tmp = output.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, bytes).await.map_err(write_err)?;
    if let Err(e) = tokio::fs::rename(&tmp, output).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(write_err(e));
    }
    Ok(())
}

// ── Chrome backend ───────────────────────────────────────────────────────

/// Prints through headless Chrome's `Page.printToPDF`.
pub struct ChromePdfBackend {
    slot: BrowserSlot,
    page_timeout: Duration,
    scratch: Option<PathBuf>,
}

impl ChromePdfBackend {
    pub fn new(chrome_path: Option<PathBuf>) -> Self {
        Self {
            slot: BrowserSlot::new(ChromeOptions {
                path: chrome_path,
                ..ChromeOptions::default()
            }),
            page_timeout: Duration::from_secs(60),
            scratch: None,
        }
    }
}

impl PdfBackend for ChromePdfBackend {
    fn print<'a>(
        &'a mut self,
        html: &'a str,
        options: &'a PdfOptions,
    ) -> BoxFuture<'a, Result<Vec<u8>, ConversionError>> {
        async move {
            let print_options = print_options(options)?;
            let browser = self
                .slot
                .acquire()
                .await
                .map_err(|detail| ConversionError::Dependency {
                    tool: "Chrome".to_string(),
                    detail,
                })?;

            let page = write_page(html, self.scratch.as_deref())?;
            let url = format!("file://{}", page.path().display());
            let timeout = self.page_timeout;

            let result = tokio::task::spawn_blocking(move || print_in_tab(&browser, &url, timeout, print_options))
                .await
                .map_err(|e| ConversionError::Backend(format!("print task panicked: {e}")))?;
            drop(page);
            result
        }
        .boxed()
    }

    fn release(&mut self) -> BoxFuture<'_, ()> {
        async move {
            self.slot.release();
        }
        .boxed()
    }

    fn set_scratch_dir(&mut self, dir: Option<PathBuf>) {
        self.scratch = dir;
    }
}

fn write_page(html: &str, dir: Option<&Path>) -> Result<tempfile::NamedTempFile, ConversionError> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("document-").suffix(".html");
    let mut file = match dir {
        Some(dir) => builder.tempfile_in(dir),
        None => builder.tempfile(),
    }
    .map_err(|e| ConversionError::Backend(format!("cannot create print page: {e}")))?;
    file.write_all(html.as_bytes())
        .map_err(|e| ConversionError::Backend(format!("cannot write print page: {e}")))?;
    Ok(file)
}

fn print_in_tab(
    browser: &Browser,
    url: &str,
    timeout: Duration,
    options: PrintToPdfOptions,
) -> Result<Vec<u8>, ConversionError> {
    let tab = browser
        .new_tab()
        .map_err(|e| ConversionError::Backend(format!("failed to open tab: {e}")))?;
    tab.set_default_timeout(timeout);

    let result = tab
        .navigate_to(url)
        .and_then(|t| t.wait_until_navigated())
        .map_err(|e| ConversionError::Backend(format!("failed to load document: {e}")))
        .and_then(|t| {
            t.print_to_pdf(Some(options))
                .map_err(|e| ConversionError::Backend(format!("print failed: {e}")))
        });

    if let Err(e) = tab.close(true) {
        debug!("Failed to close print tab: {}", e);
    }
    result
}

/// Translate [`PdfOptions`] into Chrome's print parameters (inches).
pub fn print_options(options: &PdfOptions) -> Result<PrintToPdfOptions, ConversionError> {
    let [top, right, bottom, left] = options
        .margin
        .to_inches()
        .map_err(|e| ConversionError::Backend(e.to_string()))?;
    let (width, height) = options.format.size_inches();

    let (header, footer) = if options.display_header_footer {
        (
            non_empty_or(&options.header_template, DEFAULT_HEADER),
            non_empty_or(&options.footer_template, DEFAULT_FOOTER),
        )
    } else {
        (None, None)
    };

    Ok(PrintToPdfOptions {
        landscape: Some(options.landscape),
        display_header_footer: Some(options.display_header_footer),
        print_background: Some(options.print_background),
        paper_width: Some(width),
        paper_height: Some(height),
        margin_top: Some(top),
        margin_bottom: Some(bottom),
        margin_left: Some(left),
        margin_right: Some(right),
        header_template: header,
        footer_template: footer,
        prefer_css_page_size: Some(false),
        ..Default::default()
    })
}

fn non_empty_or(template: &str, fallback: &str) -> Option<String> {
    Some(if template.trim().is_empty() {
        fallback.to_string()
    } else {
        template.to_string()
    })
}
