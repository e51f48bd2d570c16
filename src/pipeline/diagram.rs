//! Diagram rendering: Mermaid source → PNG or SVG file on disk.
//!
//! ## Why a backend trait?
//!
//! The renderer's job is orchestration: name files, render one diagram at a
//! time, validate what comes back, write it, and never let one bad diagram
//! stop the rest. *How* pixels are produced is a [`DiagramBackend`]'s
//! business. The default, [`ChromeDiagramBackend`], runs Mermaid in headless
//! Chrome; tests plug in an in-process fake so the orchestration can be
//! exercised without a browser.
//!
//! ## Why sequential?
//!
//! Diagrams render one after another on a single tab-per-diagram browser.
//! Output order then matches document order trivially and a failure is
//! attributed to exactly one fence.

use crate::chrome::{BrowserSlot, ChromeOptions};
use crate::config::{DiagramFormat, MermaidOptions};
use crate::error::DiagramError;
use crate::output::DiagramRenderResult;
use crate::pipeline::admonition::escape_html;
use crate::pipeline::extract::DiagramDescriptor;
use crate::progress::ProcessingProgressCallback;
use futures::future::{BoxFuture, FutureExt};
use headless_chrome::protocol::cdp::Page;
use headless_chrome::{Browser, Tab};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// CSS selector of the rendered diagram inside the rendering page.
pub const DIAGRAM_SELECTOR: &str = "#diagram-container svg";

/// Anything that can turn Mermaid source into image bytes.
///
/// Implementations may hold expensive resources (a browser) that are
/// acquired on first use; [`release`](DiagramBackend::release) must free them
/// and leave the backend usable again.
pub trait DiagramBackend: Send {
    fn render<'a>(
        &'a mut self,
        source: &'a str,
        format: DiagramFormat,
    ) -> BoxFuture<'a, Result<Vec<u8>, DiagramError>>;

    fn release(&mut self) -> BoxFuture<'_, ()>;

    /// Directory for intermediate files such as rendering pages. `None`
    /// falls back to the system temp directory.
    fn set_scratch_dir(&mut self, _dir: Option<PathBuf>) {}
}

/// File name for the diagram at 0-based `index`: `diagram-<index+1>.<ext>`.
pub fn diagram_file_name(index: usize, format: DiagramFormat) -> String {
    format!("diagram-{}.{}", index + 1, format.extension())
}

/// Drives a [`DiagramBackend`] over a document's diagrams.
pub struct DiagramRenderer {
    backend: Box<dyn DiagramBackend>,
    format: DiagramFormat,
}

impl DiagramRenderer {
    pub fn new(backend: Box<dyn DiagramBackend>, format: DiagramFormat) -> Self {
        Self { backend, format }
    }

    pub fn format(&self) -> DiagramFormat {
        self.format
    }

    /// Point the backend's intermediate files at `dir`.
    pub fn set_scratch_dir(&mut self, dir: Option<&Path>) {
        self.backend.set_scratch_dir(dir.map(Path::to_path_buf));
    }

    /// Render one diagram and write it to `output_path`.
    pub async fn render_one(&mut self, source: &str, output_path: &Path) -> Result<PathBuf, DiagramError> {
        let bytes = self.backend.render(source, self.format).await?;
        validate_output(&bytes, self.format)?;
        tokio::fs::write(output_path, &bytes)
            .await
            .map_err(|e| DiagramError::WriteFailed {
                path: output_path.to_path_buf(),
                detail: e.to_string(),
            })?;
        debug!("Diagram written: {} ({} bytes)", output_path.display(), bytes.len());
        Ok(output_path.to_path_buf())
    }

    /// Render every descriptor into `out_dir`, one at a time, in order.
    ///
    /// Always returns exactly one result per descriptor.
    pub async fn render_all(
        &mut self,
        diagrams: &[DiagramDescriptor],
        out_dir: &Path,
        progress: &dyn ProcessingProgressCallback,
    ) -> Vec<DiagramRenderResult> {
        let total = diagrams.len();
        let mut results = Vec::with_capacity(total);

        for diagram in diagrams {
            let number = diagram.index + 1;
            let path = out_dir.join(diagram_file_name(diagram.index, self.format));
            debug!("Rendering diagram {}/{}", number, total);

            let outcome = self.render_one(&diagram.source, &path).await;
            match &outcome {
                Ok(_) => progress.on_diagram_rendered(number, total),
                Err(e) => {
                    warn!("Failed to render diagram {}: {}", number, e);
                    progress.on_diagram_failed(number, total, &e.to_string());
                }
            }
            results.push(DiagramRenderResult {
                index: diagram.index,
                original_match: diagram.original_match.clone(),
                span: diagram.span.clone(),
                outcome,
            });
        }

        let ok = results.iter().filter(|r| r.succeeded()).count();
        info!("Successfully rendered {}/{} diagrams", ok, total);
        results
    }

    /// Release the backend's resources. Safe to call repeatedly.
    pub async fn cleanup(&mut self) {
        self.backend.release().await;
    }
}

/// Reject empty output and bytes that are not the requested format.
fn validate_output(bytes: &[u8], format: DiagramFormat) -> Result<(), DiagramError> {
    let invalid = |detail: &str| DiagramError::InvalidOutput {
        format: format.to_string(),
        detail: detail.to_string(),
    };
    if bytes.is_empty() {
        return Err(invalid("backend returned no data"));
    }
    match format {
        DiagramFormat::Png => match image::guess_format(bytes) {
            Ok(image::ImageFormat::Png) => Ok(()),
            _ => Err(invalid("data is not a PNG image")),
        },
        DiagramFormat::Svg => {
            let text = String::from_utf8_lossy(bytes);
            if text.trim_start().starts_with("<svg") || text.contains("<svg ") {
                Ok(())
            } else {
                Err(invalid("data does not contain <svg> markup"))
            }
        }
    }
}

// ── Chrome backend ───────────────────────────────────────────────────────

/// Renders Mermaid in headless Chrome.
///
/// Each diagram gets a scratch HTML page loading Mermaid from
/// [`MermaidOptions::script_url`]. The page sets `window.mermaidRendered`
/// when done and `window.mermaidError` on a syntax error; the backend polls
/// for the former, then either screenshots the `<svg>` element at scale
/// factor 2 or reads its `outerHTML`.
pub struct ChromeDiagramBackend {
    slot: BrowserSlot,
    options: MermaidOptions,
    scratch: Option<PathBuf>,
}

impl ChromeDiagramBackend {
    pub fn new(options: MermaidOptions, chrome_path: Option<PathBuf>) -> Self {
        let slot = BrowserSlot::new(ChromeOptions {
            path: chrome_path,
            window: (options.width, options.height),
            ..ChromeOptions::default()
        });
        Self {
            slot,
            options,
            scratch: None,
        }
    }
}

impl DiagramBackend for ChromeDiagramBackend {
    fn render<'a>(
        &'a mut self,
        source: &'a str,
        format: DiagramFormat,
    ) -> BoxFuture<'a, Result<Vec<u8>, DiagramError>> {
        async move {
            let browser = self
                .slot
                .acquire()
                .await
                .map_err(|detail| DiagramError::BackendLaunch { detail })?;

            let page = write_page(&mermaid_page(source, &self.options), self.scratch.as_deref())?;
            let url = format!("file://{}", page.path().display());
            let options = self.options.clone();

            let result = tokio::task::spawn_blocking(move || render_in_tab(&browser, &url, &options, format))
                .await
                .map_err(|e| DiagramError::Backend(format!("render task panicked: {e}")))?;
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

fn write_page(html: &str, dir: Option<&Path>) -> Result<tempfile::NamedTempFile, DiagramError> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("mermaid-").suffix(".html");
    let mut file = match dir {
        Some(dir) => builder.tempfile_in(dir),
        None => builder.tempfile(),
    }
    .map_err(|e| DiagramError::Backend(format!("cannot create diagram page: {e}")))?;
    file.write_all(html.as_bytes())
        .map_err(|e| DiagramError::Backend(format!("cannot write diagram page: {e}")))?;
    Ok(file)
}

/// Blocking: open a tab, render, capture, always close the tab.
fn render_in_tab(
    browser: &Browser,
    url: &str,
    options: &MermaidOptions,
    format: DiagramFormat,
) -> Result<Vec<u8>, DiagramError> {
    let tab = browser
        .new_tab()
        .map_err(|e| DiagramError::Backend(format!("failed to open tab: {e}")))?;
    let result = capture(&tab, url, options, format);
    if let Err(e) = tab.close(true) {
        debug!("Failed to close diagram tab: {}", e);
    }
    result
}

fn capture(
    tab: &Arc<Tab>,
    url: &str,
    options: &MermaidOptions,
    format: DiagramFormat,
) -> Result<Vec<u8>, DiagramError> {
    tab.set_default_timeout(Duration::from_secs(options.load_timeout_secs));
    tab.navigate_to(url)
        .and_then(|t| t.wait_until_navigated())
        .map_err(|e| DiagramError::ContentLoad {
            secs: options.load_timeout_secs,
            detail: e.to_string(),
        })?;

    let deadline = Instant::now() + Duration::from_secs(options.render_timeout_secs);
    loop {
        let done = tab
            .evaluate("window.mermaidRendered === true", false)
            .ok()
            .and_then(|o| o.value)
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        if done {
            break;
        }
        if Instant::now() >= deadline {
            return Err(DiagramError::RenderTimeout {
                secs: options.render_timeout_secs,
            });
        }
        std::thread::sleep(Duration::from_millis(100));
    }

    let error = tab
        .evaluate("window.mermaidError", false)
        .ok()
        .and_then(|o| o.value)
        .and_then(|v| v.as_str().map(str::to_string));
    if let Some(message) = error {
        return Err(DiagramError::Syntax { message });
    }

    match format {
        DiagramFormat::Svg => {
            let script = format!(
                "(() => {{ const el = document.querySelector('{DIAGRAM_SELECTOR}'); return el ? el.outerHTML : null; }})()"
            );
            let svg = tab
                .evaluate(&script, false)
                .map_err(|e| DiagramError::Backend(e.to_string()))?
                .value
                .and_then(|v| v.as_str().map(str::to_string))
                .ok_or_else(|| DiagramError::MissingElement {
                    selector: DIAGRAM_SELECTOR.to_string(),
                })?;
            Ok(svg.into_bytes())
        }
        DiagramFormat::Png => {
            let element = tab
                .wait_for_element_with_custom_timeout(DIAGRAM_SELECTOR, Duration::from_secs(2))
                .map_err(|_| DiagramError::MissingElement {
                    selector: DIAGRAM_SELECTOR.to_string(),
                })?;
            let mut clip = element
                .get_box_model()
                .map_err(|e| DiagramError::Backend(format!("cannot measure diagram: {e}")))?
                .margin_viewport();
            clip.scale = 2.0;
            tab.capture_screenshot(
                Page::CaptureScreenshotFormatOption::Png,
                None,
                Some(clip),
                true,
            )
            .map_err(|e| DiagramError::Backend(format!("screenshot failed: {e}")))
        }
    }
}

/// Minimal page that renders `source` into `#diagram-container`.
pub fn mermaid_page(source: &str, options: &MermaidOptions) -> String {
    // serde_json produces a safe JS string literal.
    let js_str = |s: &str| serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string());
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<style>
  html, body {{ margin: 0; padding: 0; background: {bg_css}; }}
  #diagram-container {{ display: inline-block; padding: 16px; background: {bg_css}; }}
</style>
<script src="{script}"></script>
</head>
<body>
<div id="diagram-container"><pre id="diagram-source" style="display:none">{source}</pre></div>
<script>
window.mermaidRendered = false;
window.mermaidError = null;
(async function () {{
  try {{
    if (typeof mermaid === 'undefined') {{
      throw new Error('Mermaid library failed to load');
    }}
    mermaid.initialize({{
      startOnLoad: false,
      theme: {theme},
      securityLevel: 'loose',
      themeVariables: {{ background: {bg_js} }}
    }});
    const text = document.getElementById('diagram-source').textContent;
    const result = await mermaid.render('diagram-svg', text);
    document.getElementById('diagram-container').innerHTML = result.svg;
  }} catch (e) {{
    window.mermaidError = String((e && e.message) || e);
  }} finally {{
    window.mermaidRendered = true;
  }}
}})();
</script>
</body>
</html>
"#,
        bg_css = escape_html(&options.background_color),
        bg_js = js_str(&options.background_color),
        script = escape_html(&options.script_url),
        source = escape_html(source),
        theme = js_str(options.theme.as_str()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::extract::extract_diagrams;
    use crate::progress::NoopProgressCallback;
    use tempfile::TempDir;

    const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];

    /// Fails any source containing "FAIL", else returns a PNG header.
    struct FakeBackend {
        calls: usize,
        released: usize,
    }

    impl DiagramBackend for FakeBackend {
        fn render<'a>(
            &'a mut self,
            source: &'a str,
            format: DiagramFormat,
        ) -> BoxFuture<'a, Result<Vec<u8>, DiagramError>> {
            async move {
                self.calls += 1;
                if source.contains("FAIL") {
                    return Err(DiagramError::Syntax {
                        message: "Parse error".into(),
                    });
                }
                Ok(match format {
                    DiagramFormat::Png => PNG_MAGIC.to_vec(),
                    DiagramFormat::Svg => b"<svg xmlns=\"http://www.w3.org/2000/svg\"></svg>".to_vec(),
                })
            }
            .boxed()
        }

        fn release(&mut self) -> BoxFuture<'_, ()> {
            async move { self.released += 1 }.boxed()
        }
    }

    fn fake() -> Box<FakeBackend> {
        Box::new(FakeBackend { calls: 0, released: 0 })
    }

    #[test]
    fn file_names_are_one_based() {
        assert_eq!(diagram_file_name(0, DiagramFormat::Png), "diagram-1.png");
        assert_eq!(diagram_file_name(9, DiagramFormat::Svg), "diagram-10.svg");
    }

    #[test]
    fn validation_rules() {
        assert!(validate_output(PNG_MAGIC, DiagramFormat::Png).is_ok());
        assert!(validate_output(b"", DiagramFormat::Png).is_err());
        assert!(validate_output(b"<svg></svg>", DiagramFormat::Png).is_err());
        assert!(validate_output(b"<svg viewBox=\"0 0 1 1\"/>", DiagramFormat::Svg).is_ok());
        assert!(validate_output(b"null", DiagramFormat::Svg).is_err());
    }

    #[tokio::test]
    async fn render_all_isolates_failures_and_keeps_order() {
        let dir = TempDir::new().unwrap();
        let doc = "```mermaid\ngraph TD\n```\n```mermaid\nFAIL\n```\n```mermaid\npie\n```\n";
        let diagrams = extract_diagrams(doc);
        let mut renderer = DiagramRenderer::new(fake(), DiagramFormat::Png);

        let results = renderer.render_all(&diagrams, dir.path(), &NoopProgressCallback).await;
        assert_eq!(results.len(), 3);
        assert_eq!(results.iter().map(|r| r.index).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert!(results[0].succeeded());
        assert!(!results[1].succeeded());
        assert!(results[2].succeeded());
        assert!(dir.path().join("diagram-1.png").exists());
        assert!(!dir.path().join("diagram-2.png").exists());
        assert!(dir.path().join("diagram-3.png").exists());
        assert_eq!(results[1].original_match, diagrams[1].original_match);
    }

    #[tokio::test]
    async fn render_one_reports_write_failure() {
        let dir = TempDir::new().unwrap();
        let mut renderer = DiagramRenderer::new(fake(), DiagramFormat::Svg);
        let err = renderer
            .render_one("graph TD", &dir.path().join("missing/dir/d.svg"))
            .await
            .unwrap_err();
        assert!(matches!(err, DiagramError::WriteFailed { .. }));
    }

    #[tokio::test]
    async fn cleanup_releases_backend() {
        let mut renderer = DiagramRenderer::new(fake(), DiagramFormat::Png);
        renderer.cleanup().await;
        renderer.cleanup().await;
    }

    #[test]
    fn page_escapes_source_and_options() {
        let options = MermaidOptions {
            background_color: "#fff\"".into(),
            ..Default::default()
        };
        let page = mermaid_page("graph TD\nA[\"<b>\"]-->B</script>", &options);
        assert!(page.contains("&lt;/script&gt;"));
        assert!(!page.contains("B</script>"));
        assert!(page.contains(r#"theme: "default""#));
        assert!(page.contains(r##"background: "#fff\"""##));
        assert!(page.contains("window.mermaidRendered = true"));
    }

    #[tokio::test]
    async fn chrome_backend_renders_when_enabled() {
        if std::env::var("E2E_ENABLED").is_err() {
            return;
        }
        let dir = TempDir::new().unwrap();
        let backend = ChromeDiagramBackend::new(MermaidOptions::default(), None);
        let mut renderer = DiagramRenderer::new(Box::new(backend), DiagramFormat::Png);
        let path = renderer
            .render_one("graph TD\n  A-->B", &dir.path().join("d.png"))
            .await
            .expect("render should succeed");
        assert!(std::fs::metadata(path).unwrap().len() > 0);
        renderer.cleanup().await;
    }
}
