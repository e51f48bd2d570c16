//! DOCX conversion through pandoc.
//!
//! ## Why a generated Lua filter?
//!
//! Pandoc maps Markdown onto the styles of a reference document, which is
//! the right tool for lists, tables and admonition styles but cannot express
//! "justify body text, colour headings, 11 pt, 150 twips after each
//! paragraph" without a hand-built `.docx`. The filter generated from
//! [`DocxFormatting`] rewrites top-level headings and plain paragraphs as raw
//! OpenXML carrying those properties and leaves everything else alone.
//! Paragraphs holding links, images, notes or other rich inlines also pass
//! through untouched so nothing pandoc knows how to render is lost.
//!
//! Admonitions are turned into fenced divs with `custom-style` before pandoc
//! sees the document; a reference document may define the matching
//! `Admonition Warning`, `Admonition Note`, ... paragraph styles.

use crate::config::{DocxFormatting, DocxOptions};
use crate::error::ConversionError;
use crate::output::{ConversionOutcome, ProducedFile};
use crate::pipeline::admonition::to_pandoc_divs;
use futures::future::{BoxFuture, FutureExt};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const PANDOC_INSTALL_HINT: &str = "install pandoc from https://pandoc.org/installing.html or set docx.pandocPath";

/// Everything one pandoc invocation needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocxJob {
    /// Preprocessed Markdown to convert.
    pub input: PathBuf,
    pub output: PathBuf,
    /// Directories searched for relative images, in order.
    pub resource_paths: Vec<PathBuf>,
    pub reference_doc: Option<PathBuf>,
    pub template: Option<PathBuf>,
    pub lua_filter: Option<PathBuf>,
}

/// A Markdown → DOCX engine.
pub trait DocxBackend: Send + Sync {
    /// Probe the engine; returns its version line.
    fn check(&self) -> BoxFuture<'_, Result<String, ConversionError>>;

    fn convert<'a>(&'a self, job: &'a DocxJob) -> BoxFuture<'a, Result<(), ConversionError>>;
}

/// Converts one Markdown file to one DOCX file.
pub struct DocxConverter {
    backend: Box<dyn DocxBackend>,
    options: DocxOptions,
    scratch: Option<PathBuf>,
}

impl DocxConverter {
    pub fn new(backend: Box<dyn DocxBackend>, options: DocxOptions) -> Self {
        Self {
            backend,
            options,
            scratch: None,
        }
    }

    /// Parent directory for the per-conversion pandoc inputs. `None` falls
    /// back to the system temp directory.
    pub fn set_scratch_dir(&mut self, dir: Option<&Path>) {
        self.scratch = dir.map(Path::to_path_buf);
    }

    pub fn backend(&self) -> &dyn DocxBackend {
        self.backend.as_ref()
    }

    /// Convert `document` to `output`; relative assets resolve against the
    /// directory of `original` first, then that of `document`.
    pub async fn convert(&self, document: &Path, output: &Path, original: &Path) -> ConversionOutcome {
        ConversionOutcome {
            format: "docx".to_string(),
            result: self.try_convert(document, output, original).await,
        }
    }

    async fn try_convert(
        &self,
        document: &Path,
        output: &Path,
        original: &Path,
    ) -> Result<ProducedFile, ConversionError> {
        info!("Converting to DOCX: {}", output.display());
        let markdown = tokio::fs::read_to_string(document)
            .await
            .map_err(|e| ConversionError::ReadFailed {
                path: document.to_path_buf(),
                detail: e.to_string(),
            })?;

        let mut builder = tempfile::Builder::new();
        builder.prefix("markdownforge-docx-");
        let scratch = match &self.scratch {
            Some(dir) => builder.tempdir_in(dir),
            None => builder.tempdir(),
        }
        .map_err(|e| ConversionError::Backend(format!("cannot create scratch directory: {e}")))?;
        let scratch_err = |e: std::io::Error| ConversionError::Backend(format!("cannot write scratch file: {e}"));

        let input = scratch.path().join("document.md");
        tokio::fs::write(&input, to_pandoc_divs(&markdown))
            .await
            .map_err(scratch_err)?;

        let lua_filter = if self.options.apply_formatting {
            let path = scratch.path().join("formatting.lua");
            tokio::fs::write(&path, lua_filter(&self.options.formatting))
                .await
                .map_err(scratch_err)?;
            Some(path)
        } else {
            None
        };

        let mut resource_paths = Vec::with_capacity(2);
        for dir in [original.parent(), document.parent()].into_iter().flatten() {
            let dir = if dir.as_os_str().is_empty() { Path::new(".") } else { dir };
            if !resource_paths.iter().any(|p: &PathBuf| p == dir) {
                resource_paths.push(dir.to_path_buf());
            }
        }

        let job = DocxJob {
            input,
            output: output.to_path_buf(),
            resource_paths,
            reference_doc: existing(self.options.reference_doc.as_deref(), "reference document"),
            template: existing(self.options.template.as_deref(), "template"),
            lua_filter,
        };
        self.backend.convert(&job).await?;

        let size_bytes = match tokio::fs::metadata(output).await {
            Ok(m) => m.len(),
            Err(e) => {
                return Err(ConversionError::OutputWrite {
                    path: output.to_path_buf(),
                    detail: format!("converter reported success but the file is missing: {e}"),
                })
            }
        };
        if size_bytes == 0 {
            return Err(ConversionError::EmptyOutput {
                path: output.to_path_buf(),
            });
        }
        info!("DOCX generated: {} ({} bytes)", output.display(), size_bytes);
        Ok(ProducedFile {
            path: output.to_path_buf(),
            size_bytes,
        })
    }
}

/// Configured style file, if it exists. Missing files are skipped with a warning.
fn existing(path: Option<&Path>, what: &str) -> Option<PathBuf> {
    let path = path?;
    if path.is_file() {
        Some(path.to_path_buf())
    } else {
        warn!("DOCX {} not found, ignoring: {}", what, path.display());
        None
    }
}

// ── Pandoc backend ───────────────────────────────────────────────────────

/// Runs the pandoc executable through `tokio::process`.
#[derive(Debug, Clone)]
pub struct PandocBackend {
    program: String,
}

impl PandocBackend {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn missing(&self, e: &std::io::Error) -> ConversionError {
        let detail = if e.kind() == std::io::ErrorKind::NotFound {
            format!("executable '{}' not found; {}", self.program, PANDOC_INSTALL_HINT)
        } else {
            format!("failed to start '{}': {}", self.program, e)
        };
        ConversionError::Dependency {
            tool: "pandoc".to_string(),
            detail,
        }
    }
}

impl Default for PandocBackend {
    fn default() -> Self {
        Self::new("pandoc")
    }
}

impl DocxBackend for PandocBackend {
    fn check(&self) -> BoxFuture<'_, Result<String, ConversionError>> {
        async move {
            let out = tokio::process::Command::new(&self.program)
                .arg("--version")
                .output()
                .await
                .map_err(|e| self.missing(&e))?;
            if !out.status.success() {
                return Err(ConversionError::Dependency {
                    tool: "pandoc".to_string(),
                    detail: format!("'{} --version' exited with {}", self.program, out.status),
                });
            }
            let stdout = String::from_utf8_lossy(&out.stdout);
            Ok(stdout.lines().next().unwrap_or("pandoc").trim().to_string())
        }
        .boxed()
    }

    fn convert<'a>(&'a self, job: &'a DocxJob) -> BoxFuture<'a, Result<(), ConversionError>> {
        async move {
            let args = pandoc_args(job)?;
            debug!("Running {} with {} arguments", self.program, args.len());
            let out = tokio::process::Command::new(&self.program)
                .args(&args)
                .output()
                .await
                .map_err(|e| self.missing(&e))?;
            if out.status.success() {
                let stderr = String::from_utf8_lossy(&out.stderr);
                for line in stderr.lines().filter(|l| !l.trim().is_empty()) {
                    debug!("pandoc: {}", line);
                }
                Ok(())
            } else {
                let stderr = String::from_utf8_lossy(&out.stderr);
                Err(ConversionError::Backend(format!(
                    "pandoc exited with {}: {}",
                    out.status,
                    stderr.trim()
                )))
            }
        }
        .boxed()
    }
}

/// Command-line arguments for one job.
pub fn pandoc_args(job: &DocxJob) -> Result<Vec<OsString>, ConversionError> {
    let mut args: Vec<OsString> = ["-f", "markdown", "-t", "docx", "-o"]
        .into_iter()
        .map(OsString::from)
        .collect();
    args.push(job.output.clone().into_os_string());

    if !job.resource_paths.is_empty() {
        let joined = std::env::join_paths(&job.resource_paths)
            .map_err(|e| ConversionError::Backend(format!("invalid resource path: {e}")))?;
        let mut flag = OsString::from("--resource-path=");
        flag.push(joined);
        args.push(flag);
    }
    for (flag, value) in [
        ("--reference-doc=", &job.reference_doc),
        ("--template=", &job.template),
        ("--lua-filter=", &job.lua_filter),
    ] {
        if let Some(path) = value {
            let mut arg = OsString::from(flag);
            arg.push(path);
            args.push(arg);
        }
    }
    args.push(job.input.clone().into_os_string());
    Ok(args)
}

// ── Formatting filter ────────────────────────────────────────────────────

/// Pandoc Lua filter applying `formatting` to top-level headings and
/// paragraphs.
pub fn lua_filter(formatting: &DocxFormatting) -> String {
    let f = formatting;
    let hex = |s: &str| s.trim_start_matches('#').to_ascii_uppercase();
    let sizes = &f.heading_font_sizes;
    let settings = format!(
        r#"-- Generated by markdownforge from the DOCX formatting options.
local cfg = {{
  heading_sizes = {{ {h1}, {h2}, {h3}, {h4}, {h5}, {h6} }},
  body_size = {body},
  heading_color = "{heading_color}",
  text_color = "{text_color}",
  code_color = "{code_color}",
  heading_spacing = {{ before = {hb}, after = {ha} }},
  section_spacing = {{ before = {sb}, after = {sa} }},
  paragraph_spacing = {{ before = {pb}, after = {pa} }},
  heading_jc = "{heading_jc}",
  paragraph_jc = "{paragraph_jc}",
}}
"#,
        h1 = sizes.h1,
        h2 = sizes.h2,
        h3 = sizes.h3,
        h4 = sizes.h4,
        h5 = sizes.h5,
        h6 = sizes.h6,
        body = f.font_size,
        heading_color = hex(&f.colors.headings),
        text_color = hex(&f.colors.text),
        code_color = hex(&f.colors.code),
        hb = f.heading_spacing.before,
        ha = f.heading_spacing.after,
        sb = f.section_spacing.before,
        sa = f.section_spacing.after,
        pb = f.paragraph_spacing.before,
        pa = f.paragraph_spacing.after,
        heading_jc = f.alignment.headings.ooxml(),
        paragraph_jc = f.alignment.paragraphs.ooxml(),
    );
    [settings.as_str(), LUA_FILTER_BODY].concat()
}

const LUA_FILTER_BODY: &str = r#"
local function escape(s)
  return (s:gsub('&', '&amp;'):gsub('<', '&lt;'):gsub('>', '&gt;'))
end

local function with(props, key, value)
  local copy = {}
  for k, v in pairs(props) do copy[k] = v end
  copy[key] = value
  return copy
end

local function run(text, props)
  local rpr = {}
  if props.code then
    rpr[#rpr + 1] = '<w:rFonts w:ascii="Consolas" w:hAnsi="Consolas" w:cs="Consolas"/>'
  end
  if props.bold then rpr[#rpr + 1] = '<w:b/>' end
  if props.italic then rpr[#rpr + 1] = '<w:i/>' end
  if props.strike then rpr[#rpr + 1] = '<w:strike/>' end
  rpr[#rpr + 1] = '<w:color w:val="' .. props.color .. '"/>'
  rpr[#rpr + 1] = '<w:sz w:val="' .. props.size .. '"/><w:szCs w:val="' .. props.size .. '"/>'
  return '<w:r><w:rPr>' .. table.concat(rpr) .. '</w:rPr><w:t xml:space="preserve">'
    .. escape(text) .. '</w:t></w:r>'
end

-- Returns false when an inline cannot be expressed as plain runs.
local function collect(inlines, props, out)
  for _, el in ipairs(inlines) do
    local t = el.t
    if t == 'Str' then
      out[#out + 1] = run(el.text, props)
    elseif t == 'Space' or t == 'SoftBreak' then
      out[#out + 1] = run(' ', props)
    elseif t == 'LineBreak' then
      out[#out + 1] = '<w:r><w:br/></w:r>'
    elseif t == 'Emph' then
      if not collect(el.content, with(props, 'italic', true), out) then return false end
    elseif t == 'Strong' then
      if not collect(el.content, with(props, 'bold', true), out) then return false end
    elseif t == 'Strikeout' then
      if not collect(el.content, with(props, 'strike', true), out) then return false end
    elseif t == 'Code' then
      out[#out + 1] = run(el.text, with(with(props, 'code', true), 'color', cfg.code_color))
    else
      return false
    end
  end
  return true
end

local function paragraph(style, spacing, jc, inlines, props)
  local runs = {}
  if not collect(inlines, props, runs) then return nil end
  local ppr = '<w:pPr>'
  if style then ppr = ppr .. '<w:pStyle w:val="' .. style .. '"/>' end
  ppr = ppr .. '<w:spacing w:before="' .. spacing.before .. '" w:after="' .. spacing.after .. '"/>'
  ppr = ppr .. '<w:jc w:val="' .. jc .. '"/></w:pPr>'
  return pandoc.RawBlock('openxml', '<w:p>' .. ppr .. table.concat(runs) .. '</w:p>')
end

local function skip(el)
  return el, false
end

return {
  {
    traverse = 'topdown',
    Header = function(el)
      local level = math.min(el.level, 6)
      local spacing = level == 1 and cfg.section_spacing or cfg.heading_spacing
      local props = { bold = true, color = cfg.heading_color, size = cfg.heading_sizes[level] }
      return paragraph('Heading' .. level, spacing, cfg.heading_jc, el.content, props)
    end,
    Para = function(el)
      local props = { color = cfg.text_color, size = cfg.body_size }
      return paragraph(nil, cfg.paragraph_spacing, cfg.paragraph_jc, el.content, props)
    end,
    BlockQuote = skip,
    BulletList = skip,
    OrderedList = skip,
    DefinitionList = skip,
    Div = skip,
    Table = skip,
    Figure = skip,
    LineBlock = skip,
  },
}
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Alignment, DocxAlignment};
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Writes a stub file and remembers the job it was given.
    #[derive(Default)]
    struct StubBackend {
        jobs: Mutex<Vec<(DocxJob, String)>>,
        write: bool,
    }

    impl DocxBackend for StubBackend {
        fn check(&self) -> BoxFuture<'_, Result<String, ConversionError>> {
            async { Ok("stub 1.0".to_string()) }.boxed()
        }

        fn convert<'a>(&'a self, job: &'a DocxJob) -> BoxFuture<'a, Result<(), ConversionError>> {
            async move {
                let input = std::fs::read_to_string(&job.input).unwrap();
                self.jobs.lock().unwrap().push((job.clone(), input));
                if self.write {
                    std::fs::write(&job.output, b"PK\x03\x04 docx").unwrap();
                }
                Ok(())
            }
            .boxed()
        }
    }

    fn job(dir: &Path) -> DocxJob {
        DocxJob {
            input: dir.join("in.md"),
            output: dir.join("out.docx"),
            resource_paths: vec![dir.join("src"), dir.join("work")],
            reference_doc: Some(dir.join("ref.docx")),
            template: None,
            lua_filter: Some(dir.join("f.lua")),
        }
    }

    #[test]
    fn args_have_io_and_resource_path() {
        let dir = Path::new("/tmp/x");
        let args = pandoc_args(&job(dir)).unwrap();
        let args: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(&args[..6], &["-f", "markdown", "-t", "docx", "-o", "/tmp/x/out.docx"]);
        let sep = if cfg!(windows) { ";" } else { ":" };
        assert!(args.contains(&format!("--resource-path=/tmp/x/src{sep}/tmp/x/work")));
        assert!(args.contains(&"--reference-doc=/tmp/x/ref.docx".to_string()));
        assert!(args.contains(&"--lua-filter=/tmp/x/f.lua".to_string()));
        assert!(!args.iter().any(|a| a.starts_with("--template")));
        assert_eq!(args.last().unwrap(), "/tmp/x/in.md");
    }

    #[test]
    fn filter_embeds_formatting_values() {
        let mut f = DocxFormatting::default();
        f.colors.headings = "#ff0000".into();
        f.alignment = DocxAlignment {
            paragraphs: Alignment::Left,
            headings: Alignment::Center,
        };
        let lua = lua_filter(&f);
        assert!(lua.contains(r#"heading_color = "FF0000""#));
        assert!(lua.contains("heading_sizes = { 32, 28, 24, 22, 20, 18 }"));
        assert!(lua.contains(r#"paragraph_jc = "left""#));
        assert!(lua.contains(r#"heading_jc = "center""#));
        assert!(lua.contains("paragraph_spacing = { before = 0, after = 150 }"));
        assert!(lua.contains("traverse = 'topdown'"));
    }

    #[tokio::test]
    async fn converter_preprocesses_and_builds_job() {
        let src = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        let original = src.path().join("doc.md");
        std::fs::write(&original, "unused").unwrap();
        let document = work.path().join("processed.md");
        std::fs::write(&document, "# T\n\n!!! warning \"Hot\"\n    Careful\n").unwrap();
        let output = work.path().join("doc.docx");

        let backend = StubBackend {
            write: true,
            ..Default::default()
        };
        let converter = DocxConverter::new(Box::new(backend), DocxOptions::default());
        let outcome = converter.convert(&document, &output, &original).await;
        assert!(outcome.succeeded(), "{:?}", outcome.error_message());
        assert_eq!(outcome.format, "docx");
        assert_eq!(outcome.size_bytes(), Some(9));
    }

    #[tokio::test]
    async fn job_contents_seen_by_backend() {
        let work = TempDir::new().unwrap();
        let document = work.path().join("doc.md");
        std::fs::write(&document, "!!! tip\n    Use it\n").unwrap();

        let backend = std::sync::Arc::new(StubBackend {
            write: true,
            ..Default::default()
        });
        struct Shared(std::sync::Arc<StubBackend>);
        impl DocxBackend for Shared {
            fn check(&self) -> BoxFuture<'_, Result<String, ConversionError>> {
                self.0.check()
            }
            fn convert<'a>(&'a self, job: &'a DocxJob) -> BoxFuture<'a, Result<(), ConversionError>> {
                self.0.convert(job)
            }
        }

        let options = DocxOptions {
            apply_formatting: false,
            reference_doc: Some(work.path().join("absent.docx")),
            ..Default::default()
        };
        let converter = DocxConverter::new(Box::new(Shared(backend.clone())), options);
        let outcome = converter
            .convert(&document, &work.path().join("doc.docx"), &document)
            .await;
        assert!(outcome.succeeded());

        let jobs = backend.jobs.lock().unwrap();
        let (job, input) = &jobs[0];
        assert!(input.starts_with("::: {custom-style=\"Admonition Tip\"}"));
        assert_eq!(job.lua_filter, None);
        assert_eq!(job.reference_doc, None);
        assert_eq!(job.resource_paths, vec![work.path().to_path_buf()]);
    }

    #[tokio::test]
    async fn pandoc_inputs_live_under_scratch_dir() {
        let dir = TempDir::new().unwrap();
        let scratch = dir.path().join("session_1/work");
        std::fs::create_dir_all(&scratch).unwrap();
        let document = dir.path().join("doc.md");
        std::fs::write(&document, "# T").unwrap();

        let backend = std::sync::Arc::new(StubBackend {
            write: true,
            ..Default::default()
        });
        struct Shared(std::sync::Arc<StubBackend>);
        impl DocxBackend for Shared {
            fn check(&self) -> BoxFuture<'_, Result<String, ConversionError>> {
                self.0.check()
            }
            fn convert<'a>(&'a self, job: &'a DocxJob) -> BoxFuture<'a, Result<(), ConversionError>> {
                self.0.convert(job)
            }
        }

        let mut converter = DocxConverter::new(Box::new(Shared(backend.clone())), DocxOptions::default());
        converter.set_scratch_dir(Some(&scratch));
        let outcome = converter
            .convert(&document, &dir.path().join("doc.docx"), &document)
            .await;
        assert!(outcome.succeeded());

        let jobs = backend.jobs.lock().unwrap();
        let job = &jobs[0].0;
        assert!(job.input.starts_with(&scratch), "{}", job.input.display());
        assert!(job.lua_filter.as_ref().unwrap().starts_with(&scratch));
        // The per-conversion directory is gone once convert returns.
        assert_eq!(std::fs::read_dir(&scratch).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn missing_output_file_is_reported() {
        let dir = TempDir::new().unwrap();
        let document = dir.path().join("doc.md");
        std::fs::write(&document, "# T").unwrap();
        let converter = DocxConverter::new(Box::<StubBackend>::default(), DocxOptions::default());
        let outcome = converter
            .convert(&document, &dir.path().join("doc.docx"), &document)
            .await;
        assert!(matches!(outcome.result, Err(ConversionError::OutputWrite { .. })));
    }

    #[tokio::test]
    async fn absent_pandoc_is_a_dependency_error() {
        let dir = TempDir::new().unwrap();
        let document = dir.path().join("doc.md");
        std::fs::write(&document, "# T").unwrap();
        let backend = PandocBackend::new("markdownforge-no-such-pandoc");

        let err = backend.check().await.unwrap_err();
        assert!(matches!(err, ConversionError::Dependency { ref tool, .. } if tool == "pandoc"));

        let converter = DocxConverter::new(Box::new(backend), DocxOptions::default());
        let outcome = converter
            .convert(&document, &dir.path().join("doc.docx"), &document)
            .await;
        let message = outcome.error_message().unwrap();
        assert!(message.starts_with("DOCX conversion failed: pandoc is not available"), "{message}");
        assert!(!dir.path().join("doc.docx").exists());
    }

    #[tokio::test]
    async fn real_pandoc_when_enabled() {
        if std::env::var("E2E_ENABLED").is_err() {
            return;
        }
        let dir = TempDir::new().unwrap();
        let document = dir.path().join("doc.md");
        std::fs::write(&document, "# Title\n\nSome *text* with `code`.\n\n- item\n").unwrap();
        let converter = DocxConverter::new(Box::new(PandocBackend::default()), DocxOptions::default());
        let outcome = converter
            .convert(&document, &dir.path().join("doc.docx"), &document)
            .await;
        assert!(outcome.succeeded(), "{:?}", outcome.error_message());
    }
}
