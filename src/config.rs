//! Configuration types for Markdown → PDF/DOCX conversion.
//!
//! All processing behaviour is controlled through [`ProcessorConfig`], built
//! via its [`ProcessorConfigBuilder`] or loaded from a JSON config file. One
//! struct carries every knob so a run can be logged, serialised into a report
//! and compared against another run.
//!
//! # Design choice: builder over constructor
//! The config has four nested option groups (PDF page geometry, DOCX
//! formatting, Mermaid rendering, paths). The builder lets callers set only
//! what they care about and rely on documented defaults for the rest, and
//! `build()` is the single place where constraints are checked.
//!
//! # Config files
//! Every type here derives serde with camelCase keys and per-field defaults,
//! so a file like
//!
//! ```json
//! { "format": ["pdf"], "theme": "github", "pdf": { "format": "Letter" } }
//! ```
//!
//! loads directly via [`ProcessorConfig::from_file`]. Unknown keys are
//! ignored.

use crate::error::ForgeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, warn};

/// File names searched by [`ProcessorConfig::discover`], in priority order.
pub const CONFIG_FILE_NAMES: &[&str] = &[".markdownforgerc", ".markdownforgerc.json", "markdownforge.json"];

/// Output formats this crate knows how to produce.
pub const SUPPORTED_FORMATS: &[&str] = &["pdf", "docx"];

/// Configuration for a document processing run.
///
/// Built via [`ProcessorConfig::builder()`], loaded with
/// [`ProcessorConfig::from_file`], or using [`ProcessorConfig::default()`].
///
/// # Example
/// ```rust
/// use markdownforge::{ProcessorConfig, Theme};
///
/// let config = ProcessorConfig::builder()
///     .formats(["pdf"])
///     .theme(Theme::Github)
///     .output_dir("./dist")
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProcessorConfig {
    /// Requested output formats, in conversion order. Default: `["pdf", "docx"]`.
    ///
    /// Kept as strings rather than an enum: an unknown name is not a config
    /// error, it becomes a per-format failure entry while the known formats
    /// still convert.
    #[serde(rename = "format")]
    pub formats: Vec<String>,

    /// Directory receiving `<name>.<format>` files and the `diagrams/`
    /// subdirectory. Default: `./output`.
    #[serde(rename = "output")]
    pub output_dir: PathBuf,

    /// Base file name for outputs. If None, uses the input file's stem.
    pub name: Option<String>,

    /// Visual theme for PDF output. Default: [`Theme::Default`].
    pub theme: Theme,

    /// Image format for rendered diagrams. Default: [`DiagramFormat::Png`].
    pub diagram_format: DiagramFormat,

    /// Page geometry and print options for PDF output.
    pub pdf: PdfOptions,

    /// Pandoc invocation and formatting options for DOCX output.
    pub docx: DocxOptions,

    /// Mermaid rendering options.
    pub mermaid: MermaidOptions,

    /// Chrome/Chromium executable. If None, headless_chrome auto-detects it
    /// (also honouring the `CHROME` environment variable).
    pub chrome_path: Option<PathBuf>,

    /// Root under which per-run temp sessions are created. If None, uses
    /// `<system temp>/markdownforge`.
    pub temp_root: Option<PathBuf>,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            formats: SUPPORTED_FORMATS.iter().map(|s| s.to_string()).collect(),
            output_dir: PathBuf::from("./output"),
            name: None,
            theme: Theme::default(),
            diagram_format: DiagramFormat::default(),
            pdf: PdfOptions::default(),
            docx: DocxOptions::default(),
            mermaid: MermaidOptions::default(),
            chrome_path: None,
            temp_root: None,
        }
    }
}

impl ProcessorConfig {
    /// Create a new builder for `ProcessorConfig`.
    pub fn builder() -> ProcessorConfigBuilder {
        ProcessorConfigBuilder {
            config: Self::default(),
        }
    }

    /// Turn an existing config (e.g. one loaded from a file) back into a
    /// builder so individual fields can be overridden.
    pub fn into_builder(self) -> ProcessorConfigBuilder {
        ProcessorConfigBuilder { config: self }
    }

    /// Load and validate a JSON config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ForgeError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ForgeError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }
        let text = std::fs::read_to_string(path).map_err(|e| {
            ForgeError::InvalidConfig(format!("cannot read '{}': {}", path.display(), e))
        })?;
        let mut config: ProcessorConfig = serde_json::from_str(&text).map_err(|e| {
            ForgeError::InvalidConfig(format!("'{}': {}", path.display(), e))
        })?;
        config.formats = normalize_formats(&config.formats);
        config.validate()?;
        debug!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }

    /// Search `dir` and its ancestors for one of [`CONFIG_FILE_NAMES`].
    ///
    /// Returns the path of the first file found together with its parsed
    /// config, or `None` when no config file exists anywhere up the tree.
    pub fn discover(dir: impl AsRef<Path>) -> Result<Option<(PathBuf, Self)>, ForgeError> {
        for ancestor in dir.as_ref().ancestors() {
            for name in CONFIG_FILE_NAMES {
                let candidate = ancestor.join(name);
                if candidate.is_file() {
                    let config = Self::from_file(&candidate)?;
                    return Ok(Some((candidate, config)));
                }
            }
        }
        Ok(None)
    }

    /// Check every constraint. Called by the builder and the file loaders.
    pub fn validate(&self) -> Result<(), ForgeError> {
        if self.formats.is_empty() {
            return Err(ForgeError::InvalidConfig(
                "at least one output format must be requested".into(),
            ));
        }
        if let Some(name) = &self.name {
            if name.trim().is_empty() || name.contains(['/', '\\']) {
                return Err(ForgeError::InvalidConfig(format!(
                    "output name must be a plain file name, got '{name}'"
                )));
            }
        }
        self.pdf.margin.to_inches()?;
        self.mermaid.validate()?;
        self.docx.formatting.colors.validate()?;
        for (label, path) in [
            ("DOCX template", &self.docx.template),
            ("DOCX reference document", &self.docx.reference_doc),
        ] {
            let Some(path) = path else { continue };
            match std::fs::metadata(path) {
                Ok(meta) if !meta.is_file() => {
                    return Err(ForgeError::InvalidConfig(format!(
                        "{label} is not a file: '{}'",
                        path.display()
                    )));
                }
                Ok(_) => {}
                Err(_) => warn!("{label} not found: {}", path.display()),
            }
        }
        Ok(())
    }
}

/// Trim and lower-case format names, dropping empty ones.
fn normalize_formats<I, S>(formats: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    formats
        .into_iter()
        .map(|f| f.as_ref().trim().to_ascii_lowercase())
        .filter(|f| !f.is_empty())
        .collect()
}

/// Builder for [`ProcessorConfig`].
#[derive(Debug)]
pub struct ProcessorConfigBuilder {
    config: ProcessorConfig,
}

impl ProcessorConfigBuilder {
    /// Replace the requested formats. Names are trimmed and lower-cased.
    pub fn formats<I, S>(mut self, formats: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.config.formats = normalize_formats(formats);
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = Some(name.into());
        self
    }

    pub fn theme(mut self, theme: Theme) -> Self {
        self.config.theme = theme;
        self
    }

    pub fn diagram_format(mut self, format: DiagramFormat) -> Self {
        self.config.diagram_format = format;
        self
    }

    pub fn pdf(mut self, pdf: PdfOptions) -> Self {
        self.config.pdf = pdf;
        self
    }

    pub fn page_format(mut self, format: PageFormat) -> Self {
        self.config.pdf.format = format;
        self
    }

    pub fn landscape(mut self, v: bool) -> Self {
        self.config.pdf.landscape = v;
        self
    }

    /// Set all four margins to the same CSS length, e.g. `"20mm"`.
    pub fn margin(mut self, all: impl Into<String>) -> Self {
        self.config.pdf.margin = Margins::uniform(all);
        self
    }

    pub fn header_footer(mut self, header: impl Into<String>, footer: impl Into<String>) -> Self {
        self.config.pdf.display_header_footer = true;
        self.config.pdf.header_template = header.into();
        self.config.pdf.footer_template = footer.into();
        self
    }

    pub fn docx(mut self, docx: DocxOptions) -> Self {
        self.config.docx = docx;
        self
    }

    pub fn reference_doc(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.docx.reference_doc = Some(path.into());
        self
    }

    pub fn docx_template(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.docx.template = Some(path.into());
        self
    }

    pub fn pandoc_path(mut self, path: impl Into<String>) -> Self {
        self.config.docx.pandoc_path = path.into();
        self
    }

    pub fn apply_docx_formatting(mut self, v: bool) -> Self {
        self.config.docx.apply_formatting = v;
        self
    }

    pub fn mermaid(mut self, mermaid: MermaidOptions) -> Self {
        self.config.mermaid = mermaid;
        self
    }

    pub fn mermaid_theme(mut self, theme: MermaidTheme) -> Self {
        self.config.mermaid.theme = theme;
        self
    }

    pub fn chrome_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.chrome_path = Some(path.into());
        self
    }

    pub fn temp_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.temp_root = Some(path.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ProcessorConfig, ForgeError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Visual theme applied to PDF output.
///
/// | Theme | Look |
/// |-------|------|
/// | `default` | System sans-serif, neutral tables (default) |
/// | `github` | GitHub-flavoured spacing, borders and code blocks |
/// | `academic` | Serif body, justified text, centred headings |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Default,
    Github,
    Academic,
}

impl FromStr for Theme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "default" => Ok(Theme::Default),
            "github" => Ok(Theme::Github),
            "academic" => Ok(Theme::Academic),
            other => Err(format!(
                "unknown theme '{other}' (expected default, github or academic)"
            )),
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Theme::Default => "default",
            Theme::Github => "github",
            Theme::Academic => "academic",
        })
    }
}

/// Image format for rendered diagrams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagramFormat {
    /// Screenshot of the rendered element at device scale factor 2. (default)
    #[default]
    Png,
    /// The rendered `<svg>` markup written verbatim.
    Svg,
}

impl DiagramFormat {
    /// File extension without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            DiagramFormat::Png => "png",
            DiagramFormat::Svg => "svg",
        }
    }
}

impl FromStr for DiagramFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "png" => Ok(DiagramFormat::Png),
            "svg" => Ok(DiagramFormat::Svg),
            other => Err(format!("unknown diagram format '{other}' (expected png or svg)")),
        }
    }
}

impl fmt::Display for DiagramFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

// ── PDF options ──────────────────────────────────────────────────────────

/// Paper size for PDF output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PageFormat {
    #[default]
    A4,
    A3,
    Letter,
    Legal,
}

impl PageFormat {
    /// Portrait `(width, height)` in inches.
    pub fn size_inches(self) -> (f64, f64) {
        match self {
            PageFormat::A4 => (8.27, 11.69),
            PageFormat::A3 => (11.69, 16.54),
            PageFormat::Letter => (8.5, 11.0),
            PageFormat::Legal => (8.5, 14.0),
        }
    }
}

impl FromStr for PageFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "a4" => Ok(PageFormat::A4),
            "a3" => Ok(PageFormat::A3),
            "letter" => Ok(PageFormat::Letter),
            "legal" => Ok(PageFormat::Legal),
            other => Err(format!(
                "unknown page format '{other}' (expected A4, A3, Letter or Legal)"
            )),
        }
    }
}

/// Page margins as CSS lengths (`1in`, `20mm`, `2cm`, `72pt`, `96px`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Margins {
    pub top: String,
    pub right: String,
    pub bottom: String,
    pub left: String,
}

impl Default for Margins {
    fn default() -> Self {
        Self::uniform("1in")
    }
}

impl Margins {
    pub fn uniform(all: impl Into<String>) -> Self {
        let all = all.into();
        Self {
            top: all.clone(),
            right: all.clone(),
            bottom: all.clone(),
            left: all,
        }
    }

    /// `[top, right, bottom, left]` in inches.
    pub fn to_inches(&self) -> Result<[f64; 4], ForgeError> {
        let mut out = [0.0; 4];
        for (slot, (side, value)) in out.iter_mut().zip([
            ("top", &self.top),
            ("right", &self.right),
            ("bottom", &self.bottom),
            ("left", &self.left),
        ]) {
            *slot = parse_css_length(value).ok_or_else(|| {
                ForgeError::InvalidConfig(format!("invalid {side} margin '{value}'"))
            })?;
        }
        Ok(out)
    }
}

/// Parse a CSS length into inches. A bare number is taken as pixels.
pub fn parse_css_length(value: &str) -> Option<f64> {
    let v = value.trim().to_ascii_lowercase();
    let split = v
        .find(|c: char| c.is_ascii_alphabetic())
        .unwrap_or(v.len());
    let (number, unit) = v.split_at(split);
    let n: f64 = number.trim().parse().ok()?;
    if !n.is_finite() || n < 0.0 {
        return None;
    }
    let per_inch = match unit {
        "in" => 1.0,
        "cm" => 2.54,
        "mm" => 25.4,
        "pt" => 72.0,
        "px" | "" => 96.0,
        _ => return None,
    };
    Some(n / per_inch)
}

/// Print options for the PDF backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PdfOptions {
    /// Paper size. Default: A4.
    pub format: PageFormat,
    pub landscape: bool,
    /// Default: `1in` on every side.
    pub margin: Margins,
    pub display_header_footer: bool,
    /// Chrome header template HTML (`<span class="pageNumber">` etc.).
    pub header_template: String,
    pub footer_template: String,
    /// Print CSS backgrounds (admonition fills, code block shading). Default: true.
    pub print_background: bool,
}

impl Default for PdfOptions {
    fn default() -> Self {
        Self {
            format: PageFormat::A4,
            landscape: false,
            margin: Margins::default(),
            display_header_footer: false,
            header_template: String::new(),
            footer_template: String::new(),
            print_background: true,
        }
    }
}

// ── DOCX options ─────────────────────────────────────────────────────────

/// Pandoc options for DOCX output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DocxOptions {
    /// Pandoc template file (`--template`).
    pub template: Option<PathBuf>,
    /// Reference DOCX supplying styles (`--reference-doc`).
    pub reference_doc: Option<PathBuf>,
    /// Pandoc executable. Default: `pandoc` (looked up on `PATH`).
    pub pandoc_path: String,
    /// Restyle headings and paragraphs with [`DocxFormatting`]. Default: true.
    pub apply_formatting: bool,
    pub formatting: DocxFormatting,
}

impl Default for DocxOptions {
    fn default() -> Self {
        Self {
            template: None,
            reference_doc: None,
            pandoc_path: "pandoc".to_string(),
            apply_formatting: true,
            formatting: DocxFormatting::default(),
        }
    }
}

/// Space before/after a block, in twips (1/20 pt).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Spacing {
    pub before: u32,
    pub after: u32,
}

/// Heading font sizes in half-points, per level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeadingFontSizes {
    pub h1: u32,
    pub h2: u32,
    pub h3: u32,
    pub h4: u32,
    pub h5: u32,
    pub h6: u32,
}

impl Default for HeadingFontSizes {
    fn default() -> Self {
        Self {
            h1: 32,
            h2: 28,
            h3: 24,
            h4: 22,
            h5: 20,
            h6: 18,
        }
    }
}

impl HeadingFontSizes {
    /// Size for a 1-based heading level; levels past 6 use the h6 size.
    pub fn for_level(&self, level: u8) -> u32 {
        match level {
            0 | 1 => self.h1,
            2 => self.h2,
            3 => self.h3,
            4 => self.h4,
            5 => self.h5,
            _ => self.h6,
        }
    }
}

/// Hex RGB colours without the `#`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocxColors {
    pub headings: String,
    pub text: String,
    pub code: String,
}

impl Default for DocxColors {
    fn default() -> Self {
        Self {
            headings: "2E74B5".into(),
            text: "000000".into(),
            code: "D73A49".into(),
        }
    }
}

impl DocxColors {
    fn validate(&self) -> Result<(), ForgeError> {
        for (field, value) in [
            ("headings", &self.headings),
            ("text", &self.text),
            ("code", &self.code),
        ] {
            let hex = value.trim_start_matches('#');
            if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(ForgeError::InvalidConfig(format!(
                    "docx colour '{field}' must be 6 hex digits, got '{value}'"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Alignment {
    Left,
    Center,
    Right,
    Justified,
}

impl Alignment {
    /// Value of the OpenXML `w:jc` attribute.
    pub fn ooxml(self) -> &'static str {
        match self {
            Alignment::Left => "left",
            Alignment::Center => "center",
            Alignment::Right => "right",
            Alignment::Justified => "both",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocxAlignment {
    pub paragraphs: Alignment,
    pub headings: Alignment,
}

impl Default for DocxAlignment {
    fn default() -> Self {
        Self {
            paragraphs: Alignment::Justified,
            headings: Alignment::Left,
        }
    }
}

/// Formatting applied to DOCX headings and paragraphs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DocxFormatting {
    pub heading_spacing: Spacing,
    pub paragraph_spacing: Spacing,
    /// Spacing for level-1 headings, which open a section.
    pub section_spacing: Spacing,
    /// Body font size in half-points. Default: 22 (11 pt).
    pub font_size: u32,
    pub heading_font_sizes: HeadingFontSizes,
    pub colors: DocxColors,
    pub alignment: DocxAlignment,
}

impl Default for DocxFormatting {
    fn default() -> Self {
        Self {
            heading_spacing: Spacing {
                before: 400,
                after: 200,
            },
            paragraph_spacing: Spacing {
                before: 0,
                after: 150,
            },
            section_spacing: Spacing {
                before: 300,
                after: 200,
            },
            font_size: 22,
            heading_font_sizes: HeadingFontSizes::default(),
            colors: DocxColors::default(),
            alignment: DocxAlignment::default(),
        }
    }
}

// ── Mermaid options ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MermaidTheme {
    #[default]
    Default,
    Dark,
    Forest,
    Neutral,
}

impl MermaidTheme {
    pub fn as_str(self) -> &'static str {
        match self {
            MermaidTheme::Default => "default",
            MermaidTheme::Dark => "dark",
            MermaidTheme::Forest => "forest",
            MermaidTheme::Neutral => "neutral",
        }
    }
}

impl FromStr for MermaidTheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "default" => Ok(MermaidTheme::Default),
            "dark" => Ok(MermaidTheme::Dark),
            "forest" => Ok(MermaidTheme::Forest),
            "neutral" => Ok(MermaidTheme::Neutral),
            other => Err(format!(
                "unknown mermaid theme '{other}' (expected default, dark, forest or neutral)"
            )),
        }
    }
}

/// Options for rendering Mermaid diagrams in the headless browser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MermaidOptions {
    pub theme: MermaidTheme,
    /// CSS colour behind the diagram. Default: `white`.
    pub background_color: String,
    /// Browser viewport width in CSS pixels. Range: 100–2000. Default: 800.
    pub width: u32,
    /// Browser viewport height in CSS pixels. Range: 100–2000. Default: 600.
    pub height: u32,
    /// Where the rendering page loads Mermaid from.
    pub script_url: String,
    /// Page load timeout in seconds. Default: 30.
    pub load_timeout_secs: u64,
    /// Time allowed for Mermaid to signal completion. Default: 15.
    pub render_timeout_secs: u64,
}

impl Default for MermaidOptions {
    fn default() -> Self {
        Self {
            theme: MermaidTheme::Default,
            background_color: "white".into(),
            width: 800,
            height: 600,
            script_url: "https://cdn.jsdelivr.net/npm/mermaid@10/dist/mermaid.min.js".into(),
            load_timeout_secs: 30,
            render_timeout_secs: 15,
        }
    }
}

impl MermaidOptions {
    fn validate(&self) -> Result<(), ForgeError> {
        for (field, value) in [("width", self.width), ("height", self.height)] {
            if !(100..=2000).contains(&value) {
                return Err(ForgeError::InvalidConfig(format!(
                    "mermaid {field} must be 100–2000, got {value}"
                )));
            }
        }
        if self.load_timeout_secs == 0 || self.render_timeout_secs == 0 {
            return Err(ForgeError::InvalidConfig(
                "mermaid timeouts must be ≥ 1 second".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_match_documented_values() {
        let c = ProcessorConfig::default();
        assert_eq!(c.formats, vec!["pdf", "docx"]);
        assert_eq!(c.output_dir, PathBuf::from("./output"));
        assert_eq!(c.theme, Theme::Default);
        assert_eq!(c.diagram_format, DiagramFormat::Png);
        assert_eq!(c.pdf.format, PageFormat::A4);
        assert_eq!(c.pdf.margin.top, "1in");
        assert!(c.pdf.print_background);
        assert_eq!(c.docx.pandoc_path, "pandoc");
        assert_eq!(c.docx.formatting.font_size, 22);
        assert_eq!(c.docx.formatting.heading_font_sizes.for_level(1), 32);
        assert_eq!(c.docx.formatting.heading_font_sizes.for_level(9), 18);
        assert_eq!(c.mermaid.load_timeout_secs, 30);
        assert_eq!(c.mermaid.render_timeout_secs, 15);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn builder_normalises_formats() {
        let c = ProcessorConfig::builder()
            .formats([" PDF ", "", "docx"])
            .build()
            .unwrap();
        assert_eq!(c.formats, vec!["pdf", "docx"]);
    }

    #[test]
    fn builder_rejects_empty_formats() {
        let err = ProcessorConfig::builder()
            .formats(Vec::<String>::new())
            .build()
            .unwrap_err();
        assert!(matches!(err, ForgeError::InvalidConfig(_)));
    }

    #[test]
    fn builder_rejects_bad_margin() {
        let err = ProcessorConfig::builder().margin("wide").build().unwrap_err();
        assert!(err.to_string().contains("margin"), "got: {err}");
    }

    #[test]
    fn builder_rejects_name_with_separator() {
        assert!(ProcessorConfig::builder().name("a/b").build().is_err());
        assert!(ProcessorConfig::builder().name("report").build().is_ok());
    }

    #[test]
    fn mermaid_size_out_of_range() {
        let mermaid = MermaidOptions {
            width: 50,
            ..Default::default()
        };
        assert!(ProcessorConfig::builder().mermaid(mermaid).build().is_err());
    }

    #[test]
    fn css_length_units() {
        assert_eq!(parse_css_length("1in"), Some(1.0));
        assert_eq!(parse_css_length("72pt"), Some(1.0));
        assert_eq!(parse_css_length("96px"), Some(1.0));
        assert_eq!(parse_css_length("96"), Some(1.0));
        assert!((parse_css_length("25.4mm").unwrap() - 1.0).abs() < 1e-9);
        assert!((parse_css_length(" 2.54CM ").unwrap() - 1.0).abs() < 1e-9);
        assert_eq!(parse_css_length("1em"), None);
        assert_eq!(parse_css_length("-1in"), None);
        assert_eq!(parse_css_length(""), None);
    }

    #[test]
    fn enums_parse_case_insensitively() {
        assert_eq!("GitHub".parse::<Theme>().unwrap(), Theme::Github);
        assert_eq!("svg".parse::<DiagramFormat>().unwrap(), DiagramFormat::Svg);
        assert_eq!("letter".parse::<PageFormat>().unwrap(), PageFormat::Letter);
        assert_eq!("forest".parse::<MermaidTheme>().unwrap(), MermaidTheme::Forest);
        assert!("sepia".parse::<Theme>().is_err());
    }

    #[test]
    fn justified_maps_to_ooxml_both() {
        assert_eq!(Alignment::Justified.ooxml(), "both");
        assert_eq!(Alignment::Center.ooxml(), "center");
    }

    #[test]
    fn loads_partial_json_with_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("markdownforge.json");
        std::fs::write(
            &path,
            r#"{
                "format": ["pdf"],
                "theme": "academic",
                "diagramFormat": "svg",
                "verbose": true,
                "pdf": { "format": "Letter", "margin": { "top": "2cm" } },
                "docx": { "formatting": { "colors": { "headings": "FF0000" } } },
                "mermaid": { "theme": "dark", "width": 1200 }
            }"#,
        )
        .unwrap();

        let c = ProcessorConfig::from_file(&path).unwrap();
        assert_eq!(c.formats, vec!["pdf"]);
        assert_eq!(c.theme, Theme::Academic);
        assert_eq!(c.diagram_format, DiagramFormat::Svg);
        assert_eq!(c.pdf.format, PageFormat::Letter);
        assert_eq!(c.pdf.margin.top, "2cm");
        assert_eq!(c.pdf.margin.left, "1in");
        assert_eq!(c.docx.formatting.colors.headings, "FF0000");
        assert_eq!(c.docx.formatting.colors.code, "D73A49");
        assert_eq!(c.mermaid.theme, MermaidTheme::Dark);
        assert_eq!(c.mermaid.width, 1200);
        assert_eq!(c.mermaid.height, 600);
    }

    #[test]
    fn file_format_names_are_normalized() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("markdownforge.json");
        std::fs::write(&path, r#"{"format": ["PDF", " Docx ", ""]}"#).unwrap();
        let c = ProcessorConfig::from_file(&path).unwrap();
        assert_eq!(c.formats, vec!["pdf", "docx"]);

        std::fs::write(&path, r#"{"format": ["  "]}"#).unwrap();
        let err = ProcessorConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, ForgeError::InvalidConfig(_)));
    }

    #[test]
    fn from_file_missing_is_config_not_found() {
        let dir = TempDir::new().unwrap();
        let err = ProcessorConfig::from_file(dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, ForgeError::ConfigNotFound { .. }));
    }

    #[test]
    fn from_file_invalid_json_is_invalid_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".markdownforgerc");
        std::fs::write(&path, "{ format: pdf").unwrap();
        let err = ProcessorConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, ForgeError::InvalidConfig(_)));
    }

    #[test]
    fn from_file_rejects_bad_colour() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("c.json");
        std::fs::write(&path, r#"{"docx":{"formatting":{"colors":{"text":"black"}}}}"#).unwrap();
        assert!(ProcessorConfig::from_file(&path).is_err());
    }

    #[test]
    fn discover_walks_up_to_ancestor() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a/b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(dir.path().join(".markdownforgerc"), r#"{"theme":"github"}"#).unwrap();

        let (found, config) = ProcessorConfig::discover(&nested).unwrap().unwrap();
        assert_eq!(found, dir.path().join(".markdownforgerc"));
        assert_eq!(config.theme, Theme::Github);
    }

    #[test]
    fn into_builder_overrides_loaded_values() {
        let loaded = ProcessorConfig {
            theme: Theme::Academic,
            ..Default::default()
        };
        let c = loaded.into_builder().formats(["docx"]).build().unwrap();
        assert_eq!(c.theme, Theme::Academic);
        assert_eq!(c.formats, vec!["docx"]);
    }
}
