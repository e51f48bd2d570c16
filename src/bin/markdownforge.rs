//! CLI binary for markdownforge.
//!
//! A thin shim over the library crate that layers CLI flags over an
//! optional JSON config file, runs one document and prints the results.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use markdownforge::location::{display_path, format_file_size};
use markdownforge::pipeline::input::validate_input;
use markdownforge::temp::{default_root, DEFAULT_MAX_AGE};
use markdownforge::{
    ConversionError, DiagramFormat, DocumentProcessor, ErrorKind, ForgeError, MermaidTheme,
    OutputLocation, PageFormat, ProcessingProgressCallback, ProcessingResult, ProcessorConfig,
    ProgressCallback, TempSession, Theme,
};
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner at the bottom of the terminal with one log line per diagram and
/// per format above it.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.set_message("Reading document…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl ProcessingProgressCallback for CliProgressCallback {
    fn on_start(&self, input: &Path) {
        self.bar.set_message(format!("Reading {}", display_path(input)));
    }

    fn on_diagrams_found(&self, count: usize) {
        if count > 0 {
            self.bar.set_prefix("Diagrams");
            self.bar.set_message(format!("rendering {count} Mermaid diagram(s)…"));
        }
    }

    fn on_diagram_rendered(&self, index: usize, total: usize) {
        self.bar
            .println(format!("  {} Diagram {:>2}/{:<2}", green("✓"), index, total));
    }

    fn on_diagram_failed(&self, index: usize, total: usize, error: &str) {
        // Keep the terminal tidy.
        let msg: String = if error.chars().count() > 80 {
            error.chars().take(79).chain(std::iter::once('…')).collect()
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} Diagram {:>2}/{:<2}  {}  {}",
            red("✗"),
            index,
            total,
            red(&msg),
            dim("(left as code)")
        ));
    }

    fn on_format_start(&self, format: &str) {
        self.bar.set_prefix("Converting");
        self.bar.set_message(format.to_ascii_uppercase());
    }

    fn on_format_complete(&self, format: &str, path: &Path, size_bytes: u64) {
        self.bar.println(format!(
            "  {} {:<5} {}  {}",
            green("✓"),
            format.to_ascii_uppercase(),
            bold(&display_path(path)),
            dim(&format_file_size(size_bytes))
        ));
    }

    fn on_format_error(&self, format: &str, error: &str) {
        self.bar.println(format!(
            "  {} {:<5} {}",
            red("✗"),
            format.to_ascii_uppercase(),
            red(error)
        ));
    }

    fn on_complete(&self, _produced: usize, _failed: usize) {
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # PDF and DOCX into ./output
  markdownforge guide.md

  # PDF only, GitHub theme, into dist/
  markdownforge guide.md -f pdf --theme github -o dist

  # Exact output file name
  markdownforge guide.md -f pdf -o handbook.pdf

  # SVG diagrams, landscape Letter pages
  markdownforge guide.md --diagram-format svg --page-format letter --landscape

  # DOCX with corporate styles
  markdownforge guide.md -f docx --reference-doc corporate.docx

  # Check that Chrome and pandoc are installed
  markdownforge --check-deps

CONFIG FILES:
  .markdownforgerc, .markdownforgerc.json or markdownforge.json in the current
  directory or any parent (or --config FILE). JSON keys: format, output, name,
  theme, diagramFormat, pdf, docx, mermaid. Flags override file values.

EXIT CODES:
  0 success   1 general   2 input   3 output   4 dependency   5 processing   6 config
"#;

#[derive(Parser, Debug)]
#[command(
    name = "markdownforge",
    version,
    about = "Convert Markdown with Mermaid diagrams to styled PDF and DOCX",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Markdown file to convert.
    #[arg(required_unless_present_any = ["check_deps", "purge_temp"])]
    input: Option<PathBuf>,

    /// Output directory, or an output file such as `report.pdf`.
    #[arg(short, long, env = "MARKDOWNFORGE_OUTPUT")]
    output: Option<PathBuf>,

    /// Output formats, comma separated: pdf, docx.
    #[arg(short, long = "format", value_delimiter = ',', env = "MARKDOWNFORGE_FORMAT")]
    formats: Vec<String>,

    /// Base name of output files. Default: the input file's name.
    #[arg(short, long)]
    name: Option<String>,

    /// PDF theme: default, github, academic.
    #[arg(short, long)]
    theme: Option<Theme>,

    /// Diagram image format: png, svg.
    #[arg(long)]
    diagram_format: Option<DiagramFormat>,

    /// Mermaid theme: default, dark, forest, neutral.
    #[arg(long)]
    mermaid_theme: Option<MermaidTheme>,

    /// PDF paper size: a4, a3, letter, legal.
    #[arg(long)]
    page_format: Option<PageFormat>,

    #[arg(long)]
    landscape: bool,

    /// PDF margin on every side, e.g. `20mm` or `1in`.
    #[arg(long)]
    margin: Option<String>,

    /// Reference DOCX supplying styles.
    #[arg(long)]
    reference_doc: Option<PathBuf>,

    /// Pandoc template file.
    #[arg(long)]
    docx_template: Option<PathBuf>,

    /// Skip the generated DOCX formatting filter.
    #[arg(long)]
    no_docx_formatting: bool,

    /// Config file. Default: search the current directory and its parents.
    #[arg(short, long, env = "MARKDOWNFORGE_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long, env = "MARKDOWNFORGE_CHROME")]
    chrome_path: Option<PathBuf>,

    #[arg(long, env = "MARKDOWNFORGE_PANDOC")]
    pandoc_path: Option<String>,

    /// Write a JSON report; optionally give its path.
    #[arg(long, num_args = 0..=1)]
    report: Option<Option<PathBuf>>,

    /// Check for Chrome and pandoc, then exit.
    #[arg(long)]
    check_deps: bool,

    /// Remove temp sessions older than 24 hours left by crashed runs.
    #[arg(long)]
    purge_temp: bool,

    #[arg(long, env = "MARKDOWNFORGE_NO_PROGRESS")]
    no_progress: bool,

    #[arg(short, long)]
    verbose: bool,

    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Library INFO logs are noise while the spinner is showing.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.verbose;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .init();

    match run(&cli, show_progress).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{} {:#}", red("Error:"), err);
            ExitCode::from(exit_code_for(&err))
        }
    }
}

async fn run(cli: &Cli, show_progress: bool) -> Result<ExitCode> {
    let config = build_config(cli)?;

    if cli.purge_temp {
        let removed = TempSession::purge_stale(&purge_root(&config), DEFAULT_MAX_AGE).await;
        if !cli.quiet {
            eprintln!("{} Removed {} stale temp session(s)", green("✔"), removed);
        }
    }
    let mut processor = DocumentProcessor::new(config);

    if cli.check_deps {
        let warnings = processor.validate_dependencies().await;
        if warnings.is_empty() {
            eprintln!("{} All dependencies available", green("✔"));
            return Ok(ExitCode::SUCCESS);
        }
        for warning in &warnings {
            eprintln!("{} {}", yellow("⚠"), warning);
        }
        return Ok(ExitCode::from(4));
    }

    let Some(input) = &cli.input else {
        return Ok(ExitCode::SUCCESS);
    };
    let input = validate_input(input).await.context("Invalid input")?;

    if show_progress {
        processor = processor.with_progress(CliProgressCallback::new() as ProgressCallback);
    }

    let result = processor
        .process_document(&input.path)
        .await
        .context("Processing failed")?;

    if cli.report.is_some() || !cli.quiet {
        print_summary(&result, cli.quiet, show_progress);
    }

    if let Some(report_path) = &cli.report {
        let location = OutputLocation::new(&processor.config().output_dir);
        let report = location.create_report(&result.produced, result.elapsed_ms).await;
        let saved = location
            .save_report(&report, report_path.as_deref())
            .await
            .context("Failed to write report")?;
        if !cli.quiet {
            eprintln!("   report: {}", display_path(&saved));
        }
    }

    Ok(if result.succeeded() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(failure_code(&result))
    })
}

fn print_summary(result: &ProcessingResult, quiet: bool, show_progress: bool) {
    if quiet {
        return;
    }
    // The callback already printed per-format lines.
    if !show_progress {
        for conversion in &result.conversions {
            match (&conversion.result, conversion.error_message()) {
                (Ok(file), _) => eprintln!(
                    "  {} {}  {}",
                    green("✓"),
                    bold(&display_path(&file.path)),
                    dim(&format_file_size(file.size_bytes))
                ),
                (Err(_), Some(message)) => eprintln!("  {} {}", red("✗"), red(&message)),
                (Err(_), None) => {}
            }
        }
    }

    let d = &result.diagrams;
    if d.found > 0 {
        eprintln!(
            "   diagrams: {}/{} rendered{}",
            d.rendered,
            d.found,
            if d.failed > 0 {
                yellow(&format!(", {} left as code", d.failed))
            } else {
                String::new()
            }
        );
    }

    let icon = if !result.succeeded() {
        red("✘")
    } else if result.errors.is_empty() {
        green("✔")
    } else {
        yellow("⚠")
    };
    eprintln!(
        "{} {}/{} formats  {}  {}ms",
        icon,
        result.produced.len(),
        result.conversions.len(),
        dim(&format_file_size(result.total_bytes())),
        result.elapsed_ms
    );
}

/// Layer: defaults < config file < CLI flags.
/// Where `--purge-temp` looks for stale sessions.
fn purge_root(config: &ProcessorConfig) -> PathBuf {
    config.temp_root.clone().unwrap_or_else(default_root)
}

fn build_config(cli: &Cli) -> Result<ProcessorConfig> {
    let base = match &cli.config {
        Some(path) => ProcessorConfig::from_file(path).context("Failed to load config file")?,
        None => {
            let cwd = std::env::current_dir().context("Cannot determine the current directory")?;
            match ProcessorConfig::discover(&cwd).context("Failed to load config file")? {
                Some((path, config)) => {
                    tracing::debug!("Using config file {}", path.display());
                    config
                }
                None => ProcessorConfig::default(),
            }
        }
    };

    let mut builder = base.into_builder();
    if !cli.formats.is_empty() {
        builder = builder.formats(&cli.formats);
    }
    if let Some(output) = &cli.output {
        let (dir, name) = split_output_arg(output);
        builder = builder.output_dir(dir);
        if let Some(name) = name {
            builder = builder.name(name);
        }
    }
    if let Some(name) = &cli.name {
        builder = builder.name(name.clone());
    }
    if let Some(theme) = cli.theme {
        builder = builder.theme(theme);
    }
    if let Some(format) = cli.diagram_format {
        builder = builder.diagram_format(format);
    }
    if let Some(theme) = cli.mermaid_theme {
        builder = builder.mermaid_theme(theme);
    }
    if let Some(format) = cli.page_format {
        builder = builder.page_format(format);
    }
    if cli.landscape {
        builder = builder.landscape(true);
    }
    if let Some(margin) = &cli.margin {
        builder = builder.margin(margin.clone());
    }
    if let Some(path) = &cli.reference_doc {
        builder = builder.reference_doc(path.clone());
    }
    if let Some(path) = &cli.docx_template {
        builder = builder.docx_template(path.clone());
    }
    if cli.no_docx_formatting {
        builder = builder.apply_docx_formatting(false);
    }
    if let Some(path) = &cli.chrome_path {
        builder = builder.chrome_path(path.clone());
    }
    if let Some(path) = &cli.pandoc_path {
        builder = builder.pandoc_path(path.clone());
    }
    builder.build().context("Invalid configuration")
}

/// `-o report.pdf` names a file (dir `.`, name `report`); anything without
/// an extension is a directory.
fn split_output_arg(output: &Path) -> (PathBuf, Option<String>) {
    match (output.extension(), output.file_stem()) {
        (Some(_), Some(stem)) => {
            let dir = match output.parent() {
                Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
                _ => PathBuf::from("."),
            };
            (dir, Some(stem.to_string_lossy().into_owned()))
        }
        _ => (output.to_path_buf(), None),
    }
}

fn code_for_kind(kind: ErrorKind) -> u8 {
    match kind {
        ErrorKind::Input => 2,
        ErrorKind::Output => 3,
        ErrorKind::Dependency => 4,
        ErrorKind::Processing => 5,
        ErrorKind::Config => 6,
    }
}

fn exit_code_for(err: &anyhow::Error) -> u8 {
    err.chain()
        .find_map(|e| e.downcast_ref::<ForgeError>())
        .map(|e| code_for_kind(e.kind()))
        .unwrap_or(1)
}

/// Exit code when no format succeeded: the band of the first failure.
fn failure_code(result: &ProcessingResult) -> u8 {
    result
        .conversions
        .iter()
        .find_map(|c| c.result.as_ref().err())
        .map(ConversionError::kind)
        .map(code_for_kind)
        .unwrap_or(5)
}
