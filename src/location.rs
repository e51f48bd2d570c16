//! Output Location Manager: where finished files go.
//!
//! The output directory is resolved to an absolute path once, so every path
//! this module returns (and every path in [`crate::ProcessingResult`]) is
//! absolute regardless of later working-directory changes.

use crate::error::ForgeError;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Name of the persistent diagrams subdirectory.
pub const DIAGRAMS_DIR: &str = "diagrams";

/// Resolved output directory plus path helpers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLocation {
    dir: PathBuf,
}

impl OutputLocation {
    /// Resolve `dir` against the current directory. Nothing is created yet.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            dir: std::path::absolute(dir).unwrap_or_else(|_| dir.to_path_buf()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `<output>/diagrams`.
    pub fn diagrams_dir(&self) -> PathBuf {
        self.dir.join(DIAGRAMS_DIR)
    }

    /// Create the output directory and its parents.
    pub async fn ensure_dir(&self) -> Result<(), ForgeError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| ForgeError::OutputDirectory {
                path: self.dir.clone(),
                source,
            })?;
        debug!("Output directory ensured: {}", self.dir.display());
        Ok(())
    }

    /// `<output>/<base>.<format>`. Existing files are overwritten.
    pub fn output_path(&self, base: &str, format: &str) -> PathBuf {
        self.dir.join(format!("{base}.{format}"))
    }

    /// Like [`output_path`](Self::output_path) but appends `_1`, `_2`, …
    /// until the name is free.
    pub async fn unique_output_path(&self, base: &str, format: &str) -> PathBuf {
        let mut candidate = self.output_path(base, format);
        let mut counter = 1;
        while tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
            candidate = self.dir.join(format!("{base}_{counter}.{format}"));
            counter += 1;
        }
        candidate
    }

    /// Whether the output directory exists and is not read-only.
    pub async fn is_writable(&self) -> bool {
        match tokio::fs::metadata(&self.dir).await {
            Ok(meta) => meta.is_dir() && !meta.permissions().readonly(),
            Err(_) => false,
        }
    }

    /// Stat each existing path. Missing paths are skipped.
    pub async fn summarize(&self, paths: &[PathBuf]) -> OutputSummary {
        let mut summary = OutputSummary::default();
        let mut formats = BTreeSet::new();
        for path in paths {
            match tokio::fs::metadata(path).await {
                Ok(meta) => {
                    let format = path
                        .extension()
                        .map(|e| e.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    formats.insert(format.clone());
                    summary.total_size += meta.len();
                    summary.files.push(OutputFileInfo {
                        name: path
                            .file_name()
                            .map(|n| n.to_string_lossy().into_owned())
                            .unwrap_or_default(),
                        path: path.clone(),
                        size: meta.len(),
                        format,
                    });
                }
                Err(e) => warn!("Failed to get stats for {}: {}", path.display(), e),
            }
        }
        summary.formats = formats.into_iter().collect();
        summary
    }

    /// Build the JSON-serialisable run report.
    pub async fn create_report(&self, paths: &[PathBuf], processing_time_ms: u64) -> OutputReport {
        let summary = self.summarize(paths).await;
        OutputReport {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            processing_time_ms,
            output_directory: self.dir.clone(),
            total_files: summary.files.len(),
            total_size: format_file_size(summary.total_size),
            formats: summary.formats,
            files: summary
                .files
                .into_iter()
                .map(|f| ReportFile {
                    size: format_file_size(f.size),
                    name: f.name,
                    format: f.format,
                    path: f.path,
                })
                .collect(),
        }
    }

    /// Write `report` as pretty JSON. Without an explicit path it goes to
    /// `<output>/conversion-report-<timestamp>.json`.
    pub async fn save_report(
        &self,
        report: &OutputReport,
        path: Option<&Path>,
    ) -> Result<PathBuf, ForgeError> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => {
                let stamp = report.timestamp.replace([':', '.'], "-");
                self.dir.join(format!("conversion-report-{stamp}.json"))
            }
        };
        let json = serde_json::to_string_pretty(report)
            .map_err(|e| ForgeError::processing_with("failed to serialise report", e))?;
        tokio::fs::write(&path, json)
            .await
            .map_err(|e| ForgeError::processing_with(format!("failed to save report '{}'", path.display()), e))?;
        debug!("Report saved: {}", path.display());
        Ok(path)
    }
}

/// Base name for outputs: the configured name, else the input file's stem.
pub fn resolve_base_name(configured: Option<&str>, input: &Path) -> String {
    match configured {
        Some(name) if !name.trim().is_empty() => name.trim().to_string(),
        _ => input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".to_string()),
    }
}

/// `path` relative to the current directory when it lies below it.
pub fn display_path(path: &Path) -> String {
    std::env::current_dir()
        .ok()
        .and_then(|cwd| path.strip_prefix(cwd).ok().map(Path::to_path_buf))
        .unwrap_or_else(|| path.to_path_buf())
        .display()
        .to_string()
}

/// Human-readable size: `0 Bytes`, `512 Bytes`, `1.5 KB`, `2.25 MB`.
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 Bytes".to_string();
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let rounded = (value * 100.0).round() / 100.0;
    format!("{} {}", rounded, UNITS[unit])
}

#[derive(Debug, Clone, Serialize)]
pub struct OutputFileInfo {
    pub path: PathBuf,
    pub name: String,
    pub size: u64,
    pub format: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct OutputSummary {
    pub files: Vec<OutputFileInfo>,
    pub total_size: u64,
    /// Distinct extensions, sorted.
    pub formats: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportFile {
    pub name: String,
    pub format: String,
    pub size: String,
    pub path: PathBuf,
}

/// Report written by `--report`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputReport {
    pub timestamp: String,
    pub processing_time_ms: u64,
    pub output_directory: PathBuf,
    pub files: Vec<ReportFile>,
    pub total_files: usize,
    pub total_size: String,
    pub formats: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn relative_dir_becomes_absolute() {
        let loc = OutputLocation::new("out");
        assert!(loc.dir().is_absolute());
        assert!(loc.dir().ends_with("out"));
        assert_eq!(loc.diagrams_dir(), loc.dir().join("diagrams"));
    }

    #[test]
    fn output_path_shape() {
        let loc = OutputLocation::new("/srv/out");
        assert_eq!(loc.output_path("guide", "pdf"), PathBuf::from("/srv/out/guide.pdf"));
    }

    #[test]
    fn file_sizes() {
        assert_eq!(format_file_size(0), "0 Bytes");
        assert_eq!(format_file_size(512), "512 Bytes");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(1024 * 1024), "1 MB");
        assert_eq!(format_file_size(5 * 1024 * 1024 * 1024), "5 GB");
    }

    #[test]
    fn base_name_falls_back_to_stem() {
        assert_eq!(resolve_base_name(None, Path::new("/a/notes.md")), "notes");
        assert_eq!(resolve_base_name(Some("  "), Path::new("x.markdown")), "x");
        assert_eq!(resolve_base_name(Some("final"), Path::new("x.md")), "final");
    }

    #[tokio::test]
    async fn ensure_dir_creates_nested() {
        let tmp = TempDir::new().unwrap();
        let loc = OutputLocation::new(tmp.path().join("a/b/c"));
        loc.ensure_dir().await.unwrap();
        assert!(loc.dir().is_dir());
        assert!(loc.is_writable().await);
    }

    #[tokio::test]
    async fn ensure_dir_fails_when_blocked_by_file() {
        let tmp = TempDir::new().unwrap();
        let blocker = tmp.path().join("file");
        std::fs::write(&blocker, "x").unwrap();
        let loc = OutputLocation::new(blocker.join("sub"));
        let err = loc.ensure_dir().await.unwrap_err();
        assert!(matches!(err, ForgeError::OutputDirectory { .. }));
    }

    #[tokio::test]
    async fn unique_path_appends_counter() {
        let tmp = TempDir::new().unwrap();
        let loc = OutputLocation::new(tmp.path());
        assert_eq!(loc.unique_output_path("doc", "pdf").await, tmp.path().join("doc.pdf"));
        std::fs::write(tmp.path().join("doc.pdf"), "x").unwrap();
        std::fs::write(tmp.path().join("doc_1.pdf"), "x").unwrap();
        assert_eq!(loc.unique_output_path("doc", "pdf").await, tmp.path().join("doc_2.pdf"));
    }

    #[tokio::test]
    async fn summary_and_report() {
        let tmp = TempDir::new().unwrap();
        let loc = OutputLocation::new(tmp.path());
        let pdf = tmp.path().join("doc.pdf");
        let docx = tmp.path().join("doc.docx");
        std::fs::write(&pdf, vec![0u8; 2048]).unwrap();
        std::fs::write(&docx, vec![0u8; 10]).unwrap();
        let missing = tmp.path().join("gone.pdf");

        let summary = loc.summarize(&[pdf.clone(), docx.clone(), missing]).await;
        assert_eq!(summary.files.len(), 2);
        assert_eq!(summary.total_size, 2058);
        assert_eq!(summary.formats, vec!["docx", "pdf"]);

        let report = loc.create_report(&[pdf, docx], 1234).await;
        assert_eq!(report.total_files, 2);
        assert_eq!(report.files[0].size, "2 KB");
        assert_eq!(report.processing_time_ms, 1234);

        let saved = loc.save_report(&report, None).await.unwrap();
        let name = saved.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("conversion-report-") && name.ends_with(".json"));
        assert!(!name.contains(':'));
        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&saved).unwrap()).unwrap();
        assert_eq!(json["totalFiles"], 2);
        assert_eq!(json["processingTimeMs"], 1234);
    }
}
