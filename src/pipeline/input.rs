//! Input validation: make sure the user pointed us at a Markdown text file.
//!
//! ## Why validate before processing?
//!
//! The orchestrator only needs the file to exist. Everything else checked
//! here (extension, size, emptiness, binary content) turns a confusing
//! downstream failure, like pandoc choking on a PNG or Chrome rendering a
//! blank page, into one precise message before any browser is launched.

use crate::config::SUPPORTED_FORMATS;
use crate::error::ForgeError;
use crate::location::format_file_size;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Largest accepted input: 50 MiB.
pub const MAX_INPUT_BYTES: u64 = 50 * 1024 * 1024;

/// Accepted input extensions, compared case-insensitively.
pub const MARKDOWN_EXTENSIONS: &[&str] = &["md", "markdown"];

/// A Markdown file that passed [`validate_input`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedInput {
    /// Absolute path.
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// Check that `path` is a readable, non-empty Markdown text file.
///
/// Checks run in order and the first failure is returned: exists, regular
/// file, `.md`/`.markdown` extension, at most [`MAX_INPUT_BYTES`], readable,
/// valid UTF-8 without NUL bytes, not whitespace-only.
pub async fn validate_input(path: impl AsRef<Path>) -> Result<ValidatedInput, ForgeError> {
    let path = path.as_ref();
    let abs = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());

    let meta = match tokio::fs::metadata(&abs).await {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(ForgeError::PermissionDenied { path: abs });
        }
        Err(_) => return Err(ForgeError::InputNotFound { path: abs }),
    };
    if !meta.is_file() {
        return Err(ForgeError::InputNotAFile { path: abs });
    }

    let ext = abs
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    if !MARKDOWN_EXTENSIONS.contains(&ext.as_str()) {
        return Err(ForgeError::InputInvalid {
            reason: format!(
                "unsupported extension '.{}' (expected .md or .markdown)",
                ext
            ),
            path: abs,
        });
    }

    if meta.len() > MAX_INPUT_BYTES {
        return Err(ForgeError::InputTooLarge {
            size: format_file_size(meta.len()),
            max: format_file_size(MAX_INPUT_BYTES),
            path: abs,
        });
    }

    let bytes = match tokio::fs::read(&abs).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(ForgeError::PermissionDenied { path: abs });
        }
        Err(e) => return Err(ForgeError::processing_with("cannot read input", e)),
    };
    let Ok(text) = std::str::from_utf8(&bytes) else {
        return Err(ForgeError::InputBinary { path: abs });
    };
    if looks_binary(text) {
        return Err(ForgeError::InputBinary { path: abs });
    }
    if text.trim().is_empty() {
        return Err(ForgeError::InputEmpty { path: abs });
    }

    debug!("Validated input: {} ({} bytes)", abs.display(), meta.len());
    Ok(ValidatedInput {
        path: abs,
        size_bytes: meta.len(),
    })
}

/// NUL bytes anywhere, or more than 30 % control characters.
fn looks_binary(text: &str) -> bool {
    if text.contains('\0') {
        return true;
    }
    let total = text.chars().count();
    if total == 0 {
        return false;
    }
    let control = text
        .chars()
        .filter(|c| c.is_control() && !c.is_whitespace())
        .count();
    control * 10 > total * 3
}

/// Requested format names this crate cannot produce, lower-cased.
pub fn unsupported_formats(formats: &[String]) -> Vec<String> {
    formats
        .iter()
        .map(|f| f.to_ascii_lowercase())
        .filter(|f| !SUPPORTED_FORMATS.contains(&f.as_str()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &[u8]) -> PathBuf {
        let p = dir.path().join(name);
        std::fs::write(&p, content).unwrap();
        p
    }

    #[tokio::test]
    async fn accepts_markdown() {
        let dir = TempDir::new().unwrap();
        let p = write(&dir, "guide.MD", "# Guide\n\nText — with ünïcode 漢字.\n".as_bytes());
        let v = validate_input(&p).await.unwrap();
        assert!(v.path.is_absolute());
        assert!(v.size_bytes > 0);
    }

    #[tokio::test]
    async fn missing_file() {
        let dir = TempDir::new().unwrap();
        let err = validate_input(dir.path().join("nope.md")).await.unwrap_err();
        assert!(matches!(err, ForgeError::InputNotFound { .. }));
    }

    #[tokio::test]
    async fn directory_is_not_a_file() {
        let dir = TempDir::new().unwrap();
        let sub = dir.path().join("docs.md");
        std::fs::create_dir(&sub).unwrap();
        let err = validate_input(&sub).await.unwrap_err();
        assert!(matches!(err, ForgeError::InputNotAFile { .. }));
    }

    #[tokio::test]
    async fn wrong_extension() {
        let dir = TempDir::new().unwrap();
        let p = write(&dir, "notes.txt", b"# hi");
        let err = validate_input(&p).await.unwrap_err();
        assert!(err.to_string().contains(".txt"), "got: {err}");
    }

    #[tokio::test]
    async fn empty_and_whitespace_only() {
        let dir = TempDir::new().unwrap();
        let p = write(&dir, "blank.md", b"  \n\t\n");
        assert!(matches!(
            validate_input(&p).await.unwrap_err(),
            ForgeError::InputEmpty { .. }
        ));
    }

    #[tokio::test]
    async fn binary_content() {
        let dir = TempDir::new().unwrap();
        let nul = write(&dir, "nul.md", b"# a\0b");
        assert!(matches!(
            validate_input(&nul).await.unwrap_err(),
            ForgeError::InputBinary { .. }
        ));
        let invalid_utf8 = write(&dir, "bad.md", &[0x89, b'P', b'N', b'G', 0xff, 0xfe]);
        assert!(matches!(
            validate_input(&invalid_utf8).await.unwrap_err(),
            ForgeError::InputBinary { .. }
        ));
    }

    #[test]
    fn control_ratio() {
        assert!(!looks_binary("plain text\n\twith tabs\r\n"));
        assert!(looks_binary("\u{1}\u{2}\u{3}ab"));
        assert!(!looks_binary(""));
    }

    #[test]
    fn unsupported_formats_listed() {
        let formats = vec!["pdf".to_string(), "ODT".to_string(), "docx".to_string()];
        assert_eq!(unsupported_formats(&formats), vec!["odt"]);
    }
}
