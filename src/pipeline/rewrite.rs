//! Document rewriting: swap rendered Mermaid fences for image references.
//!
//! Rendered images live in the run's scratch directory, which is deleted
//! during cleanup. [`persist_diagrams`] therefore copies every successful
//! render into `<output>/diagrams/` first, and [`rewrite_document`] points
//! the image references at those durable copies.

use crate::error::DiagramError;
use crate::output::DiagramRenderResult;
use std::path::Path;
use tracing::{debug, warn};

/// Copy each successful render into `dest_dir`, keeping its file name.
///
/// Returns the results with successful outcomes re-pointed at the copies.
/// A copy failure turns that diagram into a failure, so its fence stays in
/// the document instead of referencing a file that will disappear.
pub async fn persist_diagrams(
    results: Vec<DiagramRenderResult>,
    dest_dir: &Path,
) -> Vec<DiagramRenderResult> {
    let mut persisted = Vec::with_capacity(results.len());
    for mut result in results {
        if let Ok(rendered) = &result.outcome {
            let Some(name) = rendered.file_name() else {
                persisted.push(result);
                continue;
            };
            let dest = dest_dir.join(name);
            result.outcome = match tokio::fs::copy(rendered, &dest).await {
                Ok(_) => {
                    debug!("Persisted diagram: {}", dest.display());
                    Ok(dest)
                }
                Err(e) => {
                    warn!("Failed to persist diagram {}: {}", rendered.display(), e);
                    Err(DiagramError::WriteFailed {
                        path: dest,
                        detail: e.to_string(),
                    })
                }
            };
        }
        persisted.push(result);
    }
    persisted
}

/// Markdown image reference for a rendered diagram.
///
/// The destination is wrapped in `<…>` so paths with spaces survive both
/// CommonMark and pandoc.
pub fn image_reference(path: &Path) -> String {
    format!("![Diagram](<{}>)", path.display())
}

/// Replace each successful diagram's fence with an image reference.
///
/// Failed results leave their fence untouched. All other bytes are kept
/// as-is. When every recorded span still holds its fence the text is
/// spliced by span; otherwise each fence replaces its first remaining
/// occurrence.
pub fn rewrite_document(original: &str, results: &[DiagramRenderResult]) -> String {
    let successes: Vec<(&DiagramRenderResult, &Path)> = results
        .iter()
        .filter_map(|r| r.output_path().map(|p| (r, p)))
        .collect();
    if successes.is_empty() {
        return original.to_string();
    }

    if spans_match(original, &successes) {
        let mut out = String::with_capacity(original.len());
        let mut cursor = 0;
        for (result, path) in &successes {
            out.push_str(&original[cursor..result.span.start]);
            out.push_str(&image_reference(path));
            cursor = result.span.end;
        }
        out.push_str(&original[cursor..]);
        return out;
    }

    debug!("Diagram spans do not match the text; replacing by first occurrence");
    let mut out = original.to_string();
    for (result, path) in &successes {
        if let Some(pos) = out.find(&result.original_match) {
            out.replace_range(pos..pos + result.original_match.len(), &image_reference(path));
        } else {
            warn!("Diagram {} fence not found in document", result.index + 1);
        }
    }
    out
}

/// Spans are in order, non-overlapping, and each still slices to its fence.
fn spans_match(text: &str, successes: &[(&DiagramRenderResult, &Path)]) -> bool {
    let mut cursor = 0;
    for (result, _) in successes {
        if result.span.start < cursor
            || text.get(result.span.clone()) != Some(result.original_match.as_str())
        {
            return false;
        }
        cursor = result.span.end;
    }
    true
}
