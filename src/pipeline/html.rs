//! Markdown → standalone, themed HTML page for printing.
//!
//! ## Why inline every image?
//!
//! The browser prints from a page whose own location is a scratch file, so a
//! relative `<img src>` would resolve against the wrong directory, and a
//! `file://` URL may be blocked outright. Reading each local image and
//! embedding it as a `data:` URL makes the page self-contained: the printed
//! PDF has no external dependencies and relative paths are resolved against
//! the *original* document's directory, exactly once, here.

use crate::config::Theme;
use crate::pipeline::admonition::{self, escape_html};
use crate::themes::theme_css;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use once_cell::sync::Lazy;
use percent_encoding::percent_decode_str;
use pulldown_cmark::{html, Options, Parser};
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

static RE_IMG_SRC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"<img([^>]*?)src="([^"]+)"([^>]*)>"#).unwrap());

/// Entities pulldown-cmark writes inside attribute values.
static RE_ATTR_ENTITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&(amp|quot|lt|gt|#x27|#39);").unwrap());

/// Render Markdown (admonitions included) to a complete HTML document.
///
/// `base_dir` is the directory of the original input; relative image paths
/// are resolved against it.
pub async fn render_html_document(markdown: &str, theme: Theme, base_dir: &Path, title: &str) -> String {
    let body = markdown_to_html(&admonition::to_html_blocks(markdown));
    let body = inline_images(&body, base_dir).await;
    wrap_page(&body, theme, title)
}

/// CommonMark + GFM tables, footnotes, strikethrough and task lists.
pub fn markdown_to_html(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);

    let parser = Parser::new_ext(markdown, options);
    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

/// Replace the `src` of every local `<img>` with a base64 `data:` URL.
///
/// Remote (`http`/`https`) and existing `data:` sources are left alone.
/// Missing or unreadable files are logged and left as-is.
pub async fn inline_images(html: &str, base_dir: &Path) -> String {
    let mut embedded: HashMap<String, String> = HashMap::new();

    for caps in RE_IMG_SRC.captures_iter(html) {
        let src = &caps[2];
        if embedded.contains_key(src) {
            continue;
        }
        let Some(path) = resolve_local_src(src, base_dir) else {
            continue;
        };
        debug!("Resolving image path: {} -> {}", src, path.display());
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let mime = mime_type(&path, &bytes);
                debug!("Embedded image: {} ({} bytes)", path.display(), bytes.len());
                embedded.insert(
                    src.to_string(),
                    format!("data:{};base64,{}", mime, STANDARD.encode(&bytes)),
                );
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Image file not found: {}", path.display());
            }
            Err(e) => warn!("Failed to read image {}: {}", path.display(), e),
        }
    }

    if embedded.is_empty() {
        return html.to_string();
    }
    RE_IMG_SRC
        .replace_all(html, |caps: &Captures| match embedded.get(&caps[2]) {
            Some(data_url) => format!("<img{}src=\"{}\"{}>", &caps[1], data_url, &caps[3]),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Filesystem path for an `<img src>` value, or `None` for remote/data URLs.
fn resolve_local_src(src: &str, base_dir: &Path) -> Option<PathBuf> {
    let lower = src.to_ascii_lowercase();
    if lower.starts_with("data:") || lower.starts_with("http://") || lower.starts_with("https://") {
        return None;
    }
    let unescaped = unescape_attr(src);
    let raw = unescaped.strip_prefix("file://").unwrap_or(&unescaped);
    let decoded = percent_decode_str(raw).decode_utf8_lossy();
    let path = PathBuf::from(decoded.as_ref());
    Some(if path.is_absolute() {
        path
    } else {
        base_dir.join(path)
    })
}

/// Decode attribute entities in one pass, so `&amp;#x27;` stays `&#x27;`.
fn unescape_attr(value: &str) -> String {
    RE_ATTR_ENTITY
        .replace_all(value, |caps: &Captures| match &caps[1] {
            "amp" => "&",
            "quot" => "\"",
            "lt" => "<",
            "gt" => ">",
            _ => "'",
        })
        .into_owned()
}

/// MIME type from the extension, falling back to sniffing the bytes.
pub fn mime_type(path: &Path, bytes: &[u8]) -> &'static str {
    let is_svg = path
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("svg"));
    if is_svg {
        return "image/svg+xml";
    }
    image::ImageFormat::from_path(path)
        .or_else(|_| image::guess_format(bytes))
        .map(|f| f.to_mime_type())
        .unwrap_or("image/png")
}

fn wrap_page(body: &str, theme: Theme, title: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>{title}</title>
<style>
{css}
</style>
</head>
<body>
<div class="container">
{body}
</div>
</body>
</html>
"#,
        title = escape_html(title),
        css = theme_css(theme),
        body = body
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const PNG_1X1: &[u8] = &[
        0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
        0x52,
    ];

    #[test]
    fn gfm_extensions_enabled() {
        let html = markdown_to_html("| a | b |\n|---|---|\n| 1 | 2 |\n\n~~gone~~\n\n- [x] done\n");
        assert!(html.contains("<table>"));
        assert!(html.contains("<del>gone</del>"));
        assert!(html.contains("checkbox"));
    }

    #[test]
    fn mime_detection() {
        assert_eq!(mime_type(Path::new("a.svg"), b"<svg/>"), "image/svg+xml");
        assert_eq!(mime_type(Path::new("a.JPG"), b""), "image/jpeg");
        assert_eq!(mime_type(Path::new("a.gif"), b""), "image/gif");
        assert_eq!(mime_type(Path::new("noext"), PNG_1X1), "image/png");
        assert_eq!(mime_type(Path::new("noext"), b"????"), "image/png");
    }

    #[test]
    fn remote_and_data_sources_are_skipped() {
        let base = Path::new("/docs");
        assert_eq!(resolve_local_src("https://x/y.png", base), None);
        assert_eq!(resolve_local_src("data:image/png;base64,AA", base), None);
        assert_eq!(
            resolve_local_src("img/a%20b.png", base),
            Some(PathBuf::from("/docs/img/a b.png"))
        );
        assert_eq!(
            resolve_local_src("file:///abs/c.png", base),
            Some(PathBuf::from("/abs/c.png"))
        );
    }

    #[tokio::test]
    async fn relative_image_resolves_against_base_dir() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("img")).unwrap();
        std::fs::write(dir.path().join("img/logo.png"), PNG_1X1).unwrap();

        let html = markdown_to_html("![Logo](img/logo.png)\n\n![Remote](https://example.com/r.png)\n");
        let out = inline_images(&html, dir.path()).await;
        assert!(out.contains(r#"src="data:image/png;base64,"#), "{out}");
        assert!(out.contains(r#"alt="Logo""#));
        assert!(out.contains("https://example.com/r.png"));
    }

    #[tokio::test]
    async fn absolute_path_with_spaces_is_embedded() {
        let dir = TempDir::new().unwrap();
        let diagrams = dir.path().join("my diagrams");
        std::fs::create_dir(&diagrams).unwrap();
        let svg = diagrams.join("diagram-1.svg");
        std::fs::write(&svg, "<svg xmlns=\"http://www.w3.org/2000/svg\"/>").unwrap();

        let md = format!("![Diagram](<{}>)\n", svg.display());
        let out = inline_images(&markdown_to_html(&md), Path::new("/elsewhere")).await;
        assert!(out.contains("data:image/svg+xml;base64,"), "{out}");
    }

    #[test]
    fn attribute_entities_are_decoded_once() {
        assert_eq!(unescape_attr("a&amp;b&#x27;c&#39;d&quot;e&lt;f&gt;"), "a&b'c'd\"e<f>");
        assert_eq!(unescape_attr("x&amp;#x27;y"), "x&#x27;y");
        assert_eq!(unescape_attr("&nbsp;"), "&nbsp;");
    }

    #[tokio::test]
    async fn path_with_apostrophe_and_ampersand_is_embedded() {
        let dir = TempDir::new().unwrap();
        let diagrams = dir.path().join("o'brien & co/diagrams");
        std::fs::create_dir_all(&diagrams).unwrap();
        let png = diagrams.join("diagram-1.png");
        std::fs::write(&png, PNG_1X1).unwrap();

        let md = format!("![Diagram](<{}>)\n", png.display());
        let html = markdown_to_html(&md);
        assert!(html.contains("&#x27;"), "{html}");
        let out = inline_images(&html, Path::new("/elsewhere")).await;
        assert!(out.contains("data:image/png;base64,"), "{out}");
    }

    #[tokio::test]
    async fn missing_image_left_as_is() {
        let dir = TempDir::new().unwrap();
        let html = markdown_to_html("![x](missing.png)");
        let out = inline_images(&html, dir.path()).await;
        assert_eq!(out, html);
    }

    #[tokio::test]
    async fn full_document_has_theme_and_admonition() {
        let dir = TempDir::new().unwrap();
        let page = render_html_document(
            "# Title\n\n!!! tip \"Pro tip\"\n    Use **bold**.\n",
            Theme::Academic,
            dir.path(),
            "Guide <1>",
        )
        .await;
        assert!(page.starts_with("<!DOCTYPE html>"));
        assert!(page.contains("<title>Guide &lt;1&gt;</title>"));
        assert!(page.contains("Times New Roman"));
        assert!(page.contains("<h1>Title</h1>"));
        assert!(page.contains(r#"<div class="admonition admonition-tip">"#));
        assert!(page.contains("<strong>bold</strong>"));
    }
}
