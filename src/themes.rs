//! Stylesheets for PDF output.
//!
//! Every theme is the shared base sheet plus a small override layer, so a
//! fix to tables or admonitions lands in all three themes at once. The
//! sheets are plain constants: tests can inspect them and nothing has to be
//! read from disk at run time.

use crate::config::Theme;

/// Layout, typography, code, tables and images shared by every theme.
pub const BASE_CSS: &str = r#"
* { box-sizing: border-box; }

body {
    font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', 'Roboto', 'Oxygen', 'Ubuntu', 'Cantarell', sans-serif;
    line-height: 1.6;
    color: #333;
    margin: 0;
    padding: 0;
}

.container { max-width: 800px; margin: 0 auto; padding: 2rem; }

h1, h2, h3, h4, h5, h6 {
    margin-top: 2rem;
    margin-bottom: 1rem;
    font-weight: 600;
    line-height: 1.25;
}
h1 { font-size: 2rem; border-bottom: 2px solid #eee; padding-bottom: 0.5rem; }
h2 { font-size: 1.5rem; border-bottom: 1px solid #eee; padding-bottom: 0.3rem; }
h3 { font-size: 1.25rem; }
h4 { font-size: 1rem; }
h5 { font-size: 0.875rem; }
h6 { font-size: 0.85rem; }

p { margin-bottom: 1rem; }
a { color: #0366d6; text-decoration: none; }
ul, ol { margin-bottom: 1rem; padding-left: 2rem; }
li { margin-bottom: 0.25rem; }

blockquote {
    margin: 1rem 0;
    padding: 0 1rem;
    color: #6a737d;
    border-left: 4px solid #dfe2e5;
}

code {
    background-color: rgba(27,31,35,0.05);
    border-radius: 3px;
    font-size: 85%;
    padding: 0.2em 0.4em;
    font-family: 'SFMono-Regular', Consolas, 'Liberation Mono', Menlo, monospace;
}
pre {
    background-color: #f6f8fa;
    border-radius: 6px;
    font-size: 85%;
    line-height: 1.45;
    overflow: auto;
    padding: 16px;
    margin-bottom: 1rem;
}
pre code { background-color: transparent; padding: 0; white-space: pre-wrap; }

table { border-collapse: collapse; width: 100%; margin-bottom: 1rem; }
table th, table td { border: 1px solid #dfe2e5; padding: 6px 13px; }
table th { background-color: #f6f8fa; font-weight: 600; }
table tr:nth-child(2n) { background-color: #f6f8fa; }

img { max-width: 100%; height: auto; display: block; margin: 1rem auto; }
hr { border: none; border-top: 1px solid #eee; margin: 2rem 0; }

.task-list-item { list-style: none; }
.footnote-definition { font-size: 85%; color: #6a737d; }
"#;

/// Callout boxes. Unknown kinds fall back to the grey `.admonition` look.
pub const ADMONITION_CSS: &str = r#"
.admonition {
    margin: 1.5rem 0;
    border-radius: 6px;
    border-left: 4px solid #6a737d;
    overflow: hidden;
    page-break-inside: avoid;
}
.admonition-title { font-weight: bold; padding: 0.75rem 1rem; background-color: #f3f4f6; color: #444; }
.admonition-content { padding: 0.75rem 1rem; background-color: #fafafa; }
.admonition-content > *:first-child { margin-top: 0; }
.admonition-content > *:last-child { margin-bottom: 0; }

.admonition-warning { border-left-color: #FF6B35; }
.admonition-warning .admonition-title { background-color: #FFF4E6; color: #FF6B35; }
.admonition-warning .admonition-title::before { content: "⚠️ "; }
.admonition-warning .admonition-content { background-color: #FFFBF5; }

.admonition-note { border-left-color: #0066CC; }
.admonition-note .admonition-title { background-color: #E6F3FF; color: #0066CC; }
.admonition-note .admonition-title::before { content: "📝 "; }
.admonition-note .admonition-content { background-color: #F8FCFF; }

.admonition-info { border-left-color: #17A2B8; }
.admonition-info .admonition-title { background-color: #E6F9FC; color: #17A2B8; }
.admonition-info .admonition-title::before { content: "ℹ️ "; }
.admonition-info .admonition-content { background-color: #F8FDFE; }

.admonition-tip { border-left-color: #28A745; }
.admonition-tip .admonition-title { background-color: #E6F7E6; color: #28A745; }
.admonition-tip .admonition-title::before { content: "💡 "; }
.admonition-tip .admonition-content { background-color: #F8FDF8; }

.admonition-danger { border-left-color: #DC3545; }
.admonition-danger .admonition-title { background-color: #FFE6E6; color: #DC3545; }
.admonition-danger .admonition-title::before { content: "🚨 "; }
.admonition-danger .admonition-content { background-color: #FFFBFB; }
"#;

/// Print-media adjustments shared by every theme.
pub const PRINT_CSS: &str = r#"
@media print {
    body { font-size: 12pt; }
    h1 { font-size: 18pt; }
    h2 { font-size: 16pt; }
    h3 { font-size: 14pt; }
    h4 { font-size: 12pt; }
    h5 { font-size: 11pt; }
    h6 { font-size: 10pt; }
    pre, code { background-color: #f5f5f5 !important; -webkit-print-color-adjust: exact; }
    .admonition, .admonition-title, .admonition-content {
        -webkit-print-color-adjust: exact;
        print-color-adjust: exact;
    }
    a { color: #000 !important; }
    .page-break { page-break-before: always; }
}
"#;

pub const GITHUB_CSS: &str = r#"
body {
    font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', 'Helvetica', 'Arial', sans-serif;
    font-size: 16px;
    line-height: 1.5;
    word-wrap: break-word;
}
h1, h2 { border-bottom: 1px solid #eaecef; padding-bottom: 0.3em; }
code { border-radius: 6px; }
"#;

pub const ACADEMIC_CSS: &str = r#"
body {
    font-family: 'Times New Roman', Times, serif;
    font-size: 12pt;
    line-height: 1.6;
    text-align: justify;
}
.container { max-width: 700px; }
h1 { text-align: center; font-size: 18pt; margin-bottom: 2rem; border-bottom: none; }
h2 { font-size: 14pt; margin-top: 1.5rem; border-bottom: none; }
h3 { font-size: 12pt; font-style: italic; }
p { text-indent: 1.5em; margin-bottom: 0.5rem; }
blockquote { font-style: italic; margin: 1rem 2rem; border-left: none; }
@media print { body { font-size: 11pt; } }
"#;

/// Full stylesheet for `theme`: base, admonitions, print, then overrides.
pub fn theme_css(theme: Theme) -> String {
    let overrides = match theme {
        Theme::Default => "",
        Theme::Github => GITHUB_CSS,
        Theme::Academic => ACADEMIC_CSS,
    };
    [BASE_CSS, ADMONITION_CSS, PRINT_CSS, overrides].concat()
}
