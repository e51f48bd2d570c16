//! Pipeline stages for Markdown-to-PDF/DOCX conversion.
//!
//! Each submodule implements exactly one transformation step, so each can
//! be tested alone and the engines behind the rendering stages can be
//! swapped without touching the others.
//!
//! ## Data Flow
//!
//! ```text
//!            ┌─▶ diagram ─▶ rewrite ─┐          ┌─▶ html ─▶ pdf
//! extract ──▶┤                       ├─ working ┤
//!            └───── (no diagrams) ───┘   doc    └─▶ docx
//! ```
//!
//! 1. [`input`]    — validate the user-supplied path before anything runs
//! 2. [`extract`]  — find Mermaid fences in document order
//! 3. [`diagram`]  — render each fence to an image file, one at a time
//! 4. [`rewrite`]  — persist rendered images and splice references into the text
//! 5. [`admonition`] — `!!! kind` callouts, shared by both converters
//! 6. [`html`] + [`pdf`] — themed HTML with inlined images, printed to PDF
//! 7. [`docx`]     — pandoc with a generated formatting filter

pub mod admonition;
pub mod diagram;
pub mod docx;
pub mod extract;
pub mod html;
pub mod input;
pub mod pdf;
pub mod rewrite;
