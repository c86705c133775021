//! Live preview composition
//!
//! Inlines every generated file into one standalone HTML document: markup in
//! the body, styles in a single `<style>` block, scripts in a single module
//! script at the end of the body.

use crate::project::{FileType, ProjectFile};

/// Capabilities granted to the preview frame
pub const PREVIEW_SANDBOX: &str = "allow-scripts allow-modals";

const PLACEHOLDER_BODY: &str = "<div class=\"empty\"><p>Your generated site will appear here.</p>\
<p>Describe what you want to build to get started.</p></div>";

const PLACEHOLDER_STYLE: &str = "body{margin:0;display:flex;align-items:center;\
justify-content:center;min-height:100vh;font-family:system-ui,sans-serif;color:#6b7280}\
.empty{text-align:center}";

/// A composed preview
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewDocument {
    pub html: String,
    /// No files were available; `html` is the empty-state page
    pub is_placeholder: bool,
}

impl PreviewDocument {
    /// Sandboxed iframe embedding this document
    pub fn iframe(&self) -> String {
        format!(
            "<iframe title=\"Preview\" sandbox=\"{}\" srcdoc=\"{}\"></iframe>",
            PREVIEW_SANDBOX,
            escape_attribute(&self.html)
        )
    }
}

/// Build the preview document for a file set
pub fn compose_preview(files: &[ProjectFile]) -> PreviewDocument {
    if files.is_empty() {
        return PreviewDocument {
            html: document(PLACEHOLDER_STYLE, PLACEHOLDER_BODY, ""),
            is_placeholder: true,
        };
    }

    let html = concat(files, FileType::Html);
    let css = concat(files, FileType::Css);
    let js = concat(files, FileType::Javascript);

    PreviewDocument {
        html: document(&css, &html, &js),
        is_placeholder: false,
    }
}

fn concat(files: &[ProjectFile], file_type: FileType) -> String {
    files
        .iter()
        .filter(|f| f.file_type == file_type)
        .map(|f| f.content.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

fn document(css: &str, body: &str, js: &str) -> String {
    format!(
        "<!DOCTYPE html>\n\
<html>\n\
<head>\n\
<meta charset=\"UTF-8\">\n\
<meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n\
<style>\n{css}\n</style>\n\
</head>\n\
<body>\n{body}\n\
<script type=\"module\">\n{js}\n</script>\n\
</body>\n\
</html>\n"
    )
}

fn escape_attribute(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}
