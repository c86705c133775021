//! Attachment classification for chat turns
//!
//! Uploaded files are split into three disjoint buckets:
//! - visual: `image/*` media types, sent to the model as inline base64 data
//! - text: text/code media types or whitelisted source extensions, inlined
//!   verbatim into the prompt
//! - unsupported: everything else, mentioned by filename only

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::path::Path;
use thiserror::Error;

use crate::project::AttachmentDescriptor;

/// Fallback media type for unknown files
const OCTET_STREAM: &str = "application/octet-stream";

/// Extensions inlined as text regardless of their declared media type
const TEXT_EXTENSIONS: &[&str] = &[
    "html", "htm", "css", "scss", "js", "mjs", "jsx", "ts", "tsx", "json", "md", "txt", "xml",
    "svg", "yml", "yaml", "toml", "py", "rs", "go", "java", "c", "cpp", "h", "rb", "php", "sh",
    "sql", "vue", "svelte", "csv",
];

/// Non-`text/*` media types that still carry text
const TEXT_MIME_TYPES: &[&str] = &[
    "application/json",
    "application/javascript",
    "application/xml",
    "application/x-yaml",
    "application/toml",
];

/// Error types for attachment operations
#[derive(Debug, Error)]
pub enum AttachmentError {
    #[error("File not found: {0}")]
    FileNotFound(String),
    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// A user-supplied file accompanying a chat turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    /// Create an upload, guessing the media type from the name when none is declared
    pub fn new(name: impl Into<String>, mime_type: Option<&str>, bytes: Vec<u8>) -> Self {
        let name = name.into();
        let mime_type = match mime_type.map(str::trim).filter(|m| !m.is_empty()) {
            Some(m) => m.to_lowercase(),
            None => guess_mime_type(&name),
        };
        Self {
            name,
            mime_type,
            bytes,
        }
    }

    /// Read an upload from disk
    pub async fn from_path(path: &Path) -> Result<Self, AttachmentError> {
        if !path.is_file() {
            return Err(AttachmentError::FileNotFound(path.display().to_string()));
        }
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| AttachmentError::Io {
                path: path.display().to_string(),
                source,
            })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::new(name, None, bytes))
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    pub fn descriptor(&self) -> AttachmentDescriptor {
        AttachmentDescriptor {
            name: self.name.clone(),
            mime_type: self.mime_type.clone(),
        }
    }
}

/// Bucket an attachment is routed to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentKind {
    Visual,
    Text,
    Unsupported,
}

/// Image sent as an inline binary payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisualAttachment {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl VisualAttachment {
    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }
}

/// Text or source file inlined into the prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextAttachment {
    pub name: String,
    pub mime_type: String,
    pub content: String,
    /// Size of the original bytes
    pub size: usize,
}

/// File whose content is dropped; only the name reaches the model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsupportedAttachment {
    pub name: String,
    pub mime_type: String,
}

/// Attachments of one chat turn, split by kind
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassifiedAttachments {
    pub visual: Vec<VisualAttachment>,
    pub text: Vec<TextAttachment>,
    pub unsupported: Vec<UnsupportedAttachment>,
}

impl ClassifiedAttachments {
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn len(&self) -> usize {
        self.visual.len() + self.text.len() + self.unsupported.len()
    }

    /// Filename-only mention for unsupported files, if any
    pub fn unsupported_note(&self) -> Option<String> {
        if self.unsupported.is_empty() {
            return None;
        }
        let names = self
            .unsupported
            .iter()
            .map(|a| format!("'{}' ({})", a.name, a.mime_type))
            .collect::<Vec<_>>()
            .join(", ");
        Some(format!(
            "[The user also attached files that cannot be read: {names}. Only their names are provided for context.]"
        ))
    }
}

/// Decide which bucket a file belongs to
pub fn detect_kind(name: &str, mime_type: &str) -> AttachmentKind {
    let mime_type = mime_type.to_lowercase();
    if mime_type.starts_with("image/") {
        return AttachmentKind::Visual;
    }
    if mime_type.starts_with("text/") || TEXT_MIME_TYPES.contains(&mime_type.as_str()) {
        return AttachmentKind::Text;
    }
    if has_text_extension(name) {
        return AttachmentKind::Text;
    }
    AttachmentKind::Unsupported
}

fn has_text_extension(name: &str) -> bool {
    Path::new(name)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .map(|ext| TEXT_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Guess a media type from a filename
pub fn guess_mime_type(name: &str) -> String {
    mime_guess::from_path(name)
        .first()
        .map(|m| m.essence_str().to_string())
        .unwrap_or_else(|| OCTET_STREAM.to_string())
}

/// Partition uploads into visual, text and unsupported buckets
pub fn classify(uploads: Vec<Upload>) -> ClassifiedAttachments {
    let mut classified = ClassifiedAttachments::default();

    for upload in uploads {
        match detect_kind(&upload.name, &upload.mime_type) {
            AttachmentKind::Visual => classified.visual.push(VisualAttachment {
                name: upload.name,
                mime_type: upload.mime_type,
                bytes: upload.bytes,
            }),
            AttachmentKind::Text => {
                let size = upload.bytes.len();
                let content = match String::from_utf8(upload.bytes) {
                    Ok(s) => s,
                    Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
                };
                classified.text.push(TextAttachment {
                    name: upload.name,
                    mime_type: upload.mime_type,
                    content,
                    size,
                });
            }
            AttachmentKind::Unsupported => {
                tracing::debug!(
                    "Attachment '{}' ({}) is unsupported, sending name only",
                    upload.name,
                    upload.mime_type
                );
                classified.unsupported.push(UnsupportedAttachment {
                    name: upload.name,
                    mime_type: upload.mime_type,
                });
            }
        }
    }

    classified
}

/// Format a size in bytes to a human-readable string
pub fn format_size(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;

    if bytes >= MB {
        format!("{:.1}MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1}KB", bytes as f64 / KB as f64)
    } else {
        format!("{}B", bytes)
    }
}
