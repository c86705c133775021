//! Project data model
//!
//! A project is a named bundle of generated web files plus the chat history
//! that produced them. Projects are always replaced as whole objects; see
//! [`crate::store::ProjectStore`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Name given to projects created without one
pub const UNTITLED_PROJECT: &str = "Untitled Project";

/// Kind of generated file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Html,
    Css,
    #[serde(alias = "js")]
    Javascript,
}

impl FileType {
    /// All variants, in the order the model is asked to use them
    pub const ALL: [FileType; 3] = [FileType::Html, FileType::Css, FileType::Javascript];

    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Html => "html",
            FileType::Css => "css",
            FileType::Javascript => "javascript",
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// One generated source artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectFile {
    /// Derived from `name`; not guaranteed unique across regenerations
    pub id: String,
    pub name: String,
    pub content: String,
    #[serde(rename = "type")]
    pub file_type: FileType,
}

impl ProjectFile {
    pub fn new(name: impl Into<String>, file_type: FileType, content: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: file_id(&name),
            name,
            content: content.into(),
            file_type,
        }
    }
}

/// Derive a file id from its name
pub fn file_id(name: &str) -> String {
    format!("file-{}", name.trim())
}

/// Collapse files sharing a name: the later entry wins and takes the
/// position of the first one.
pub fn dedupe_by_name(files: Vec<ProjectFile>) -> Vec<ProjectFile> {
    let mut out: Vec<ProjectFile> = Vec::with_capacity(files.len());
    for file in files {
        if let Some(existing) = out.iter_mut().find(|f| f.name == file.name) {
            tracing::debug!("Duplicate generated file '{}', keeping the later one", file.name);
            *existing = file;
        } else {
            out.push(file);
        }
    }
    out
}

/// Who wrote a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// Name and media type of an attachment; content is never kept in history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentDescriptor {
    pub name: String,
    pub mime_type: String,
}

/// A message in a project's chat history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Vec<AttachmentDescriptor>>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
            attachments: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
            attachments: None,
        }
    }

    /// Assistant turn recording a failed generation
    pub fn error(message: impl fmt::Display) -> Self {
        Self::assistant(format!("Error: {message}"))
    }

    pub fn with_attachments(mut self, attachments: Vec<AttachmentDescriptor>) -> Self {
        self.attachments = if attachments.is_empty() {
            None
        } else {
            Some(attachments)
        };
        self
    }

    pub fn is_error(&self) -> bool {
        self.role == ChatRole::Assistant && self.content.starts_with("Error: ")
    }
}

/// A project and everything generated for it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub files: Vec<ProjectFile>,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub archived: bool,
}

impl Project {
    /// Create an empty project with a fresh id
    pub fn new(name: &str) -> Self {
        let name = name.trim();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: if name.is_empty() {
                UNTITLED_PROJECT.to_string()
            } else {
                name.to_string()
            },
            files: Vec::new(),
            messages: Vec::new(),
            updated_at: Utc::now(),
            archived: false,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Short id for display
    pub fn short_id(&self) -> &str {
        &self.id[..self.id.len().min(8)]
    }
}

/// Per-backend endpoint configuration, persisted alongside projects
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AiSettings {
    pub ollama_url: Option<String>,
    pub lm_studio_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ollama_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lm_studio_model: Option<String>,
}

impl AiSettings {
    /// Configured URL with blank values treated as absent
    pub fn ollama_url(&self) -> Option<&str> {
        non_blank(self.ollama_url.as_deref())
    }

    pub fn lm_studio_url(&self) -> Option<&str> {
        non_blank(self.lm_studio_url.as_deref())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_project_defaults() {
        let project = Project::new("  Landing  ");
        assert_eq!(project.name, "Landing");
        assert!(project.files.is_empty());
        assert!(project.messages.is_empty());
        assert!(!project.archived);
        assert!(uuid::Uuid::parse_str(&project.id).is_ok());
    }

    #[test]
    fn test_blank_name_becomes_untitled() {
        assert_eq!(Project::new("   ").name, UNTITLED_PROJECT);
    }

    #[test]
    fn test_file_type_serde() {
        let file: ProjectFile = serde_json::from_str(
            r#"{"id":"x","name":"app.js","content":"1","type":"js"}"#,
        )
        .unwrap();
        assert_eq!(file.file_type, FileType::Javascript);
        let json = serde_json::to_value(&file).unwrap();
        assert_eq!(json["type"], "javascript");
    }

    #[test]
    fn test_unknown_file_type_rejected() {
        let result: Result<ProjectFile, _> =
            serde_json::from_str(r#"{"id":"x","name":"a.py","content":"","type":"python"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_dedupe_last_write_wins_keeps_first_position() {
        let files = vec![
            ProjectFile::new("index.html", FileType::Html, "old"),
            ProjectFile::new("style.css", FileType::Css, "body{}"),
            ProjectFile::new("index.html", FileType::Html, "new"),
        ];
        let files = dedupe_by_name(files);
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].name, "index.html");
        assert_eq!(files[0].content, "new");
        assert_eq!(files[1].name, "style.css");
    }

    #[test]
    fn test_file_id_derived_from_name() {
        let a = ProjectFile::new("index.html", FileType::Html, "a");
        let b = ProjectFile::new("index.html", FileType::Html, "b");
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn test_attachment_descriptors_omitted_when_empty() {
        let msg = ChatMessage::user("hi").with_attachments(Vec::new());
        assert!(msg.attachments.is_none());
        let json = serde_json::to_string(&msg).unwrap();
        assert!(!json.contains("attachments"));
    }

    #[test]
    fn test_error_message() {
        let msg = ChatMessage::error("boom");
        assert!(msg.is_error());
        assert_eq!(msg.content, "Error: boom");
        assert!(!ChatMessage::assistant("Generated 1 file(s)").is_error());
    }

    #[test]
    fn test_settings_blank_url_is_absent() {
        let settings = AiSettings {
            ollama_url: Some("   ".to_string()),
            lm_studio_url: Some(" http://localhost:1234/v1/completions ".to_string()),
            ..Default::default()
        };
        assert_eq!(settings.ollama_url(), None);
        assert_eq!(
            settings.lm_studio_url(),
            Some("http://localhost:1234/v1/completions")
        );
    }
}
