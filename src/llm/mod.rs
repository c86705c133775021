//! Generation backends
//!
//! Every backend implements [`GenerationProvider`]: it turns a prompt, a
//! bounded slice of chat history and the classified attachments into a list
//! of [`ProjectFile`]s. [`Orchestrator`] is the single entry point callers
//! use; it checks provider capabilities and wraps failures.

mod error;
mod gemini;
mod lm_studio;
mod local;
mod ollama;
mod orchestrator;

pub use error::{GenerationError, LlmError};
pub use gemini::{
    GeminiProvider, GEMINI_API_BASE, MAX_IMAGE_ATTACHMENT_BYTES, MAX_TEXT_ATTACHMENT_BYTES,
};
pub use lm_studio::{LmStudioProvider, DEFAULT_LM_STUDIO_MODEL};
pub use local::{strip_code_fences, LOCAL_SYSTEM_INSTRUCTION};
pub use ollama::{OllamaProvider, DEFAULT_OLLAMA_MODEL};
pub use orchestrator::Orchestrator;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::attachments::ClassifiedAttachments;
use crate::project::{dedupe_by_name, ChatMessage, FileType, ProjectFile};

/// Number of most recent chat messages forwarded to a backend
pub const HISTORY_WINDOW: usize = 10;

/// Instruction given to backends that accept a separate system prompt
pub const GENERATION_SYSTEM_INSTRUCTION: &str = "You are an expert front-end web developer. \
Build exactly what the user asks for as a small static web project made of HTML, CSS and \
JavaScript files. Respond with a single JSON object with one key, \"files\": an array of \
objects with \"name\" (the file name, for example index.html), \"type\" (one of \"html\", \
\"css\" or \"javascript\") and \"content\" (the complete file contents). Always return the \
full project, not a diff. Do not write anything outside the JSON object.";

/// Generation backend variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    /// Hosted multimodal model
    Gemini,
    /// Self-hosted Ollama `/api/generate` endpoint
    Ollama,
    /// Self-hosted LM Studio completions endpoint
    LmStudio,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 3] = [
        ProviderKind::Gemini,
        ProviderKind::Ollama,
        ProviderKind::LmStudio,
    ];

    /// Stable identifier used in config, CLI and HTTP payloads
    pub fn id(&self) -> &'static str {
        match self {
            ProviderKind::Gemini => "gemini",
            ProviderKind::Ollama => "ollama",
            ProviderKind::LmStudio => "lm-studio",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderKind::Gemini => "Gemini",
            ProviderKind::Ollama => "Ollama",
            ProviderKind::LmStudio => "LM Studio",
        }
    }

    /// Whether the backend can take attachments at all
    pub fn accepts_attachments(&self) -> bool {
        matches!(self, ProviderKind::Gemini)
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for ProviderKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gemini" | "google" => Ok(ProviderKind::Gemini),
            "ollama" | "local" => Ok(ProviderKind::Ollama),
            "lm-studio" | "lmstudio" | "lm_studio" => Ok(ProviderKind::LmStudio),
            other => anyhow::bail!(
                "Unknown provider: {}. Supported: gemini, ollama, lm-studio",
                other
            ),
        }
    }
}

/// Everything an adapter needs for one generation
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    pub prompt: String,
    /// Already windowed to the most recent messages
    pub history: Vec<ChatMessage>,
    pub attachments: ClassifiedAttachments,
}

/// Trait for generation backends
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Get the provider name
    fn name(&self) -> &str;

    /// Generate the full file set for a request
    async fn generate(&self, request: &GenerationRequest) -> Result<Vec<ProjectFile>, LlmError>;
}

/// The most recent `window` messages of a history
pub fn history_window(messages: &[ChatMessage], window: usize) -> &[ChatMessage] {
    let start = messages.len().saturating_sub(window);
    &messages[start..]
}

/// One entry of the "files" array as the model writes it
#[derive(Debug, Deserialize)]
struct GeneratedFile {
    name: String,
    #[serde(rename = "type")]
    file_type: FileType,
    content: String,
}

/// Decode a `{"files": [...]}` payload into project files
pub fn parse_files_payload(text: &str) -> Result<Vec<ProjectFile>, LlmError> {
    let value: serde_json::Value = serde_json::from_str(text.trim())
        .map_err(|e| LlmError::Parse(format!("response is not valid JSON: {e}")))?;

    let files = value
        .get("files")
        .filter(|f| f.is_array())
        .cloned()
        .ok_or_else(|| {
            LlmError::Parse("response does not match the expected {\"files\": [...]} shape".into())
        })?;

    let files: Vec<GeneratedFile> = serde_json::from_value(files)
        .map_err(|e| LlmError::Parse(format!("invalid entry in \"files\": {e}")))?;

    Ok(dedupe_by_name(
        files
            .into_iter()
            .map(|f| ProjectFile::new(f.name, f.file_type, f.content))
            .collect(),
    ))
}

/// JSON schema the hosted model is bound to
pub fn files_response_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "OBJECT",
        "properties": {
            "files": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "name": { "type": "STRING" },
                        "type": {
                            "type": "STRING",
                            "enum": FileType::ALL.iter().map(FileType::as_str).collect::<Vec<_>>()
                        },
                        "content": { "type": "STRING" }
                    },
                    "required": ["name", "type", "content"]
                }
            }
        },
        "required": ["files"]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_from_str() {
        assert_eq!("gemini".parse::<ProviderKind>().unwrap(), ProviderKind::Gemini);
        assert_eq!("Local".parse::<ProviderKind>().unwrap(), ProviderKind::Ollama);
        assert_eq!(
            "lmstudio".parse::<ProviderKind>().unwrap(),
            ProviderKind::LmStudio
        );
        assert!("claude".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn test_provider_serde_uses_ids() {
        let json = serde_json::to_string(&ProviderKind::LmStudio).unwrap();
        assert_eq!(json, "\"lm-studio\"");
        for kind in ProviderKind::ALL {
            assert_eq!(kind.id().parse::<ProviderKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_history_window_keeps_suffix() {
        let messages: Vec<ChatMessage> = (0..15)
            .map(|i| ChatMessage::user(format!("m{i}")))
            .collect();
        let window = history_window(&messages, HISTORY_WINDOW);
        assert_eq!(window.len(), 10);
        assert_eq!(window[0].content, "m5");
        assert_eq!(window[9].content, "m14");

        assert_eq!(history_window(&messages[..3], 10).len(), 3);
        assert!(history_window(&messages, 0).is_empty());
    }

    #[test]
    fn test_parse_files_payload() {
        let files = parse_files_payload(
            r#"{"files":[{"name":"index.html","type":"html","content":"<h1>Hi</h1>"}]}"#,
        )
        .unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "index.html");
        assert_eq!(files[0].file_type, FileType::Html);
    }

    #[test]
    fn test_parse_missing_files_array() {
        let err = parse_files_payload(r#"{"result": []}"#).unwrap_err();
        assert!(err.is_parse());
        let err = parse_files_payload(r#"{"files": "index.html"}"#).unwrap_err();
        assert!(err.is_parse());
        let err = parse_files_payload("[]").unwrap_err();
        assert!(err.is_parse());
    }

    #[test]
    fn test_parse_invalid_json() {
        let err = parse_files_payload("Sure! Here is your page").unwrap_err();
        assert!(err.to_string().contains("not valid JSON"));
    }

    #[test]
    fn test_parse_rejects_unknown_type() {
        let err =
            parse_files_payload(r#"{"files":[{"name":"a.py","type":"python","content":""}]}"#)
                .unwrap_err();
        assert!(err.is_parse());
    }

    #[test]
    fn test_schema_enumerates_file_types() {
        let schema = files_response_schema();
        let types = &schema["properties"]["files"]["items"]["properties"]["type"]["enum"];
        assert_eq!(types, &serde_json::json!(["html", "css", "javascript"]));
    }
}
