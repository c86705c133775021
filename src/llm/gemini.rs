//! Google Gemini provider (hosted, multimodal)
//!
//! SECURITY: the API key travels in the `x-goog-api-key` header, never in
//! the URL, so it cannot surface in error messages or logs.

use super::{
    files_response_schema, parse_files_payload, GenerationProvider, GenerationRequest, LlmError,
    GENERATION_SYSTEM_INSTRUCTION,
};
use crate::attachments::format_size;
use crate::project::{ChatRole, ProjectFile};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Official Google Gemini API endpoint
pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Largest text attachment inlined into the prompt (500 KB)
pub const MAX_TEXT_ATTACHMENT_BYTES: usize = 500 * 1024;

/// Largest image sent as inline data (4 MB)
pub const MAX_IMAGE_ATTACHMENT_BYTES: usize = 4 * 1024 * 1024;

pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    max_text_bytes: usize,
    max_image_bytes: usize,
}

impl GeminiProvider {
    pub fn new(client: reqwest::Client, api_key: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            model: "gemini-2.5-flash".to_string(),
            base_url: GEMINI_API_BASE.to_string(),
            max_text_bytes: MAX_TEXT_ATTACHMENT_BYTES,
            max_image_bytes: MAX_IMAGE_ATTACHMENT_BYTES,
        }
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    /// Override the attachment size ceilings
    pub fn with_limits(mut self, max_text_bytes: usize, max_image_bytes: usize) -> Self {
        self.max_text_bytes = max_text_bytes;
        self.max_image_bytes = max_image_bytes;
        self
    }

    /// Build the conversation: windowed history, then the new user turn
    fn build_request(&self, request: &GenerationRequest) -> GeminiRequest {
        let mut contents: Vec<GeminiContent> = request
            .history
            .iter()
            .map(|msg| GeminiContent {
                role: match msg.role {
                    ChatRole::User => "user",
                    ChatRole::Assistant => "model",
                }
                .to_string(),
                parts: vec![GeminiPart::Text {
                    text: msg.content.clone(),
                }],
            })
            .collect();

        contents.push(GeminiContent {
            role: "user".to_string(),
            parts: self.user_parts(request),
        });

        GeminiRequest {
            contents,
            system_instruction: GeminiSystemInstruction {
                parts: vec![GeminiPart::Text {
                    text: GENERATION_SYSTEM_INSTRUCTION.to_string(),
                }],
            },
            generation_config: GeminiGenerationConfig {
                response_mime_type: "application/json".to_string(),
                response_schema: files_response_schema(),
            },
        }
    }

    fn user_parts(&self, request: &GenerationRequest) -> Vec<GeminiPart> {
        let attachments = &request.attachments;
        let mut parts = vec![GeminiPart::Text {
            text: request.prompt.clone(),
        }];

        for file in &attachments.text {
            if file.size > self.max_text_bytes {
                tracing::warn!(
                    "Skipping text attachment '{}' ({}): over the {} limit",
                    file.name,
                    format_size(file.size),
                    format_size(self.max_text_bytes)
                );
                parts.push(GeminiPart::Text {
                    text: oversized_note("file", &file.name, file.size, self.max_text_bytes),
                });
                continue;
            }
            parts.push(GeminiPart::Text {
                text: format!(
                    "--- START OF FILE: {name} ---\n{content}\n--- END OF FILE: {name} ---",
                    name = file.name,
                    content = file.content
                ),
            });
        }

        for image in &attachments.visual {
            if image.size() > self.max_image_bytes {
                tracing::warn!(
                    "Skipping image attachment '{}' ({}): over the {} limit",
                    image.name,
                    format_size(image.size()),
                    format_size(self.max_image_bytes)
                );
                parts.push(GeminiPart::Text {
                    text: oversized_note("image", &image.name, image.size(), self.max_image_bytes),
                });
                continue;
            }
            parts.push(GeminiPart::InlineData {
                inline_data: GeminiInlineData {
                    mime_type: image.mime_type.clone(),
                    data: image.to_base64(),
                },
            });
        }

        if let Some(note) = attachments.unsupported_note() {
            parts.push(GeminiPart::Text { text: note });
        }

        parts
    }

    async fn send_request(&self, request: &GeminiRequest) -> Result<GeminiResponse, LlmError> {
        let url = format!("{}/{}:generateContent", self.base_url, self.model);
        tracing::debug!(
            "Sending Gemini request: model={}, turns={}",
            self.model,
            request.contents.len()
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", self.api_key.as_str())
            .json(request)
            .send()
            .await
            .map_err(LlmError::from_network_error)?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(LlmError::from_network_error)?;

        if !status.is_success() {
            return Err(LlmError::from_http_status(status, body));
        }

        serde_json::from_str(&body)
            .map_err(|e| LlmError::Parse(format!("unexpected Gemini response envelope: {e}")))
    }
}

fn oversized_note(kind: &str, name: &str, size: usize, limit: usize) -> String {
    format!(
        "[Note: the attached {kind} '{name}' ({}) exceeds the {} limit and was not included.]",
        format_size(size),
        format_size(limit)
    )
}

#[async_trait]
impl GenerationProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<Vec<ProjectFile>, LlmError> {
        let body = self.build_request(request);
        let response = self.send_request(&body).await?;

        let candidate = response
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::Parse("Gemini returned no candidates".to_string()))?;

        let text = candidate
            .content
            .map(|c| {
                c.parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        parse_files_payload(&text)
    }
}

// Gemini API types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    system_instruction: GeminiSystemInstruction,
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize)]
struct GeminiSystemInstruction {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    role: String,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum GeminiPart {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: GeminiInlineData,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiInlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    response_mime_type: String,
    response_schema: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiResponseContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponsePart {
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attachments::{classify, Upload};
    use crate::project::ChatMessage;

    fn provider() -> GeminiProvider {
        GeminiProvider::new(reqwest::Client::new(), "test-key").with_limits(16, 8)
    }

    fn request_json(request: &GenerationRequest) -> serde_json::Value {
        serde_json::to_value(provider().build_request(request)).unwrap()
    }

    #[test]
    fn test_history_roles_and_new_turn() {
        let request = GenerationRequest {
            prompt: "make it blue".to_string(),
            history: vec![ChatMessage::user("a page"), ChatMessage::assistant("done")],
            ..Default::default()
        };
        let json = request_json(&request);
        let contents = json["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[0]["role"], "user");
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[2]["role"], "user");
        assert_eq!(contents[2]["parts"][0]["text"], "make it blue");
    }

    #[test]
    fn test_request_declares_schema_and_instruction() {
        let json = request_json(&GenerationRequest::default());
        assert_eq!(
            json["generationConfig"]["responseMimeType"],
            "application/json"
        );
        assert_eq!(
            json["generationConfig"]["responseSchema"]["required"],
            serde_json::json!(["files"])
        );
        let instruction = json["systemInstruction"]["parts"][0]["text"]
            .as_str()
            .unwrap();
        assert!(instruction.contains("\"files\""));
    }

    #[test]
    fn test_text_attachment_inlined_with_markers() {
        let request = GenerationRequest {
            prompt: "use this".to_string(),
            attachments: classify(vec![Upload::new("a.css", None, b"p{}".to_vec())]),
            ..Default::default()
        };
        let json = request_json(&request);
        let text = json["contents"][0]["parts"][1]["text"].as_str().unwrap();
        assert_eq!(
            text,
            "--- START OF FILE: a.css ---\np{}\n--- END OF FILE: a.css ---"
        );
    }

    #[test]
    fn test_image_attachment_sent_inline() {
        let request = GenerationRequest {
            prompt: "copy this".to_string(),
            attachments: classify(vec![Upload::new("s.png", None, b"png".to_vec())]),
            ..Default::default()
        };
        let json = request_json(&request);
        let part = &json["contents"][0]["parts"][1];
        assert_eq!(part["inlineData"]["mimeType"], "image/png");
        assert_eq!(part["inlineData"]["data"], "cG5n");
    }

    #[test]
    fn test_oversized_attachments_degrade_to_notes() {
        let request = GenerationRequest {
            prompt: "go".to_string(),
            attachments: classify(vec![
                Upload::new("big.txt", None, vec![b'a'; 17]),
                Upload::new("big.png", None, vec![0; 9]),
            ]),
            ..Default::default()
        };
        let json = request_json(&request);
        let parts = json["contents"][0]["parts"].as_array().unwrap();
        assert_eq!(parts.len(), 3);
        let text_note = parts[1]["text"].as_str().unwrap();
        assert!(text_note.contains("'big.txt'"));
        assert!(text_note.contains("not included"));
        assert!(!text_note.contains("aaaa"));
        let image_note = parts[2]["text"].as_str().unwrap();
        assert!(image_note.contains("'big.png'"));
        assert!(parts[2].get("inlineData").is_none());
    }

    #[test]
    fn test_unsupported_mentioned_by_name() {
        let request = GenerationRequest {
            prompt: "go".to_string(),
            attachments: classify(vec![Upload::new(
                "brief.pdf",
                None,
                b"%PDF secret".to_vec(),
            )]),
            ..Default::default()
        };
        let json = request_json(&request);
        let note = json["contents"][0]["parts"][1]["text"].as_str().unwrap();
        assert!(note.contains("brief.pdf"));
        assert!(!note.contains("secret"));
    }

    #[test]
    fn test_parse_gemini_response() {
        let json = r#"{
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [{"text": "{\"files\":[{\"name\":\"index.html\",\"type\":\"html\",\"content\":\"<h1>Hi</h1>\"}]}"}]
                }
            }]
        }"#;
        let response: GeminiResponse = serde_json::from_str(json).unwrap();
        let text = response.candidates[0].content.as_ref().unwrap().parts[0]
            .text
            .clone()
            .unwrap();
        let files = parse_files_payload(&text).unwrap();
        assert_eq!(files[0].content, "<h1>Hi</h1>");
    }
}
