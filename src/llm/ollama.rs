//! Ollama provider (self-hosted, text only)

use super::local::{flatten_prompt, post_for_files, ResponseField};
use super::{GenerationProvider, GenerationRequest, LlmError};
use crate::project::ProjectFile;
use async_trait::async_trait;
use serde::Serialize;

pub const DEFAULT_OLLAMA_MODEL: &str = "codellama";

/// Ollama answers with `response`; the rest covers OpenAI-style proxies
const RESPONSE_ORDER: [ResponseField; 3] = [
    ResponseField::Response,
    ResponseField::ChatContent,
    ResponseField::CompletionText,
];

pub struct OllamaProvider {
    client: reqwest::Client,
    url: String,
    model: String,
}

impl OllamaProvider {
    /// `url` is the full generate endpoint, e.g. `http://localhost:11434/api/generate`
    pub fn new(client: reqwest::Client, url: &str) -> Self {
        Self {
            client,
            url: url.trim().to_string(),
            model: DEFAULT_OLLAMA_MODEL.to_string(),
        }
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    fn build_request(&self, request: &GenerationRequest) -> OllamaGenerateRequest {
        OllamaGenerateRequest {
            model: self.model.clone(),
            prompt: flatten_prompt(&request.prompt),
            stream: false,
        }
    }
}

#[async_trait]
impl GenerationProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<Vec<ProjectFile>, LlmError> {
        let body = self.build_request(request);
        post_for_files(&self.client, "Ollama", &self.url, &body, &RESPONSE_ORDER).await
    }
}

#[derive(Debug, Serialize)]
struct OllamaGenerateRequest {
    model: String,
    prompt: String,
    stream: bool,
}
