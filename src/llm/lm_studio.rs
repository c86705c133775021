//! LM Studio provider (self-hosted, OpenAI-compatible completions, text only)

use super::local::{flatten_prompt, post_for_files, ResponseField};
use super::{GenerationProvider, GenerationRequest, LlmError};
use crate::project::ProjectFile;
use async_trait::async_trait;
use serde::Serialize;

pub const DEFAULT_LM_STUDIO_MODEL: &str = "local-model";

const RESPONSE_ORDER: [ResponseField; 3] = [
    ResponseField::ChatContent,
    ResponseField::CompletionText,
    ResponseField::Response,
];

pub struct LmStudioProvider {
    client: reqwest::Client,
    url: String,
    model: String,
    max_tokens: usize,
}

impl LmStudioProvider {
    /// `url` is the full completions endpoint, e.g. `http://localhost:1234/v1/completions`
    pub fn new(client: reqwest::Client, url: &str) -> Self {
        Self {
            client,
            url: url.trim().to_string(),
            model: DEFAULT_LM_STUDIO_MODEL.to_string(),
            max_tokens: 8192,
        }
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    fn build_request(&self, request: &GenerationRequest) -> LmStudioRequest {
        LmStudioRequest {
            model: self.model.clone(),
            prompt: flatten_prompt(&request.prompt),
            stream: false,
            max_tokens: self.max_tokens,
            temperature: 0.2,
        }
    }
}

#[async_trait]
impl GenerationProvider for LmStudioProvider {
    fn name(&self) -> &str {
        "lm-studio"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<Vec<ProjectFile>, LlmError> {
        let body = self.build_request(request);
        post_for_files(&self.client, "LM Studio", &self.url, &body, &RESPONSE_ORDER).await
    }
}

#[derive(Debug, Serialize)]
struct LmStudioRequest {
    model: String,
    prompt: String,
    stream: bool,
    max_tokens: usize,
    temperature: f32,
}
