//! Shared plumbing for self-hosted HTTP endpoints (Ollama, LM Studio)
//!
//! These backends get a single flattened prompt. History and attachments are
//! never forwarded; the orchestrator rejects attachments before we get here.

use super::{parse_files_payload, LlmError};
use crate::project::ProjectFile;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;

/// Instruction prepended to the user request for text-only local models
pub const LOCAL_SYSTEM_INSTRUCTION: &str = "You are an expert front-end web developer. \
Create a small static web project (HTML, CSS and JavaScript) for the request below. \
Respond ONLY with a JSON object of the form \
{\"files\": [{\"name\": \"index.html\", \"type\": \"html\", \"content\": \"...\"}]} \
where type is one of \"html\", \"css\" or \"javascript\". \
Do not add explanations or markdown.";

static CODE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```[A-Za-z0-9_-]*[ \t]*\r?\n?(.*)```").expect("valid regex"));

/// Where the generated text may sit in a response envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum ResponseField {
    /// Ollama: `{"response": "..."}`
    Response,
    /// Chat completions: `{"choices": [{"message": {"content": "..."}}]}`
    ChatContent,
    /// Text completions: `{"choices": [{"text": "..."}]}`
    CompletionText,
}

impl ResponseField {
    fn lookup<'a>(&self, body: &'a Value) -> Option<&'a str> {
        match self {
            ResponseField::Response => body.get("response")?.as_str(),
            ResponseField::ChatContent => body
                .get("choices")?
                .get(0)?
                .get("message")?
                .get("content")?
                .as_str(),
            ResponseField::CompletionText => body.get("choices")?.get(0)?.get("text")?.as_str(),
        }
    }
}

/// Generic instruction followed by the user's request
pub(super) fn flatten_prompt(prompt: &str) -> String {
    format!("{LOCAL_SYSTEM_INSTRUCTION}\n\nUser request: {prompt}")
}

/// Remove a surrounding Markdown code fence, if any
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    if trimmed.starts_with('{') {
        return trimmed;
    }
    if let Some(captures) = CODE_FENCE.captures(trimmed) {
        if let Some(inner) = captures.get(1) {
            return inner.as_str().trim();
        }
    }
    // Unterminated fence: drop the opening line
    if let Some(rest) = trimmed.strip_prefix("```") {
        return rest
            .split_once('\n')
            .map(|(_, body)| body.trim())
            .unwrap_or("");
    }
    trimmed
}

/// First string found along the fallback chain
pub(super) fn extract_text<'a>(body: &'a Value, order: &[ResponseField]) -> Option<&'a str> {
    order.iter().find_map(|field| field.lookup(body))
}

/// POST a request envelope and decode the generated file list
pub(super) async fn post_for_files<T: Serialize + ?Sized>(
    client: &reqwest::Client,
    provider: &str,
    url: &str,
    envelope: &T,
    order: &[ResponseField],
) -> Result<Vec<ProjectFile>, LlmError> {
    tracing::debug!("Sending {} request to {}", provider, url);

    let response = client
        .post(url)
        .json(envelope)
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

    let body: Value = serde_json::from_str(&body)
        .map_err(|e| LlmError::Parse(format!("{provider} response is not valid JSON: {e}")))?;

    let text = extract_text(&body, order).ok_or_else(|| {
        LlmError::Parse(format!("{provider} response contains no generated text"))
    })?;

    parse_files_payload(strip_code_fences(text))
}
