//! Typed errors for generation backends
//!
//! Adapters fail with [`LlmError`]. The orchestrator wraps every adapter
//! failure into a [`GenerationError`] that carries the provider identity, so
//! callers only ever deal with one failure kind.

use super::ProviderKind;
use thiserror::Error;

/// Adapter-level failures
#[derive(Debug, Error)]
pub enum LlmError {
    /// A required endpoint URL or API key is not configured
    #[error("{provider} is not configured: {detail}")]
    Configuration {
        provider: ProviderKind,
        detail: String,
    },

    /// Attachments were sent to a provider that cannot accept them
    #[error("{provider} does not support attachments; remove them or switch to Gemini")]
    Capability { provider: ProviderKind },

    /// The backend answered with a non-success HTTP status
    #[error("HTTP {status}: {body}")]
    Transport { status: u16, body: String },

    /// Connection failure, timeout or unreadable body
    #[error("Network error: {0}")]
    Network(String),

    /// The response is not valid JSON or lacks the "files" array
    #[error("Invalid response: {0}")]
    Parse(String),
}

impl LlmError {
    /// Build a transport error from an HTTP status and body
    pub fn from_http_status(status: reqwest::StatusCode, body: String) -> Self {
        LlmError::Transport {
            status: status.as_u16(),
            body,
        }
    }

    /// Convert network/connection errors into a typed error
    ///
    /// The request URL is stripped from the message; it may carry credentials.
    pub fn from_network_error(e: reqwest::Error) -> Self {
        let e = e.without_url();
        if e.is_timeout() {
            LlmError::Network(format!("Request timeout: {}", e))
        } else if e.is_connect() {
            LlmError::Network(format!("Connection failed: {}", e))
        } else if let Some(status) = e.status() {
            Self::from_http_status(status, e.to_string())
        } else {
            LlmError::Network(e.to_string())
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, LlmError::Configuration { .. })
    }

    pub fn is_capability(&self) -> bool {
        matches!(self, LlmError::Capability { .. })
    }

    pub fn is_parse(&self) -> bool {
        matches!(self, LlmError::Parse(_))
    }
}

/// Uniform generation failure carrying the provider that produced it
#[derive(Debug, Error)]
#[error("{provider} generation failed: {source}")]
pub struct GenerationError {
    pub provider: ProviderKind,
    #[source]
    pub source: LlmError,
}

impl GenerationError {
    pub fn new(provider: ProviderKind, source: LlmError) -> Self {
        Self { provider, source }
    }

    /// Underlying message without the provider prefix
    pub fn message(&self) -> String {
        self.source.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_http_status() {
        let err = LlmError::from_http_status(
            reqwest::StatusCode::INTERNAL_SERVER_ERROR,
            "model not loaded".to_string(),
        );
        assert!(matches!(err, LlmError::Transport { status: 500, .. }));
        assert_eq!(err.to_string(), "HTTP 500: model not loaded");
    }

    #[test]
    fn test_configuration_names_provider() {
        let err = LlmError::Configuration {
            provider: ProviderKind::Ollama,
            detail: "no endpoint URL set".to_string(),
        };
        assert!(err.is_configuration());
        assert!(err.to_string().contains("Ollama"));
    }

    #[test]
    fn test_generation_error_display() {
        let err = GenerationError::new(
            ProviderKind::LmStudio,
            LlmError::Parse("missing \"files\" array".to_string()),
        );
        assert_eq!(
            err.to_string(),
            "LM Studio generation failed: Invalid response: missing \"files\" array"
        );
        assert_eq!(err.message(), "Invalid response: missing \"files\" array");
        assert!(err.source.is_parse());
    }

    #[test]
    fn test_convert_to_anyhow() {
        let err = GenerationError::new(
            ProviderKind::Gemini,
            LlmError::Capability {
                provider: ProviderKind::Gemini,
            },
        );
        let anyhow_err: anyhow::Error = err.into();
        assert!(anyhow_err.to_string().contains("Gemini generation failed"));
    }
}
