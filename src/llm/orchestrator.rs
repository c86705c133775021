//! Single entry point for generation
//!
//! Validates provider preconditions (configuration present, attachment
//! capability), windows the chat history, dispatches to the matching adapter
//! and wraps every failure into a [`GenerationError`].

use super::{
    history_window, GeminiProvider, GenerationError, GenerationProvider, GenerationRequest,
    LlmError, LmStudioProvider, OllamaProvider, ProviderKind,
};
use crate::attachments::ClassifiedAttachments;
use crate::config::{Config, GenerationConfig, LlmConfig};
use crate::project::{AiSettings, ChatMessage, ProjectFile};
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub struct Orchestrator {
    client: reqwest::Client,
    llm: LlmConfig,
    generation: GenerationConfig,
    gemini_api_key: Option<String>,
    /// Adapters used instead of the ones built from config
    overrides: HashMap<ProviderKind, Arc<dyn GenerationProvider>>,
}

impl Orchestrator {
    /// Build from loaded configuration; reads the Gemini key from the environment
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.llm.request_timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            llm: config.llm.clone(),
            generation: config.generation.clone(),
            gemini_api_key: config.gemini_api_key(),
            overrides: HashMap::new(),
        })
    }

    pub fn with_gemini_api_key(mut self, key: Option<String>) -> Self {
        self.gemini_api_key = key.filter(|k| !k.trim().is_empty());
        self
    }

    /// Route a provider kind to a specific adapter
    pub fn with_provider(mut self, kind: ProviderKind, provider: Arc<dyn GenerationProvider>) -> Self {
        self.overrides.insert(kind, provider);
        self
    }

    pub fn history_window(&self) -> usize {
        self.generation.history_window
    }

    /// Fail fast, before any network I/O, when a provider cannot serve the call
    ///
    /// Missing configuration is reported ahead of rejected attachments.
    pub fn check_preconditions(
        &self,
        kind: ProviderKind,
        attachments: &ClassifiedAttachments,
        settings: &AiSettings,
    ) -> Result<(), LlmError> {
        match kind {
            ProviderKind::Gemini => {
                if self.gemini_api_key.is_none() {
                    return Err(LlmError::Configuration {
                        provider: kind,
                        detail: format!(
                            "no API key; set the {} environment variable",
                            self.llm.gemini.api_key_env
                        ),
                    });
                }
            }
            ProviderKind::Ollama | ProviderKind::LmStudio => {
                let url = match kind {
                    ProviderKind::Ollama => settings.ollama_url(),
                    _ => settings.lm_studio_url(),
                };
                if url.is_none() {
                    return Err(LlmError::Configuration {
                        provider: kind,
                        detail: "no endpoint URL set in AI settings".to_string(),
                    });
                }
            }
        }

        if !kind.accepts_attachments() && !attachments.is_empty() {
            return Err(LlmError::Capability { provider: kind });
        }

        Ok(())
    }

    fn provider_for(
        &self,
        kind: ProviderKind,
        settings: &AiSettings,
    ) -> Result<Arc<dyn GenerationProvider>, LlmError> {
        if let Some(provider) = self.overrides.get(&kind) {
            return Ok(Arc::clone(provider));
        }

        let missing = |detail: &str| LlmError::Configuration {
            provider: kind,
            detail: detail.to_string(),
        };

        let provider: Arc<dyn GenerationProvider> = match kind {
            ProviderKind::Gemini => {
                let key = self.gemini_api_key.as_deref().ok_or_else(|| missing("no API key"))?;
                Arc::new(
                    GeminiProvider::new(self.client.clone(), key)
                        .with_model(&self.llm.gemini.model)
                        .with_base_url(&self.llm.gemini.base_url)
                        .with_limits(
                            self.generation.max_text_attachment_bytes,
                            self.generation.max_image_attachment_bytes,
                        ),
                )
            }
            ProviderKind::Ollama => {
                let url = settings
                    .ollama_url()
                    .ok_or_else(|| missing("no endpoint URL set in AI settings"))?;
                let model = settings
                    .ollama_model
                    .as_deref()
                    .unwrap_or(&self.llm.ollama.model);
                Arc::new(OllamaProvider::new(self.client.clone(), url).with_model(model))
            }
            ProviderKind::LmStudio => {
                let url = settings
                    .lm_studio_url()
                    .ok_or_else(|| missing("no endpoint URL set in AI settings"))?;
                let model = settings
                    .lm_studio_model
                    .as_deref()
                    .unwrap_or(&self.llm.lm_studio.model);
                Arc::new(
                    LmStudioProvider::new(self.client.clone(), url)
                        .with_model(model)
                        .with_max_tokens(self.llm.lm_studio.max_tokens),
                )
            }
        };

        Ok(provider)
    }

    /// Generate a full file set with the given provider
    ///
    /// `history` is the stored chat history before the new turn; only the
    /// most recent messages are forwarded.
    pub async fn generate(
        &self,
        kind: ProviderKind,
        prompt: &str,
        history: &[ChatMessage],
        attachments: ClassifiedAttachments,
        settings: &AiSettings,
    ) -> Result<Vec<ProjectFile>, GenerationError> {
        let wrap = |source: LlmError| GenerationError::new(kind, source);

        self.check_preconditions(kind, &attachments, settings)
            .map_err(wrap)?;
        let provider = self.provider_for(kind, settings).map_err(wrap)?;

        let request = GenerationRequest {
            prompt: prompt.to_string(),
            history: history_window(history, self.generation.history_window).to_vec(),
            attachments,
        };

        tracing::info!(
            "Generating with {} (history={}, attachments={})",
            provider.name(),
            request.history.len(),
            request.attachments.len()
        );

        match provider.generate(&request).await {
            Ok(files) => {
                tracing::info!("{} returned {} file(s)", kind, files.len());
                Ok(files)
            }
            Err(e) => {
                tracing::warn!("{} generation failed: {}", kind, e);
                Err(wrap(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attachments::{classify, Upload};
    use crate::project::FileType;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Records calls and answers with a fixed result
    struct RecordingProvider {
        calls: AtomicUsize,
        last_history: Mutex<Vec<ChatMessage>>,
        fail: bool,
    }

    impl RecordingProvider {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                last_history: Mutex::new(Vec::new()),
                fail,
            })
        }
    }

    #[async_trait]
    impl GenerationProvider for RecordingProvider {
        fn name(&self) -> &str {
            "recording"
        }

        async fn generate(
            &self,
            request: &GenerationRequest,
        ) -> Result<Vec<ProjectFile>, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_history.lock().unwrap() = request.history.clone();
            if self.fail {
                return Err(LlmError::Parse("no files".to_string()));
            }
            Ok(vec![ProjectFile::new("index.html", FileType::Html, "<p>ok</p>")])
        }
    }

    fn orchestrator() -> Orchestrator {
        Orchestrator::new(&Config::default())
            .unwrap()
            .with_gemini_api_key(None)
    }

    fn local_settings() -> AiSettings {
        AiSettings {
            ollama_url: Some("http://127.0.0.1:9/api/generate".to_string()),
            lm_studio_url: Some("http://127.0.0.1:9/v1/completions".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_missing_url_is_configuration_error_without_call() {
        let recorder = RecordingProvider::new(false);
        let orch = orchestrator().with_provider(ProviderKind::Ollama, recorder.clone());

        let err = orch
            .generate(
                ProviderKind::Ollama,
                "page",
                &[],
                ClassifiedAttachments::default(),
                &AiSettings::default(),
            )
            .await
            .unwrap_err();

        assert_eq!(err.provider, ProviderKind::Ollama);
        assert!(err.source.is_configuration());
        assert!(err.to_string().contains("Ollama"));
        assert_eq!(recorder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_attachments_rejected_for_local_providers() {
        for kind in [ProviderKind::Ollama, ProviderKind::LmStudio] {
            let recorder = RecordingProvider::new(false);
            let orch = orchestrator().with_provider(kind, recorder.clone());
            let attachments = classify(vec![Upload::new("shot.png", None, vec![1, 2])]);

            let err = orch
                .generate(kind, "page", &[], attachments, &local_settings())
                .await
                .unwrap_err();

            assert!(err.source.is_capability());
            assert_eq!(recorder.calls.load(Ordering::SeqCst), 0);
        }
    }

    #[tokio::test]
    async fn test_missing_url_reported_before_attachment_rejection() {
        let attachments = classify(vec![Upload::new("shot.png", None, vec![1, 2])]);
        let err = orchestrator()
            .generate(
                ProviderKind::LmStudio,
                "page",
                &[],
                attachments,
                &AiSettings::default(),
            )
            .await
            .unwrap_err();

        assert!(err.source.is_configuration());
        assert!(!err.source.is_capability());
    }

    #[tokio::test]
    async fn test_gemini_requires_api_key() {
        let err = orchestrator()
            .generate(
                ProviderKind::Gemini,
                "page",
                &[],
                ClassifiedAttachments::default(),
                &AiSettings::default(),
            )
            .await
            .unwrap_err();
        assert!(err.source.is_configuration());
        assert!(err.message().contains("GEMINI_API_KEY"));
    }

    #[tokio::test]
    async fn test_gemini_accepts_attachments() {
        let recorder = RecordingProvider::new(false);
        let orch = orchestrator()
            .with_gemini_api_key(Some("k".to_string()))
            .with_provider(ProviderKind::Gemini, recorder.clone());
        let attachments = classify(vec![Upload::new("shot.png", None, vec![1, 2])]);

        let files = orch
            .generate(
                ProviderKind::Gemini,
                "page",
                &[],
                attachments,
                &AiSettings::default(),
            )
            .await
            .unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(recorder.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_history_is_windowed() {
        let recorder = RecordingProvider::new(false);
        let orch = orchestrator().with_provider(ProviderKind::Ollama, recorder.clone());
        let history: Vec<ChatMessage> = (0..25)
            .map(|i| ChatMessage::user(format!("turn {i}")))
            .collect();

        orch.generate(
            ProviderKind::Ollama,
            "page",
            &history,
            ClassifiedAttachments::default(),
            &local_settings(),
        )
        .await
        .unwrap();

        let sent = recorder.last_history.lock().unwrap().clone();
        assert_eq!(sent.len(), orch.history_window());
        assert_eq!(sent.last().unwrap().content, "turn 24");
    }

    #[tokio::test]
    async fn test_adapter_failure_is_wrapped() {
        let recorder = RecordingProvider::new(true);
        let orch = orchestrator().with_provider(ProviderKind::LmStudio, recorder);

        let err = orch
            .generate(
                ProviderKind::LmStudio,
                "page",
                &[],
                ClassifiedAttachments::default(),
                &local_settings(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.provider, ProviderKind::LmStudio);
        assert!(err.source.is_parse());
        assert!(err.to_string().starts_with("LM Studio generation failed"));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_network_error() {
        let settings = AiSettings {
            ollama_url: Some("http://127.0.0.1:1/api/generate".to_string()),
            ..Default::default()
        };
        let err = orchestrator()
            .generate(
                ProviderKind::Ollama,
                "page",
                &[],
                ClassifiedAttachments::default(),
                &settings,
            )
            .await
            .unwrap_err();
        assert!(matches!(err.source, LlmError::Network(_)));
    }
}
