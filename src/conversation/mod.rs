//! Chat turns
//!
//! A turn commits the user's message, asks the orchestrator for a fresh file
//! set and records the outcome in the project's history. The store lock is
//! only held between awaits, never across the backend call.

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::attachments::{classify, Upload};
use crate::llm::{GenerationError, Orchestrator, ProviderKind};
use crate::project::{ChatMessage, Project, ProjectFile};
use crate::store::{ProjectStore, StoreError};

/// Store handle shared between the chat service and its callers
pub type SharedStore = Arc<Mutex<ProjectStore>>;

/// Chat turn errors
#[derive(Debug, Error)]
pub enum ChatError {
    /// Blank prompt with nothing attached
    #[error("Prompt must not be empty")]
    EmptyPrompt,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Generation(#[from] GenerationError),
}

/// Runs chat turns against a shared store
#[derive(Clone)]
pub struct ChatService {
    store: SharedStore,
    orchestrator: Arc<Orchestrator>,
}

impl ChatService {
    pub fn new(store: SharedStore, orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            store,
            orchestrator,
        }
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// Send one prompt for a project
    ///
    /// On success the project's files are replaced and the updated project is
    /// returned. On a generation failure the user turn and an `Error: ` turn
    /// stay in history, the banner is set, and the failure is returned.
    /// A blank prompt without uploads is refused before anything is stored.
    pub async fn send(
        &self,
        project_id: &str,
        prompt: &str,
        provider: ProviderKind,
        uploads: Vec<Upload>,
    ) -> Result<Project, ChatError> {
        if prompt.trim().is_empty() && uploads.is_empty() {
            return Err(ChatError::EmptyPrompt);
        }

        let descriptors = uploads.iter().map(Upload::descriptor).collect::<Vec<_>>();
        let attachments = classify(uploads);

        let (id, history, settings) = {
            let mut store = self.store.lock().await;
            store.set_error(None);

            let mut project = store.resolve(project_id)?.clone();
            let id = project.id.clone();
            let history = project.messages.clone();
            project
                .messages
                .push(ChatMessage::user(prompt).with_attachments(descriptors));
            project.touch();
            store.update(project)?;

            (id, history, store.settings().clone())
        };

        let result = self
            .orchestrator
            .generate(provider, prompt, &history, attachments, &settings)
            .await;

        let mut store = self.store.lock().await;
        // The project may have changed while the backend was working
        let mut project = store
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        match result {
            Ok(files) => {
                project.messages.push(ChatMessage::assistant(summarize(&files)));
                project.files = files;
                project.touch();
                store.update(project.clone())?;
                Ok(project)
            }
            Err(e) => {
                let message = e.to_string();
                project.messages.push(ChatMessage::error(&message));
                project.touch();
                store.update(project)?;
                store.set_error(Some(message));
                Err(ChatError::Generation(e))
            }
        }
    }
}

/// Assistant summary appended after a successful generation
pub fn summarize(files: &[ProjectFile]) -> String {
    let names = files
        .iter()
        .map(|f| f.name.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    if names.is_empty() {
        format!("Generated {} file(s).", files.len())
    } else {
        format!("Generated {} file(s): {}", files.len(), names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::llm::{GenerationProvider, GenerationRequest, LlmError};
    use crate::project::{ChatRole, FileType};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Answers with a numbered index.html, or fails with a parse error
    struct ScriptedProvider {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl GenerationProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn generate(
            &self,
            _request: &GenerationRequest,
        ) -> Result<Vec<ProjectFile>, LlmError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail {
                return Err(LlmError::Parse("response has no \"files\" array".to_string()));
            }
            Ok(vec![ProjectFile::new(
                "index.html",
                FileType::Html,
                format!("<h1>v{n}</h1>"),
            )])
        }
    }

    fn service(fail: bool) -> (ChatService, String) {
        let mut store = ProjectStore::in_memory();
        let id = store.create("Landing").unwrap().id;
        let orchestrator = Orchestrator::new(&Config::default())
            .unwrap()
            .with_gemini_api_key(Some("test-key".to_string()))
            .with_provider(
                ProviderKind::Gemini,
                Arc::new(ScriptedProvider {
                    calls: AtomicUsize::new(0),
                    fail,
                }),
            );
        (
            ChatService::new(Arc::new(Mutex::new(store)), Arc::new(orchestrator)),
            id,
        )
    }

    #[tokio::test]
    async fn test_successful_turn() {
        let (chat, id) = service(false);
        let project = chat
            .send(&id, "build a landing page", ProviderKind::Gemini, Vec::new())
            .await
            .unwrap();

        assert_eq!(project.files.len(), 1);
        assert_eq!(project.messages.len(), 2);
        assert_eq!(project.messages[0].role, ChatRole::User);
        assert!(project.messages[1].content.contains("1 file(s)"));
        assert!(chat.store().lock().await.error().is_none());
    }

    #[tokio::test]
    async fn test_same_prompt_twice_supersedes_files() {
        let (chat, id) = service(false);
        chat.send(&id, "page", ProviderKind::Gemini, Vec::new())
            .await
            .unwrap();
        let project = chat
            .send(&id, "page", ProviderKind::Gemini, Vec::new())
            .await
            .unwrap();

        assert_eq!(project.messages.len(), 4);
        assert_eq!(project.files.len(), 1);
        assert_eq!(project.files[0].content, "<h1>v2</h1>");
    }

    #[tokio::test]
    async fn test_failed_turn_records_error() {
        let (chat, id) = service(true);
        let err = chat
            .send(&id, "page", ProviderKind::Gemini, Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Generation(_)));

        let store = chat.store().lock().await;
        let project = store.get(&id).unwrap();
        assert!(project.files.is_empty());
        assert_eq!(project.messages.len(), 2);
        assert_eq!(project.messages[0].content, "page");
        assert!(project.messages[1].is_error());
        assert!(store.error().unwrap().contains("files"));
    }

    #[tokio::test]
    async fn test_user_turn_keeps_attachment_descriptors() {
        let (chat, id) = service(false);
        let uploads = vec![Upload::new("notes.md", None, b"# Notes".to_vec())];
        let project = chat
            .send(&id, "use my notes", ProviderKind::Gemini, uploads)
            .await
            .unwrap();

        let attached = project.messages[0].attachments.as_ref().unwrap();
        assert_eq!(attached.len(), 1);
        assert_eq!(attached[0].name, "notes.md");
    }

    #[tokio::test]
    async fn test_capability_failure_still_commits_user_turn() {
        let (chat, id) = service(false);
        chat.store()
            .lock()
            .await
            .update_settings(crate::project::AiSettings {
                ollama_url: Some("http://127.0.0.1:9/api/generate".to_string()),
                ..Default::default()
            })
            .unwrap();

        let uploads = vec![Upload::new("shot.png", None, vec![0x89, 0x50])];
        let err = chat
            .send(&id, "match this", ProviderKind::Ollama, uploads)
            .await
            .unwrap_err();
        match err {
            ChatError::Generation(e) => assert!(e.source.is_capability()),
            other => panic!("unexpected error: {other}"),
        }

        let store = chat.store().lock().await;
        assert_eq!(store.get(&id).unwrap().messages.len(), 2);
    }

    #[tokio::test]
    async fn test_blank_prompt_is_refused() {
        let (chat, id) = service(false);
        let err = chat
            .send(&id, "  \n", ProviderKind::Gemini, Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::EmptyPrompt));

        let store = chat.store().lock().await;
        assert!(store.get(&id).unwrap().messages.is_empty());
        assert!(store.error().is_none());
    }

    #[tokio::test]
    async fn test_blank_prompt_with_upload_is_sent() {
        let (chat, id) = service(false);
        let uploads = vec![Upload::new("notes.md", None, b"# Notes".to_vec())];
        let project = chat
            .send(&id, "", ProviderKind::Gemini, uploads)
            .await
            .unwrap();
        assert_eq!(project.messages.len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_project() {
        let (chat, _) = service(false);
        let err = chat
            .send("missing", "page", ProviderKind::Gemini, Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Store(StoreError::NotFound(_))));
    }

    #[test]
    fn test_summarize() {
        let files = vec![
            ProjectFile::new("index.html", FileType::Html, ""),
            ProjectFile::new("app.js", FileType::Javascript, ""),
        ];
        assert_eq!(summarize(&files), "Generated 2 file(s): index.html, app.js");
        assert_eq!(summarize(&[]), "Generated 0 file(s).");
    }
}
