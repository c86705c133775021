//! Project state store
//!
//! Holds the project list, the AI settings, the active selection and the
//! error banner. Every mutation replaces a whole [`Project`] (or the whole
//! settings object) and is written through to a [`StateBackend`].
//!
//! Layout of the file backend:
//!
//! <data_dir>/
//! ├── webforge.projects.json      # Vec<Project>
//! └── webforge.ai_settings.json   # AiSettings

mod backend;

pub use backend::{
    JsonFileBackend, MemoryBackend, StateBackend, StateKey, StateSubscription,
    EXTERNAL_CHANGE_DEBOUNCE,
};

use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::project::{AiSettings, Project};

/// Store operation errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Project not found: {0}")]
    NotFound(String),

    #[error("Ambiguous project id '{prefix}' matches {count} projects")]
    Ambiguous { prefix: String, count: usize },

    #[error("Corrupt persisted value '{key}': {source}")]
    Corrupt {
        key: StateKey,
        #[source]
        source: serde_json::Error,
    },

    #[error("Storage error: {0}")]
    Backend(#[from] anyhow::Error),
}

/// In-memory state backed by a persistent snapshot
pub struct ProjectStore {
    backend: Box<dyn StateBackend>,
    projects: Vec<Project>,
    settings: AiSettings,
    active: Option<String>,
    error: Option<String>,
}

impl std::fmt::Debug for ProjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectStore")
            .field("projects", &self.projects.len())
            .field("active", &self.active)
            .finish()
    }
}

impl ProjectStore {
    /// Load both persisted values; missing keys start empty
    pub fn load(backend: Box<dyn StateBackend>) -> Result<Self, StoreError> {
        let projects = read_value(backend.as_ref(), StateKey::Projects)?.unwrap_or_default();
        let settings = read_value(backend.as_ref(), StateKey::Settings)?.unwrap_or_default();

        let store = Self {
            backend,
            projects,
            settings,
            active: None,
            error: None,
        };
        tracing::debug!("Loaded {} project(s)", store.projects.len());
        Ok(store)
    }

    /// Store over a fresh in-memory backend
    pub fn in_memory() -> Self {
        Self {
            backend: Box::new(MemoryBackend::default()),
            projects: Vec::new(),
            settings: AiSettings::default(),
            active: None,
            error: None,
        }
    }

    // ========== Projects ==========

    pub fn projects(&self) -> &[Project] {
        &self.projects
    }

    pub fn get(&self, id: &str) -> Option<&Project> {
        self.projects.iter().find(|p| p.id == id)
    }

    /// Find a project by full id or unique id prefix
    pub fn resolve(&self, id_or_prefix: &str) -> Result<&Project, StoreError> {
        let needle = id_or_prefix.trim();
        if let Some(project) = self.get(needle) {
            return Ok(project);
        }
        let matches: Vec<&Project> = if needle.is_empty() {
            Vec::new()
        } else {
            self.projects
                .iter()
                .filter(|p| p.id.starts_with(needle))
                .collect()
        };
        match matches.as_slice() {
            [project] => Ok(project),
            [] => Err(StoreError::NotFound(needle.to_string())),
            many => Err(StoreError::Ambiguous {
                prefix: needle.to_string(),
                count: many.len(),
            }),
        }
    }

    fn require(&self, id: &str) -> Result<Project, StoreError> {
        self.get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    /// Create an empty project and persist it
    pub fn create(&mut self, name: &str) -> Result<Project, StoreError> {
        let project = Project::new(name);
        let mut projects = self.projects.clone();
        projects.push(project.clone());
        self.commit_projects(projects)?;
        tracing::info!("Created project {} ({})", project.name, project.id);
        Ok(project)
    }

    /// Replace a project by id with the given object
    pub fn update(&mut self, project: Project) -> Result<(), StoreError> {
        let mut projects = self.projects.clone();
        let slot = projects
            .iter_mut()
            .find(|p| p.id == project.id)
            .ok_or_else(|| StoreError::NotFound(project.id.clone()))?;
        *slot = project;
        self.commit_projects(projects)
    }

    /// Archive or unarchive a project
    ///
    /// Archiving the active project deselects it. Unarchiving leaves the
    /// selection untouched.
    pub fn set_archived(&mut self, id: &str, archived: bool) -> Result<(), StoreError> {
        let mut project = self.require(id)?;
        project.archived = archived;
        project.touch();
        self.update(project)?;

        if archived && self.active.as_deref() == Some(id) {
            tracing::debug!("Archived the active project, returning to dashboard");
            self.active = None;
        }
        Ok(())
    }

    /// Rename a project; blank names are ignored and return `false`
    pub fn rename(&mut self, id: &str, name: &str) -> Result<bool, StoreError> {
        let name = name.trim();
        let mut project = self.require(id)?;
        if name.is_empty() {
            return Ok(false);
        }
        project.name = name.to_string();
        project.touch();
        self.update(project)?;
        Ok(true)
    }

    /// Delete a project once `confirm` agrees; there is no undo
    ///
    /// Returns `false` when the confirmation step declined.
    pub fn delete<F>(&mut self, id: &str, confirm: F) -> Result<bool, StoreError>
    where
        F: FnOnce(&Project) -> bool,
    {
        let project = self.require(id)?;
        if !confirm(&project) {
            return Ok(false);
        }

        let projects = self
            .projects
            .iter()
            .filter(|p| p.id != id)
            .cloned()
            .collect();
        self.commit_projects(projects)?;
        if self.active.as_deref() == Some(id) {
            self.active = None;
        }
        tracing::info!("Deleted project {} ({})", project.name, project.id);
        Ok(true)
    }

    // ========== Selection & banner ==========

    pub fn select(&mut self, id: &str) -> Result<(), StoreError> {
        self.require(id)?;
        self.active = Some(id.to_string());
        Ok(())
    }

    pub fn deselect(&mut self) {
        self.active = None;
    }

    pub fn active(&self) -> Option<&Project> {
        self.active.as_deref().and_then(|id| self.get(id))
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn set_error(&mut self, error: Option<String>) {
        self.error = error;
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    // ========== Settings ==========

    pub fn settings(&self) -> &AiSettings {
        &self.settings
    }

    pub fn update_settings(&mut self, settings: AiSettings) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(&settings).map_err(anyhow::Error::from)?;
        self.backend.write(StateKey::Settings, &json)?;
        self.settings = settings;
        Ok(())
    }

    // ========== Sync ==========

    /// Overwrite in-memory state with the latest persisted snapshot of `key`
    ///
    /// Called when another process or tab changed the persisted value.
    pub fn apply_external_change(&mut self, key: StateKey) -> Result<(), StoreError> {
        match key {
            StateKey::Projects => {
                self.projects =
                    read_value(self.backend.as_ref(), StateKey::Projects)?.unwrap_or_default();
                if let Some(id) = self.active.clone() {
                    if self.get(&id).is_none() {
                        self.active = None;
                    }
                }
            }
            StateKey::Settings => {
                self.settings =
                    read_value(self.backend.as_ref(), StateKey::Settings)?.unwrap_or_default();
            }
        }
        tracing::debug!("Reloaded {} from storage at {}", key, Utc::now());
        Ok(())
    }

    /// Watch the backend for changes made by other processes
    pub fn subscribe(&self) -> Result<Option<StateSubscription>, StoreError> {
        Ok(self.backend.subscribe()?)
    }

    /// Persist `projects`, then make them the in-memory list
    ///
    /// A failed write leaves the in-memory list untouched.
    fn commit_projects(&mut self, projects: Vec<Project>) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(&projects).map_err(anyhow::Error::from)?;
        self.backend.write(StateKey::Projects, &json)?;
        self.projects = projects;
        Ok(())
    }
}

/// Apply every change reported by `subscription` to the shared store
///
/// Runs until the subscription ends. Reload failures are logged and the
/// in-memory state is kept.
pub fn spawn_external_sync(
    store: Arc<Mutex<ProjectStore>>,
    mut subscription: StateSubscription,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(key) = subscription.recv().await {
            let mut store = store.lock().await;
            if let Err(e) = store.apply_external_change(key) {
                tracing::warn!("Failed to reload {}: {}", key, e);
            }
        }
        tracing::debug!("External change subscription closed");
    })
}

fn read_value<T: serde::de::DeserializeOwned>(
    backend: &dyn StateBackend,
    key: StateKey,
) -> Result<Option<T>, StoreError> {
    match backend.read(key)? {
        Some(raw) if !raw.trim().is_empty() => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| StoreError::Corrupt { key, source }),
        _ => Ok(None),
    }
}
