//! Persistence backends for the project store
//!
//! A backend holds two independent JSON values under stable keys. Writes
//! replace the whole value. Backends that can observe writes made by other
//! processes hand out a [`StateSubscription`].

use anyhow::{Context, Result};
use notify_debouncer_mini::notify::{RecursiveMode, Watcher};
use notify_debouncer_mini::{new_debouncer, DebounceEventResult};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::mpsc;

/// Quiet period before a burst of file events is reported as one change
pub const EXTERNAL_CHANGE_DEBOUNCE: Duration = Duration::from_millis(200);

/// Persisted value identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateKey {
    Projects,
    Settings,
}

impl StateKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            StateKey::Projects => "webforge.projects",
            StateKey::Settings => "webforge.ai_settings",
        }
    }
}

impl StateKey {
    pub const ALL: [StateKey; 2] = [StateKey::Projects, StateKey::Settings];

    /// Key persisted in a `<key>.json` file of the given name
    pub fn from_file_name(name: &str) -> Option<Self> {
        let stem = name.strip_suffix(".json")?;
        Self::ALL.into_iter().find(|key| key.as_str() == stem)
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read/write access to persisted state
pub trait StateBackend: Send + Sync {
    /// Raw JSON stored under `key`, if any
    fn read(&self, key: StateKey) -> Result<Option<String>>;

    /// Replace the value stored under `key`
    fn write(&self, key: StateKey, value: &str) -> Result<()>;

    /// Start observing changes made outside this process
    ///
    /// Returns `None` when the backend has no way to see them.
    fn subscribe(&self) -> Result<Option<StateSubscription>> {
        Ok(None)
    }
}

impl<T: StateBackend + ?Sized> StateBackend for Arc<T> {
    fn read(&self, key: StateKey) -> Result<Option<String>> {
        (**self).read(key)
    }

    fn write(&self, key: StateKey, value: &str) -> Result<()> {
        (**self).write(key, value)
    }

    fn subscribe(&self) -> Result<Option<StateSubscription>> {
        (**self).subscribe()
    }
}

/// Stream of keys whose persisted value changed
///
/// Dropping the subscription stops the underlying watcher.
pub struct StateSubscription {
    rx: mpsc::UnboundedReceiver<StateKey>,
    _watcher: Box<dyn Send>,
}

impl StateSubscription {
    /// Next changed key; `None` once the watcher has shut down
    pub async fn recv(&mut self) -> Option<StateKey> {
        self.rx.recv().await
    }
}

impl fmt::Debug for StateSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateSubscription").finish_non_exhaustive()
    }
}

/// One `<key>.json` file per value in a data directory
#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    root: PathBuf,
}

impl JsonFileBackend {
    /// Open (and create) the data directory
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create data directory {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, key: StateKey) -> PathBuf {
        self.root.join(format!("{}.json", key.as_str()))
    }
}

impl StateBackend for JsonFileBackend {
    fn read(&self, key: StateKey) -> Result<Option<String>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Ok(Some(content))
    }

    fn write(&self, key: StateKey, value: &str) -> Result<()> {
        let path = self.path_for(key);
        // Write to a sibling temp file first so readers never see a partial value
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, value)
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &path)
            .with_context(|| format!("Failed to replace {}", path.display()))?;
        Ok(())
    }

    fn subscribe(&self) -> Result<Option<StateSubscription>> {
        let (tx, rx) = mpsc::unbounded_channel();

        let mut debouncer = new_debouncer(
            EXTERNAL_CHANGE_DEBOUNCE,
            move |res: DebounceEventResult| match res {
                Ok(events) => {
                    let mut changed: Vec<StateKey> = Vec::new();
                    for event in events {
                        let key = event
                            .path
                            .file_name()
                            .and_then(|name| name.to_str())
                            .and_then(StateKey::from_file_name);
                        if let Some(key) = key {
                            if !changed.contains(&key) {
                                changed.push(key);
                            }
                        }
                    }
                    for key in changed {
                        // Receiver gone means the subscription was dropped
                        let _ = tx.send(key);
                    }
                }
                Err(e) => tracing::warn!("Data directory watch error: {}", e),
            },
        )
        .context("Failed to create data directory watcher")?;

        debouncer
            .watcher()
            .watch(&self.root, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch {}", self.root.display()))?;
        tracing::debug!("Watching {} for external changes", self.root.display());

        Ok(Some(StateSubscription {
            rx,
            _watcher: Box::new(debouncer),
        }))
    }
}

/// Process-local backend; clones share the same values
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    values: Arc<RwLock<HashMap<StateKey, String>>>,
}

impl StateBackend for MemoryBackend {
    fn read(&self, key: StateKey) -> Result<Option<String>> {
        let values = self
            .values
            .read()
            .map_err(|_| anyhow::anyhow!("memory backend lock poisoned"))?;
        Ok(values.get(&key).cloned())
    }

    fn write(&self, key: StateKey, value: &str) -> Result<()> {
        let mut values = self
            .values
            .write()
            .map_err(|_| anyhow::anyhow!("memory backend lock poisoned"))?;
        values.insert(key, value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_backend_roundtrip() {
        let temp = TempDir::new().unwrap();
        let backend = JsonFileBackend::new(temp.path().join("data")).unwrap();

        assert!(backend.read(StateKey::Projects).unwrap().is_none());
        backend.write(StateKey::Projects, "[]").unwrap();
        assert_eq!(backend.read(StateKey::Projects).unwrap().as_deref(), Some("[]"));
        assert!(backend.path_for(StateKey::Projects).exists());
        assert!(!backend
            .path_for(StateKey::Projects)
            .with_extension("json.tmp")
            .exists());
    }

    #[test]
    fn test_keys_are_independent() {
        let temp = TempDir::new().unwrap();
        let backend = JsonFileBackend::new(temp.path()).unwrap();
        backend.write(StateKey::Settings, "{}").unwrap();
        assert!(backend.read(StateKey::Projects).unwrap().is_none());
        assert_eq!(
            backend.path_for(StateKey::Settings).file_name().unwrap(),
            "webforge.ai_settings.json"
        );
    }

    #[test]
    fn test_key_from_file_name() {
        assert_eq!(
            StateKey::from_file_name("webforge.projects.json"),
            Some(StateKey::Projects)
        );
        assert_eq!(
            StateKey::from_file_name("webforge.ai_settings.json"),
            Some(StateKey::Settings)
        );
        assert_eq!(StateKey::from_file_name("webforge.projects.json.tmp"), None);
        assert_eq!(StateKey::from_file_name("notes.json"), None);
    }

    #[tokio::test]
    async fn test_file_backend_reports_outside_writes() {
        let temp = TempDir::new().unwrap();
        let backend = JsonFileBackend::new(temp.path()).unwrap();
        let mut subscription = backend.subscribe().unwrap().unwrap();

        std::fs::write(backend.path_for(StateKey::Settings), "{}").unwrap();

        let key = tokio::time::timeout(Duration::from_secs(10), subscription.recv())
            .await
            .unwrap();
        assert_eq!(key, Some(StateKey::Settings));
    }

    #[test]
    fn test_memory_backend_has_no_subscription() {
        assert!(MemoryBackend::default().subscribe().unwrap().is_none());
    }

    #[test]
    fn test_memory_backend_clones_share_state() {
        let a = MemoryBackend::default();
        let b = a.clone();
        a.write(StateKey::Settings, "{\"ollama_url\":null}").unwrap();
        assert!(b.read(StateKey::Settings).unwrap().is_some());
    }
}
