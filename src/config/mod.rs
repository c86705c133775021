//! Configuration management for webforge

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::llm::{GEMINI_API_BASE, HISTORY_WINDOW};

/// Environment variable overriding the data directory
pub const DATA_DIR_ENV: &str = "WEBFORGE_DATA_DIR";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub llm: LlmConfig,
    pub generation: GenerationConfig,
    pub storage: StorageConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub default_provider: String,
    /// Whole-request timeout for backend calls
    pub request_timeout_secs: u64,
    pub gemini: GeminiConfig,
    pub ollama: OllamaConfig,
    pub lm_studio: LmStudioConfig,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            default_provider: "gemini".to_string(),
            request_timeout_secs: 120,
            gemini: GeminiConfig::default(),
            ollama: OllamaConfig::default(),
            lm_studio: LmStudioConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    pub model: String,
    pub base_url: String,
    /// Name of the environment variable holding the API key
    pub api_key_env: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-flash".to_string(),
            base_url: GEMINI_API_BASE.to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    pub model: String,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            model: crate::llm::DEFAULT_OLLAMA_MODEL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LmStudioConfig {
    pub model: String,
    pub max_tokens: usize,
}

impl Default for LmStudioConfig {
    fn default() -> Self {
        Self {
            model: crate::llm::DEFAULT_LM_STUDIO_MODEL.to_string(),
            max_tokens: 8192,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Most recent chat messages forwarded to a backend
    pub history_window: usize,
    pub max_text_attachment_bytes: usize,
    pub max_image_attachment_bytes: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            history_window: HISTORY_WINDOW,
            max_text_attachment_bytes: crate::llm::MAX_TEXT_ATTACHMENT_BYTES,
            max_image_attachment_bytes: crate::llm::MAX_IMAGE_ATTACHMENT_BYTES,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StorageConfig {
    /// Where projects and settings are persisted (default: platform data dir)
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8787,
        }
    }
}

impl Config {
    /// Load configuration from default location or create default
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            Ok(Config::default())
        }
    }

    /// Load configuration from an explicit file
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "webforge") {
            let config_dir = proj_dirs.config_dir();
            std::fs::create_dir_all(config_dir)?;
            Ok(config_dir.join("config.toml"))
        } else {
            Ok(PathBuf::from("config.toml"))
        }
    }

    /// Directory holding persisted projects and settings
    ///
    /// `WEBFORGE_DATA_DIR` wins over the config file, which wins over the
    /// platform default.
    pub fn data_dir(&self) -> PathBuf {
        if let Some(dir) = std::env::var_os(DATA_DIR_ENV).filter(|v| !v.is_empty()) {
            return PathBuf::from(dir);
        }
        if let Some(dir) = &self.storage.data_dir {
            return dir.clone();
        }
        directories::ProjectDirs::from("", "", "webforge")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from(".webforge"))
    }

    /// Gemini API key from the configured environment variable
    pub fn gemini_api_key(&self) -> Option<String> {
        std::env::var(&self.llm.gemini.api_key_env)
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
    }
}
