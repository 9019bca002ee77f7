use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::{
    error::{KeyMomentsError, Result},
    provider::Provider,
};

pub const DEFAULT_WHISPER_MODEL: &str = "ggml-base.bin";

/// Contents of `config.toml`. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub ffmpeg: Option<PathBuf>,
    pub whisper: WhisperConfig,
    pub llm: LlmConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WhisperConfig {
    pub model: Option<String>,
    pub model_dir: Option<PathBuf>,
    pub language: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub max_tokens: u32,
    pub temperature: f32,
    /// Model override keyed by provider name (`anthropic`, `openai`, ...).
    pub models: HashMap<String, String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            max_tokens: 4096,
            temperature: 0.0,
            models: HashMap::new(),
        }
    }
}

impl Config {
    /// Load `explicit` if given (it must exist), otherwise the default
    /// location if present, otherwise defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => match default_config_path() {
                Some(path) if path.exists() => Self::from_file(&path),
                _ => Ok(Config::default()),
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| KeyMomentsError::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_toml(&content).map_err(|reason| KeyMomentsError::Config {
            path: path.to_path_buf(),
            reason,
        })
    }

    fn from_toml(content: &str) -> std::result::Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }

    pub fn ffmpeg_bin(&self) -> PathBuf {
        self.ffmpeg.clone().unwrap_or_else(|| PathBuf::from("ffmpeg"))
    }

    pub fn whisper_model(&self) -> &str {
        self.whisper.model.as_deref().unwrap_or(DEFAULT_WHISPER_MODEL)
    }

    pub fn whisper_model_dir(&self) -> PathBuf {
        self.whisper
            .model_dir
            .clone()
            .unwrap_or_else(|| get_model_dir(&get_root_cache_dir()))
    }

    pub fn model_for(&self, provider: &Provider) -> String {
        self.llm
            .models
            .get(provider.key())
            .cloned()
            .unwrap_or_else(|| provider.config().model.to_string())
    }
}

/// `<config_dir>/keymoments/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("keymoments").join("config.toml"))
}

pub fn get_root_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("keymoments")
}

pub fn get_model_dir(cache_dir: &Path) -> PathBuf {
    cache_dir.join("models")
}
