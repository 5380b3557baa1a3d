//! Compiler configuration
//!
//! Loaded from TOML; every field has a default so a partial (or absent)
//! file is fine. Secrets are normally supplied through the environment.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::extraction::MISSING_SENTINEL;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    pub compiler: CompileSettings,
    pub retrieval: RetrievalConfig,
    pub rerank: RerankConfig,
    pub llm: LlmConfig,
}

/// Settings for the assembler itself
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileSettings {
    /// Value the extractor uses to say "not found"
    pub missing_sentinel: String,
}

impl Default for CompileSettings {
    fn default() -> Self {
        Self {
            missing_sentinel: MISSING_SENTINEL.to_string(),
        }
    }
}

/// Candidate recall and rerank sizing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Candidates recalled in the first stage
    pub vector_k: usize,
    /// Results requested from the reranker (never fewer than the caller asks for)
    pub final_k: usize,
    pub enable_reranking: bool,
    /// Matches below this relevance are treated as not found
    pub min_relevance: Option<f64>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            vector_k: 10,
            final_k: 3,
            enable_reranking: true,
            min_relevance: None,
        }
    }
}

/// Rerank service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankConfig {
    pub model: String,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub timeout_seconds: u64,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            model: "gte-rerank-v2".to_string(),
            base_url: None,
            api_key: None,
            timeout_seconds: 30,
        }
    }
}

/// OpenAI-compatible chat completion settings for value extraction
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub model: String,
    pub base_url: String,
    pub api_key: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub timeout_seconds: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "qwen-plus-latest".to_string(),
            base_url: "https://dashscope.aliyuncs.com/compatible-mode/v1".to_string(),
            api_key: None,
            temperature: Some(0.0),
            max_tokens: None,
            timeout_seconds: 30,
        }
    }
}

impl CompilerConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Overlay values from the process environment.
    pub fn apply_env(self) -> Self {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Overlay values from an arbitrary lookup (the environment in production).
    pub fn apply_env_with(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let first = |keys: &[&str]| keys.iter().find_map(|k| lookup(k).filter(|v| !v.is_empty()));

        if let Some(key) = first(&["BLUEPRINT_LLM_API_KEY", "OPENAI_API_KEY", "DASHSCOPE_API_KEY"]) {
            self.llm.api_key = Some(key);
        }
        if let Some(url) = first(&["BLUEPRINT_LLM_BASE_URL"]) {
            self.llm.base_url = url;
        }
        if let Some(model) = first(&["BLUEPRINT_LLM_MODEL"]) {
            self.llm.model = model;
        }
        if let Some(key) = first(&["BLUEPRINT_RERANK_API_KEY", "DASHSCOPE_API_KEY"]) {
            self.rerank.api_key = Some(key);
        }
        self
    }
}
