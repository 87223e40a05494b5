//! TOML configuration
//!
//! Every section and key is optional; missing values fall back to defaults and
//! unknown keys are ignored. CLI flags override the input/output directories.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ai::TRUNCATION_MARKER;
use crate::scanner::{DEFAULT_EXCLUDE_PATTERNS, DEFAULT_EXTENSIONS};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    NotFound(PathBuf),
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("{0} is not set (CLI option or config file)")]
    Missing(&'static str),
    #[error("environment variable {0} is not set")]
    MissingApiKey(String),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    pub directory: String,
    /// 0 means no limit
    pub max_files: usize,
    pub exclude_patterns: Vec<String>,
    pub extensions: Vec<String>,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            directory: String::new(),
            max_files: 0,
            exclude_patterns: DEFAULT_EXCLUDE_PATTERNS.iter().map(|s| s.to_string()).collect(),
            extensions: DEFAULT_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub directory: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriageConfig {
    pub confidence_threshold: f64,
    /// Input budget for the model, counted in characters
    pub max_input_tokens: usize,
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.7,
            max_input_tokens: 8000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// 0 disables the limiter
    pub requests_per_minute: u32,
    pub max_retries: u32,
    pub retry_delay_sec: u64,
    pub request_timeout_sec: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 30,
            max_retries: 3,
            retry_delay_sec: 5,
            request_timeout_sec: 120,
        }
    }
}

impl RateLimitConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_sec)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_sec)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// "api" or "cli"
    pub mode: String,
    pub provider: String,
    pub model: String,
    pub api_key_env: String,
    pub base_url: Option<String>,
    pub rate_limit: RateLimitConfig,
}

const OLLAMA_BASE_URL: &str = "http://localhost:11434/v1";

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            mode: "api".to_string(),
            provider: "openai".to_string(),
            model: "gpt-4o".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            base_url: None,
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl LlmConfig {
    pub fn is_cli(&self) -> bool {
        self.mode.eq_ignore_ascii_case("cli")
    }

    /// Local providers run without credentials
    pub fn needs_api_key(&self) -> bool {
        !self.is_cli() && !self.is_ollama()
    }

    fn is_ollama(&self) -> bool {
        self.provider.eq_ignore_ascii_case("ollama")
    }

    /// Configured endpoint, or the local Ollama server for `provider = "ollama"`
    pub fn effective_base_url(&self) -> Option<String> {
        match &self.base_url {
            Some(url) => Some(url.clone()),
            None if self.is_ollama() => Some(OLLAMA_BASE_URL.to_string()),
            None => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "./triage.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextExtractionConfig {
    pub min_text_length: usize,
    pub llm_summary_enabled: bool,
    /// Empty disables the debug dump
    pub debug_dir: String,
}

impl Default for TextExtractionConfig {
    fn default() -> Self {
        Self {
            min_text_length: 100,
            llm_summary_enabled: false,
            debug_dir: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Empty disables file logging
    pub file: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            file: "./doc-triager.log".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub input: InputConfig,
    pub output: OutputConfig,
    pub triage: TriageConfig,
    pub llm: LlmConfig,
    pub database: DatabaseConfig,
    pub text_extraction: TextExtractionConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config: Config = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Range checks that serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        let threshold = self.triage.confidence_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ConfigError::Invalid(format!(
                "triage.confidence_threshold must be within [0, 1], got {}",
                threshold
            )));
        }
        let marker_len = TRUNCATION_MARKER.chars().count();
        if self.triage.max_input_tokens <= marker_len {
            return Err(ConfigError::Invalid(format!(
                "triage.max_input_tokens must be greater than {} (the truncation marker length), got {}",
                marker_len, self.triage.max_input_tokens
            )));
        }
        if !matches!(self.llm.mode.to_lowercase().as_str(), "api" | "cli") {
            return Err(ConfigError::Invalid(format!(
                "llm.mode must be \"api\" or \"cli\", got {:?}",
                self.llm.mode
            )));
        }
        Ok(())
    }

    /// Apply CLI overrides and require both directories
    pub fn resolve(mut self, source: Option<&str>, output: Option<&str>) -> Result<Self, ConfigError> {
        if let Some(source) = source {
            self.input.directory = source.to_string();
        }
        if let Some(output) = output {
            self.output.directory = output.to_string();
        }

        if self.input.directory.is_empty() {
            return Err(ConfigError::Missing("input directory (--source or [input] directory)"));
        }
        if self.output.directory.is_empty() {
            return Err(ConfigError::Missing("output directory (--output or [output] directory)"));
        }

        Ok(self)
    }

    /// Resolve the API key: a `.env` file wins over the process environment.
    ///
    /// Returns `Ok(None)` for transports that need no key.
    pub fn resolve_api_key(&self, env_file: Option<&Path>) -> Result<Option<String>, ConfigError> {
        if !self.llm.needs_api_key() {
            return Ok(None);
        }

        let name = &self.llm.api_key_env;

        if let Some(path) = env_file.filter(|p| p.exists()) {
            if let Ok(iter) = dotenvy::from_path_iter(path) {
                for item in iter.flatten() {
                    if &item.0 == name && !item.1.is_empty() {
                        return Ok(Some(item.1));
                    }
                }
            }
        }

        match std::env::var(name) {
            Ok(key) if !key.is_empty() => Ok(Some(key)),
            _ => Err(ConfigError::MissingApiKey(name.clone())),
        }
    }

    pub fn database_path(&self) -> PathBuf {
        PathBuf::from(&self.database.path)
    }

    pub fn debug_dir(&self) -> Option<PathBuf> {
        Some(&self.text_extraction.debug_dir)
            .filter(|d| !d.is_empty())
            .map(PathBuf::from)
    }

    pub fn log_file(&self) -> Option<PathBuf> {
        Some(&self.logging.file)
            .filter(|f| !f.is_empty())
            .map(PathBuf::from)
    }
}
