#![deny(unsafe_code)]

//! Configuration loading and validation for Quorum.
//!
//! Loads TOML configuration files and validates them against expected schemas.
//! Provides the [`AppConfig`] type as the central configuration structure:
//! provider credentials, orchestrator tuning, response-cache settings, and
//! logging.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

/// Which LLM backend a provider entry targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Anthropic Claude models via the Messages API.
    Anthropic,
    /// OpenAI GPT models via the Chat Completions API.
    OpenAi,
    /// A local GPU-accelerated inference service (OpenAI-compatible wire).
    Local,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::Anthropic => write!(f, "anthropic"),
            ProviderKind::OpenAi => write!(f, "openai"),
            ProviderKind::Local => write!(f, "local"),
        }
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "anthropic" => Ok(ProviderKind::Anthropic),
            "openai" => Ok(ProviderKind::OpenAi),
            "local" => Ok(ProviderKind::Local),
            other => Err(ConfigError::Validation(format!(
                "unknown provider kind: {other:?}"
            ))),
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Configured LLM providers, in declaration order.
    #[serde(default)]
    pub providers: Vec<ProviderEntry>,

    /// Orchestrator tuning.
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// Response cache settings.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// One configured LLM provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEntry {
    /// Which backend this entry targets.
    pub kind: ProviderKind,

    /// API key, inline. Prefer `api_key_env` outside of tests.
    #[serde(default)]
    pub api_key: String,

    /// Environment variable to read the API key from when `api_key` is empty.
    #[serde(default)]
    pub api_key_env: Option<String>,

    /// Default model for this provider (empty = adapter default).
    #[serde(default)]
    pub model: String,

    /// Base URL override (OpenAI-compatible endpoints, local services).
    #[serde(default)]
    pub base_url: Option<String>,

    /// Selection priority (higher = preferred by the health manager).
    #[serde(default = "default_provider_priority")]
    pub priority: u8,

    /// Whether this provider participates in dispatch.
    #[serde(default = "default_provider_enabled")]
    pub enabled: bool,
}

impl ProviderEntry {
    /// Resolve the API key: inline value first, then the configured
    /// environment variable. Empty when neither is set (local services
    /// typically need no key).
    pub fn resolve_api_key(&self) -> String {
        if !self.api_key.is_empty() {
            return self.api_key.clone();
        }
        self.api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .unwrap_or_default()
    }
}

fn default_provider_priority() -> u8 {
    5
}

fn default_provider_enabled() -> bool {
    true
}

/// Orchestrator tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Execution backend: "tokio" (ambient runtime) or "dedicated"
    /// (private worker-thread pool).
    #[serde(default = "default_executor")]
    pub executor: String,

    /// Worker threads for the dedicated executor.
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,

    /// Default concurrency bound for batch submission.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Seconds a terminal task may linger before `cleanup_completed_tasks`
    /// purges it.
    #[serde(default = "default_cleanup_threshold_secs")]
    pub cleanup_threshold_secs: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            executor: default_executor(),
            worker_threads: default_worker_threads(),
            max_concurrent: default_max_concurrent(),
            cleanup_threshold_secs: default_cleanup_threshold_secs(),
        }
    }
}

fn default_executor() -> String {
    "tokio".to_string()
}

fn default_worker_threads() -> usize {
    4
}

fn default_max_concurrent() -> usize {
    8
}

fn default_cleanup_threshold_secs() -> u64 {
    300
}

/// Response cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Whether response caching is enabled at all.
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,

    /// Seconds before a cached response expires.
    #[serde(default = "default_cache_ttl_seconds")]
    pub ttl_seconds: u64,

    /// Maximum number of entries kept per tier.
    #[serde(default = "default_cache_max_entries")]
    pub max_entries: usize,

    /// Path to the durable SQLite tier. Memory-only when absent.
    #[serde(default)]
    pub db_path: Option<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            ttl_seconds: default_cache_ttl_seconds(),
            max_entries: default_cache_max_entries(),
            db_path: None,
        }
    }
}

fn default_cache_enabled() -> bool {
    true
}

fn default_cache_ttl_seconds() -> u64 {
    3600
}

fn default_cache_max_entries() -> usize {
    512
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g. "info", "debug", "trace").
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from a TOML file at the given path using async I/O.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path).await?;
        let config: AppConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Validate orchestrator config
        let valid_executors = ["tokio", "dedicated"];
        if !valid_executors.contains(&self.orchestrator.executor.as_str()) {
            return Err(ConfigError::Validation(format!(
                "orchestrator.executor must be one of {:?}, got {:?}",
                valid_executors, self.orchestrator.executor
            )));
        }
        if self.orchestrator.executor == "dedicated" && self.orchestrator.worker_threads == 0 {
            return Err(ConfigError::Validation(
                "orchestrator.worker_threads must be at least 1 for the dedicated executor"
                    .to_string(),
            ));
        }
        if self.orchestrator.max_concurrent == 0 {
            return Err(ConfigError::Validation(
                "orchestrator.max_concurrent must be at least 1".to_string(),
            ));
        }

        // Validate cache config
        if self.cache.enabled {
            if self.cache.ttl_seconds == 0 {
                return Err(ConfigError::Validation(
                    "cache.ttl_seconds must be non-zero when the cache is enabled".to_string(),
                ));
            }
            if self.cache.max_entries == 0 {
                return Err(ConfigError::Validation(
                    "cache.max_entries must be at least 1 when the cache is enabled".to_string(),
                ));
            }
        }

        // Validate provider entries
        let mut seen = Vec::new();
        for (i, entry) in self.providers.iter().enumerate() {
            if seen.contains(&entry.kind) {
                return Err(ConfigError::Validation(format!(
                    "providers[{i}]: duplicate entry for kind \"{}\"",
                    entry.kind
                )));
            }
            seen.push(entry.kind);

            if let Some(ref url) = entry.base_url {
                if url.is_empty() {
                    return Err(ConfigError::Validation(format!(
                        "providers[{i}].base_url must not be empty when set"
                    )));
                }
            }
        }

        Ok(())
    }

    /// Provider entries that are enabled, in declaration order.
    pub fn enabled_providers(&self) -> impl Iterator<Item = &ProviderEntry> {
        self.providers.iter().filter(|p| p.enabled)
    }
}
