//! Configuration builders for tests.
//!
//! Use [`TestConfigBuilder`] to create customised [`AppConfig`] values without
//! repeating boilerplate across crate boundaries.

use quorum_config::{AppConfig, ProviderEntry, ProviderKind};

/// Fluent builder for [`AppConfig`] in tests.
///
/// # Example
///
/// ```ignore
/// let config = TestConfigBuilder::new()
///     .max_concurrent(2)
///     .cache_ttl_seconds(1)
///     .build();
/// ```
pub struct TestConfigBuilder {
    config: AppConfig,
}

impl TestConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
        }
    }

    pub fn max_concurrent(mut self, n: usize) -> Self {
        self.config.orchestrator.max_concurrent = n;
        self
    }

    pub fn cleanup_threshold_secs(mut self, secs: u64) -> Self {
        self.config.orchestrator.cleanup_threshold_secs = secs;
        self
    }

    pub fn dedicated_executor(mut self, worker_threads: usize) -> Self {
        self.config.orchestrator.executor = "dedicated".to_string();
        self.config.orchestrator.worker_threads = worker_threads;
        self
    }

    pub fn cache_enabled(mut self, enabled: bool) -> Self {
        self.config.cache.enabled = enabled;
        self
    }

    pub fn cache_ttl_seconds(mut self, secs: u64) -> Self {
        self.config.cache.ttl_seconds = secs;
        self
    }

    pub fn cache_max_entries(mut self, n: usize) -> Self {
        self.config.cache.max_entries = n;
        self
    }

    pub fn cache_db_path(mut self, path: &str) -> Self {
        self.config.cache.db_path = Some(path.to_string());
        self
    }

    pub fn log_level(mut self, level: &str) -> Self {
        self.config.logging.level = level.to_string();
        self
    }

    /// Add a provider entry with an inline test key.
    pub fn provider(mut self, kind: ProviderKind) -> Self {
        self.config.providers.push(ProviderEntry {
            kind,
            api_key: "test-key".to_string(),
            api_key_env: None,
            model: String::new(),
            base_url: None,
            priority: 5,
            enabled: true,
        });
        self
    }

    pub fn build(self) -> AppConfig {
        self.config
    }
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
