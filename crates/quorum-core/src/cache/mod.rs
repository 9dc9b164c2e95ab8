//! Two-tier response cache.
//!
//! A fast in-memory tier backed by an optional durable SQLite tier, keyed
//! by a content hash of the request inputs (model, sampling parameters,
//! ordered transcript). The orchestrator consults the cache before
//! dispatching a chat request and populates it after a successful call.
//!
//! The tiers are updated together on `put` but are not transactionally
//! linked; the durable tier trailing the memory tier after a crash is
//! acceptable, since it exists only to warm cold starts.
//!
//! Degradation policy: a missing or erroring durable tier is a cache miss,
//! never a request failure. A fully disabled cache is represented by the
//! orchestrator simply not holding one.

pub(crate) mod key;
mod memory;
mod store;

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};

use tracing::{debug, warn};

use crate::llm::{ChatRequest, ChatResponse};

use memory::MemoryTier;
pub use store::CacheError;
use store::SqliteStore;

/// Two-tier content-addressed response cache.
pub struct ResponseCache {
    memory: Mutex<MemoryTier>,
    store: Option<SqliteStore>,
    ttl: Duration,
    max_entries: usize,
}

impl ResponseCache {
    /// Memory-only cache.
    pub fn in_memory(max_entries: usize, ttl: Duration) -> Self {
        Self {
            memory: Mutex::new(MemoryTier::new(max_entries, ttl)),
            store: None,
            ttl,
            max_entries,
        }
    }

    /// Cache with a durable SQLite tier at the given path.
    pub fn with_store(
        path: &Path,
        max_entries: usize,
        ttl: Duration,
    ) -> Result<Self, CacheError> {
        Ok(Self {
            memory: Mutex::new(MemoryTier::new(max_entries, ttl)),
            store: Some(SqliteStore::open(path)?),
            ttl,
            max_entries,
        })
    }

    /// Build a cache from config. Returns `None` when caching is disabled —
    /// callers treat that as an always-miss no-op, not an error.
    pub fn from_config(config: &quorum_config::CacheConfig) -> Result<Option<Self>, CacheError> {
        if !config.enabled {
            return Ok(None);
        }
        let ttl = Duration::from_secs(config.ttl_seconds);
        let cache = match config.db_path {
            Some(ref path) => Self::with_store(Path::new(path), config.max_entries, ttl)?,
            None => Self::in_memory(config.max_entries, ttl),
        };
        Ok(Some(cache))
    }

    fn memory(&self) -> MutexGuard<'_, MemoryTier> {
        self.memory.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Look up a cached response for the request, consulting the memory
    /// tier first and falling back to the durable tier (promoting hits).
    pub fn get(&self, request: &ChatRequest) -> Option<ChatResponse> {
        let hash = key::input_hash(request);
        let now = SystemTime::now();

        if let Some(response) = self.memory().get(hash, now) {
            debug!(hash, "memory cache hit");
            return Some(response);
        }

        let store = self.store.as_ref()?;
        match store.get(hash, self.ttl) {
            Ok(Some(response)) => {
                debug!(hash, "durable cache hit, promoting to memory");
                self.memory().insert(hash, response.clone(), now);
                Some(response)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(hash, error = %e, "durable cache read failed, treating as miss");
                None
            }
        }
    }

    /// Store an owned copy of the response in both tiers.
    pub fn put(&self, request: &ChatRequest, response: &ChatResponse) {
        let hash = key::input_hash(request);
        self.memory()
            .insert(hash, response.clone(), SystemTime::now());

        if let Some(ref store) = self.store {
            if let Err(e) = store.put(hash, request, response, self.max_entries) {
                warn!(hash, error = %e, "durable cache write failed");
            }
        }
    }

    /// Number of entries currently in the memory tier.
    pub fn memory_len(&self) -> usize {
        self.memory().len()
    }

    /// Number of entries currently in the durable tier, if one is attached.
    pub fn store_len(&self) -> Option<usize> {
        self.store.as_ref().and_then(|s| s.len().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ChatMessage, ProviderKind, TokenUsage};

    fn request(prompt: &str) -> ChatRequest {
        ChatRequest {
            model: "gpt-4o".to_string(),
            messages: vec![ChatMessage::user(prompt)],
            ..Default::default()
        }
    }

    fn response(content: &str) -> ChatResponse {
        ChatResponse {
            content: content.to_string(),
            model: "gpt-4o".to_string(),
            provider: Some(ProviderKind::OpenAi),
            usage: TokenUsage::default(),
        }
    }

    #[test]
    fn test_round_trip_in_memory() {
        let cache = ResponseCache::in_memory(16, Duration::from_secs(60));
        let req = request("hello");
        cache.put(&req, &response("hi"));

        let hit = cache.get(&req).unwrap();
        assert_eq!(hit, response("hi"));
    }

    #[test]
    fn test_different_request_misses() {
        let cache = ResponseCache::in_memory(16, Duration::from_secs(60));
        cache.put(&request("hello"), &response("hi"));
        assert!(cache.get(&request("goodbye")).is_none());
    }

    #[test]
    fn test_durable_tier_warms_memory() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("cache.db");
        let req = request("persistent");

        {
            let cache =
                ResponseCache::with_store(&path, 16, Duration::from_secs(60)).unwrap();
            cache.put(&req, &response("still here"));
        }

        // Fresh cache over the same file: memory is cold, store is warm
        let cache = ResponseCache::with_store(&path, 16, Duration::from_secs(60)).unwrap();
        assert_eq!(cache.memory_len(), 0);

        let hit = cache.get(&req).unwrap();
        assert_eq!(hit.content, "still here");
        // Promoted into the memory tier
        assert_eq!(cache.memory_len(), 1);
    }

    #[test]
    fn test_from_config_disabled_is_none() {
        let config = quorum_config::CacheConfig {
            enabled: false,
            ..Default::default()
        };
        assert!(ResponseCache::from_config(&config).unwrap().is_none());
    }

    #[test]
    fn test_from_config_memory_only() {
        let config = quorum_config::CacheConfig {
            enabled: true,
            ttl_seconds: 60,
            max_entries: 4,
            db_path: None,
        };
        let cache = ResponseCache::from_config(&config).unwrap().unwrap();
        assert!(cache.store_len().is_none());
    }
}
