//! Durable SQLite cache tier.
//!
//! A cold-start optimization, not a correctness requirement: reads that
//! miss the memory tier fall through to this table, and successful puts
//! land here as well. All statements are parameterized; response content
//! never touches SQL text.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info};

use crate::llm::{ChatRequest, ChatResponse, TokenUsage};

/// Errors from the durable cache tier.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache storage error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Seconds since the epoch, saturating at zero on a misconfigured clock.
fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

pub(crate) struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the cache database at the given path.
    pub fn open(path: &Path) -> Result<Self, CacheError> {
        let conn = Connection::open(path)?;
        let store = Self::bootstrap(conn)?;
        info!(path = %path.display(), "opened response cache store");
        Ok(store)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, CacheError> {
        Self::bootstrap(Connection::open_in_memory()?)
    }

    fn bootstrap(conn: Connection) -> Result<Self, CacheError> {
        // WAL improves concurrency for mixed readers and writers
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS response_cache (
                input_hash        INTEGER NOT NULL UNIQUE,
                model             TEXT NOT NULL,
                input_text        TEXT NOT NULL,
                response_content  TEXT NOT NULL,
                response_model    TEXT NOT NULL,
                prompt_tokens     INTEGER NOT NULL,
                completion_tokens INTEGER NOT NULL,
                total_tokens      INTEGER NOT NULL,
                timestamp         INTEGER NOT NULL,
                access_count      INTEGER NOT NULL DEFAULT 0,
                last_access       INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_response_cache_hash
                ON response_cache (input_hash);
            CREATE INDEX IF NOT EXISTS idx_response_cache_model
                ON response_cache (model);
            CREATE INDEX IF NOT EXISTS idx_response_cache_time
                ON response_cache (timestamp);
            CREATE INDEX IF NOT EXISTS idx_response_cache_access
                ON response_cache (access_count);",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Look up a cached response, honouring the TTL. Expired rows are
    /// deleted on the spot; fresh hits bump the access counters.
    ///
    /// The reconstructed response carries no provider identity — the table
    /// does not persist which backend served it.
    pub fn get(&self, hash: u64, ttl: Duration) -> Result<Option<ChatResponse>, CacheError> {
        let conn = self.lock();
        let row = conn
            .query_row(
                "SELECT response_content, response_model,
                        prompt_tokens, completion_tokens, total_tokens, timestamp
                 FROM response_cache WHERE input_hash = ?1",
                params![hash as i64],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, i64>(4)?,
                        row.get::<_, i64>(5)?,
                    ))
                },
            )
            .optional()?;

        let Some((content, model, prompt, completion, total, timestamp)) = row else {
            return Ok(None);
        };

        let now = now_secs();
        if now.saturating_sub(timestamp) > ttl.as_secs() as i64 {
            debug!(hash, "durable cache entry expired");
            conn.execute(
                "DELETE FROM response_cache WHERE input_hash = ?1",
                params![hash as i64],
            )?;
            return Ok(None);
        }

        conn.execute(
            "UPDATE response_cache
             SET access_count = access_count + 1, last_access = ?2
             WHERE input_hash = ?1",
            params![hash as i64, now],
        )?;

        Ok(Some(ChatResponse {
            content,
            model,
            provider: None,
            usage: TokenUsage {
                prompt_tokens: prompt as u32,
                completion_tokens: completion as u32,
                total_tokens: total as u32,
            },
        }))
    }

    /// Insert or refresh a cache row, then enforce the capacity bound by
    /// deleting the oldest rows.
    pub fn put(
        &self,
        hash: u64,
        request: &ChatRequest,
        response: &ChatResponse,
        max_entries: usize,
    ) -> Result<(), CacheError> {
        // Structured transcript for debugging and audit, not for lookup
        let input_text = serde_json::to_string(&request.messages).unwrap_or_default();
        let now = now_secs();

        let conn = self.lock();
        conn.execute(
            "INSERT OR REPLACE INTO response_cache
                (input_hash, model, input_text, response_content, response_model,
                 prompt_tokens, completion_tokens, total_tokens,
                 timestamp, access_count, last_access)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0, ?9)",
            params![
                hash as i64,
                request.model,
                input_text,
                response.content,
                response.model,
                i64::from(response.usage.prompt_tokens),
                i64::from(response.usage.completion_tokens),
                i64::from(response.usage.total_tokens),
                now,
            ],
        )?;

        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM response_cache", [], |row| row.get(0))?;
        let excess = count - max_entries as i64;
        if excess > 0 {
            conn.execute(
                "DELETE FROM response_cache WHERE input_hash IN (
                     SELECT input_hash FROM response_cache
                     ORDER BY timestamp ASC LIMIT ?1
                 )",
                params![excess],
            )?;
            debug!(evicted = excess, "durable cache evicted oldest entries");
        }

        Ok(())
    }

    /// Number of rows currently stored.
    pub fn len(&self) -> Result<usize, CacheError> {
        let count: i64 =
            self.lock()
                .query_row("SELECT COUNT(*) FROM response_cache", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::key::input_hash;
    use crate::llm::{ChatMessage, ProviderKind};

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
            usage: TokenUsage {
                prompt_tokens: 7,
                completion_tokens: 5,
                total_tokens: 12,
            },
        }
    }

    const TTL: Duration = Duration::from_secs(3600);

    #[test]
    fn test_round_trip_preserves_content_and_usage() {
        let store = SqliteStore::open_in_memory().unwrap();
        let req = request("hello");
        let hash = input_hash(&req);
        store.put(hash, &req, &response("hi there"), 100).unwrap();

        let hit = store.get(hash, TTL).unwrap().unwrap();
        assert_eq!(hit.content, "hi there");
        assert_eq!(hit.model, "gpt-4o");
        assert_eq!(hit.usage.total_tokens, 12);
        // Provider identity is not persisted
        assert_eq!(hit.provider, None);
    }

    #[test]
    fn test_miss_on_unknown_hash() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(store.get(12345, TTL).unwrap().is_none());
    }

    #[test]
    fn test_zero_ttl_expires_immediately() {
        let store = SqliteStore::open_in_memory().unwrap();
        let req = request("hello");
        let hash = input_hash(&req);
        store.put(hash, &req, &response("hi"), 100).unwrap();

        std::thread::sleep(Duration::from_millis(1100));
        assert!(store.get(hash, Duration::ZERO).unwrap().is_none());
        // The expired row was deleted
        assert_eq!(store.len().unwrap(), 0);
    }

    #[test]
    fn test_replace_same_hash_keeps_one_row() {
        let store = SqliteStore::open_in_memory().unwrap();
        let req = request("hello");
        let hash = input_hash(&req);
        store.put(hash, &req, &response("first"), 100).unwrap();
        store.put(hash, &req, &response("second"), 100).unwrap();

        assert_eq!(store.len().unwrap(), 1);
        let hit = store.get(hash, TTL).unwrap().unwrap();
        assert_eq!(hit.content, "second");
    }

    #[test]
    fn test_capacity_enforced_on_put() {
        let store = SqliteStore::open_in_memory().unwrap();
        for i in 0..6 {
            let req = request(&format!("prompt {i}"));
            store
                .put(input_hash(&req), &req, &response("r"), 4)
                .unwrap();
        }
        assert!(store.len().unwrap() <= 4);
    }

    #[test]
    fn test_persistence_across_reopen() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("cache.db");
        let req = request("persistent");
        let hash = input_hash(&req);

        {
            let store = SqliteStore::open(&path).unwrap();
            store.put(hash, &req, &response("still here"), 100).unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        let hit = store.get(hash, TTL).unwrap().unwrap();
        assert_eq!(hit.content, "still here");
    }
}
