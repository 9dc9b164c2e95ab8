//! In-memory cache tier.
//!
//! A plain map with lazy TTL expiry on reads and capacity-triggered
//! eviction on writes. Eviction removes the oldest entries by insertion
//! time. Not internally synchronized; the facade wraps it in a mutex.

use std::collections::HashMap;
use std::time::{Duration, SystemTime};

use crate::llm::ChatResponse;

struct MemoryEntry {
    response: ChatResponse,
    inserted_at: SystemTime,
    access_count: u64,
}

pub(crate) struct MemoryTier {
    entries: HashMap<u64, MemoryEntry>,
    max_entries: usize,
    ttl: Duration,
}

impl MemoryTier {
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            max_entries: max_entries.max(1),
            ttl,
        }
    }

    /// Look up a fresh entry; expired entries are dropped on the spot.
    pub fn get(&mut self, hash: u64, now: SystemTime) -> Option<ChatResponse> {
        let expired = match self.entries.get(&hash) {
            Some(entry) => now
                .duration_since(entry.inserted_at)
                .map(|age| age > self.ttl)
                .unwrap_or(false),
            None => return None,
        };
        if expired {
            self.entries.remove(&hash);
            return None;
        }
        self.entries.get_mut(&hash).map(|entry| {
            entry.access_count += 1;
            entry.response.clone()
        })
    }

    /// Insert an owned copy of the response, evicting the oldest entries
    /// first when at capacity.
    pub fn insert(&mut self, hash: u64, response: ChatResponse, now: SystemTime) {
        while self.entries.len() >= self.max_entries && !self.entries.contains_key(&hash) {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|(_, e)| e.inserted_at)
                .map(|(k, _)| *k);
            match oldest {
                Some(key) => {
                    self.entries.remove(&key);
                }
                None => break,
            }
        }
        self.entries.insert(
            hash,
            MemoryEntry {
                response,
                inserted_at: now,
                access_count: 0,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    fn access_count(&self, hash: u64) -> Option<u64> {
        self.entries.get(&hash).map(|e| e.access_count)
    }
}
