//! Bounded caches keyed by commit id.
//!
//! Content under a commit id never changes, so entries are never
//! invalidated. Eviction is purely capacity driven and only affects hit
//! rate. Both caches are safe to share between tasks.

use bytes::Bytes;
use gkv_types::ObjectId;
use quick_cache::sync::Cache;
use quick_cache::Weighter;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Cache capacity limits.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Upper bound on cached payloads.
    pub content_max_entries: usize,
    /// Upper bound on the summed size of cached payloads.
    pub content_max_total_bytes: u64,
    /// Payloads larger than this are never cached.
    pub content_max_entry_bytes: u64,
    /// Upper bound on cached commit messages.
    pub message_max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            content_max_entries: 1_000,
            content_max_total_bytes: 16 * 1024 * 1024,
            content_max_entry_bytes: 64 * 1024,
            message_max_entries: 10_000,
        }
    }
}

/// Weighs a payload by its length, but never below an even share of the
/// byte budget, so the entry count stays bounded as well.
#[derive(Clone, Copy, Debug)]
struct PayloadWeighter {
    min_weight: u64,
}

impl Weighter<ObjectId, Bytes> for PayloadWeighter {
    fn weight(&self, _key: &ObjectId, payload: &Bytes) -> u64 {
        (payload.len() as u64).max(self.min_weight)
    }
}

/// Commit id → payload bytes as fetched (before decryption).
pub struct ContentCache {
    inner: Cache<ObjectId, Bytes, PayloadWeighter>,
    max_entry_bytes: u64,
}

impl ContentCache {
    pub fn new(config: &CacheConfig) -> Self {
        let max_entries = config.content_max_entries.max(1);
        let min_weight = (config.content_max_total_bytes / max_entries as u64).max(1);
        Self {
            inner: Cache::with_weighter(
                max_entries,
                config.content_max_total_bytes.max(1),
                PayloadWeighter { min_weight },
            ),
            max_entry_bytes: config.content_max_entry_bytes,
        }
    }

    pub fn get(&self, commit: &ObjectId) -> Option<Bytes> {
        let hit = self.inner.get(commit);
        if hit.is_some() {
            debug!(commit = %commit.short_hex(), "content cache hit");
        }
        hit
    }

    /// Cache a payload unless it exceeds the per-entry ceiling.
    ///
    /// Returns whether the payload was admitted.
    pub fn insert(&self, commit: ObjectId, payload: Bytes) -> bool {
        if payload.len() as u64 > self.max_entry_bytes {
            return false;
        }
        self.inner.insert(commit, payload);
        true
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.len() == 0
    }

    /// Summed weight of the cached payloads.
    pub fn weight(&self) -> u64 {
        self.inner.weight()
    }
}

/// Commit id → commit message.
pub struct MessageCache {
    inner: Cache<ObjectId, String>,
}

impl MessageCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            inner: Cache::new(config.message_max_entries.max(1)),
        }
    }

    pub fn get(&self, commit: &ObjectId) -> Option<String> {
        self.inner.get(commit)
    }

    pub fn insert(&self, commit: ObjectId, message: String) {
        self.inner.insert(commit, message);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.len() == 0
    }
}
