//! Compilation cache keyed by context identity *and* store generation.
//!
//! The key type bundles both fields, so a lookup by context hash alone
//! cannot be expressed. Entries are kept in insertion order; when a
//! capacity is set, the oldest entry is evicted first.

use indexmap::IndexMap;
use promptc_core::context::ContextHash;
use promptc_core::result::{CompilationResult, StateVersion};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Cache key: which context, compiled against which store generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    context: ContextHash,
    version: StateVersion,
}

impl CacheKey {
    pub fn new(context: ContextHash, version: StateVersion) -> Self {
        Self { context, version }
    }

    pub fn context(&self) -> ContextHash {
        self.context
    }

    pub fn version(&self) -> StateVersion {
        self.version
    }
}

pub struct CompilationCache {
    entries: RwLock<IndexMap<CacheKey, Arc<CompilationResult>>>,
    /// 0 = unbounded
    capacity: usize,
}

impl CompilationCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(IndexMap::new()),
            capacity,
        }
    }

    pub async fn get(&self, key: &CacheKey) -> Option<CompilationResult> {
        self.entries
            .read()
            .await
            .get(key)
            .map(|r| CompilationResult::clone(r))
    }

    /// Store a result. A concurrent put for the same key simply replaces
    /// the earlier value.
    pub async fn put(&self, key: CacheKey, result: CompilationResult) {
        let mut entries = self.entries.write().await;
        entries.insert(key, Arc::new(result));
        if self.capacity > 0 {
            while entries.len() > self.capacity {
                entries.shift_remove_index(0);
            }
        }
    }

    /// Drop every entry compiled against a generation older than `current`.
    pub async fn purge_stale(&self, current: StateVersion) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| key.version >= current);
        let purged = before - entries.len();
        if purged > 0 {
            debug!(purged, version = %current, "Purged stale cache entries");
        }
        purged
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}
