//! In-memory atom store: useful for tests and programmatic corpora.

use async_trait::async_trait;
use promptc_core::atom::{AtomRecord, normalize_atom_id};
use promptc_core::error::StoreError;
use promptc_core::source::{AtomStore, StoreContents};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// A mutable store that keeps its records in a Vec.
///
/// Records are keyed by normalized ID; `upsert` replaces an existing record
/// with the same ID. Cloning shares the underlying records.
#[derive(Clone)]
pub struct InMemoryStore {
    records: Arc<RwLock<Vec<AtomRecord>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Create a store pre-populated with `records`.
    pub fn with_records(records: Vec<AtomRecord>) -> Self {
        Self {
            records: Arc::new(RwLock::new(records)),
        }
    }

    /// Insert or replace a record. Returns true if a record was replaced.
    pub async fn upsert(&self, record: AtomRecord) -> bool {
        let mut records = self.records.write().await;
        let id = normalize_atom_id(&record.id).to_string();
        match records
            .iter_mut()
            .find(|r| normalize_atom_id(&r.id) == id)
        {
            Some(existing) => {
                *existing = record;
                true
            }
            None => {
                records.push(record);
                false
            }
        }
    }

    /// Remove a record by ID. Returns true if something was removed.
    pub async fn remove(&self, id: &str) -> bool {
        let id = normalize_atom_id(id);
        let mut records = self.records.write().await;
        let len_before = records.len();
        records.retain(|r| normalize_atom_id(&r.id) != id);
        records.len() < len_before
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    pub async fn clear(&self) {
        self.records.write().await.clear();
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AtomStore for InMemoryStore {
    fn kind(&self) -> &str {
        "memory"
    }

    async fn load(&self, _deadline: Instant) -> Result<StoreContents, StoreError> {
        Ok(StoreContents::new(self.records.read().await.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, content: &str) -> AtomRecord {
        AtomRecord {
            id: id.into(),
            category: "knowledge".into(),
            content: content.into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn upsert_replaces_by_normalized_id() {
        let store = InMemoryStore::new();
        assert!(!store.upsert(record("/rust", "v1")).await);
        assert!(store.upsert(record("rust", "v2")).await);
        assert_eq!(store.len().await, 1);

        let loaded = store.load(Instant::now()).await.unwrap();
        assert_eq!(loaded.records[0].content, "v2");
    }

    #[tokio::test]
    async fn remove_record() {
        let store = InMemoryStore::with_records(vec![record("a", "x"), record("b", "y")]);
        assert!(store.remove("/a").await);
        assert!(!store.remove("a").await);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn clones_share_records() {
        let store = InMemoryStore::new();
        let handle = store.clone();
        handle.upsert(record("a", "x")).await;
        assert!(!store.is_empty().await);
        store.clear().await;
        assert!(handle.is_empty().await);
    }
}
