//! Adapter from a registered [`AtomStore`] to the [`AtomSource`] contract.
//!
//! The adapter owns the failure policy for external stores: a store that
//! errors or misses its deadline contributes no atoms and one warning; a
//! store that returns some bad records contributes the good ones.

use async_trait::async_trait;
use promptc_core::atom::{AtomOrigin, AtomRecord};
use promptc_core::call::CallContext;
use promptc_core::result::{Warning, WarningKind};
use promptc_core::source::{AtomSource, AtomStore, SourceBatch};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Validate raw records into a batch, skipping bad ones with warnings.
pub fn records_into_batch(records: Vec<AtomRecord>, origin: &AtomOrigin) -> SourceBatch {
    let mut batch = SourceBatch::default();
    for record in records {
        match record.into_atom(origin.clone()) {
            Ok(atom) => batch.atoms.push(atom),
            Err(e) => batch.warn(Warning::new(
                WarningKind::MalformedRecord,
                format!("{origin}: skipped {e}"),
            )),
        }
    }
    batch
}

/// Reads one named store under a per-store deadline.
pub struct StoreSource {
    name: String,
    store: Arc<dyn AtomStore>,
    timeout: Duration,
}

impl StoreSource {
    pub fn new(name: impl Into<String>, store: Arc<dyn AtomStore>, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            store,
            timeout,
        }
    }
}

#[async_trait]
impl AtomSource for StoreSource {
    fn label(&self) -> String {
        format!("store:{}", self.name)
    }

    async fn fetch(&self, call: &CallContext) -> SourceBatch {
        let origin = AtomOrigin::Store(self.name.clone());
        let deadline = call.sub_deadline(self.timeout);
        let started = Instant::now();

        let loaded = tokio::select! {
            biased;
            _ = call.cancel_token().cancelled() => {
                return SourceBatch::failed(Warning::new(
                    WarningKind::SourceFailure,
                    format!("{origin}: read cancelled"),
                ));
            }
            res = tokio::time::timeout_at(deadline, self.store.load(deadline)) => res,
        };

        let contents = match loaded {
            Ok(Ok(contents)) => contents,
            Ok(Err(e)) => {
                warn!(store = %self.name, error = %e, "Store read failed");
                return SourceBatch::failed(Warning::new(
                    WarningKind::SourceFailure,
                    format!("{origin}: {e}"),
                ));
            }
            Err(_) => {
                let elapsed = started.elapsed().as_millis();
                warn!(store = %self.name, elapsed_ms = elapsed as u64, "Store read timed out");
                return SourceBatch::failed(Warning::new(
                    WarningKind::SourceFailure,
                    format!("{origin}: timed out after {elapsed}ms"),
                ));
            }
        };

        let skipped = contents.skipped;
        let mut batch = records_into_batch(contents.records, &origin);
        for reason in skipped {
            batch.warn(Warning::new(
                WarningKind::MalformedRecord,
                format!("{origin}: skipped {reason}"),
            ));
        }
        debug!(
            store = %self.name,
            kind = self.store.kind(),
            atoms = batch.atoms.len(),
            warnings = batch.warnings.len(),
            "Store fetched"
        );
        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::in_memory::InMemoryStore;
    use promptc_core::error::StoreError;
    use promptc_core::source::StoreContents;

    struct BrokenStore;

    #[async_trait]
    impl AtomStore for BrokenStore {
        fn kind(&self) -> &str {
            "broken"
        }
        async fn load(&self, _deadline: Instant) -> Result<StoreContents, StoreError> {
            Err(StoreError::Unavailable("broken".into(), "connection refused".into()))
        }
    }

    struct SlowStore;

    #[async_trait]
    impl AtomStore for SlowStore {
        fn kind(&self) -> &str {
            "slow"
        }
        async fn load(&self, _deadline: Instant) -> Result<StoreContents, StoreError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(StoreContents::default())
        }
    }

    fn record(id: &str, category: &str) -> AtomRecord {
        AtomRecord {
            id: id.into(),
            category: category.into(),
            content: format!("content of {id}"),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn good_records_survive_bad_ones() {
        let store = InMemoryStore::with_records(vec![
            record("a", "knowledge"),
            record("b", "nonsense"),
            record("c", "tool"),
        ]);
        let source = StoreSource::new("team", Arc::new(store), Duration::from_secs(1));
        let batch = source.fetch(&CallContext::background()).await;

        let ids: Vec<_> = batch.atoms.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert_eq!(batch.atoms[0].origin, AtomOrigin::Store("team".into()));
        assert_eq!(batch.warnings.len(), 1);
        assert_eq!(batch.warnings[0].kind, WarningKind::MalformedRecord);
        assert!(batch.warnings[0].message.contains("store:team"));
    }

    #[tokio::test]
    async fn failing_store_degrades_to_warning() {
        let source = StoreSource::new("ext", Arc::new(BrokenStore), Duration::from_secs(1));
        let batch = source.fetch(&CallContext::background()).await;
        assert!(batch.atoms.is_empty());
        assert_eq!(batch.warnings[0].kind, WarningKind::SourceFailure);
        assert!(batch.warnings[0].message.contains("connection refused"));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_store_times_out() {
        let source = StoreSource::new("slow", Arc::new(SlowStore), Duration::from_millis(100));
        let batch = source.fetch(&CallContext::background()).await;
        assert!(batch.atoms.is_empty());
        assert!(batch.warnings[0].message.contains("timed out"));
    }

    #[tokio::test]
    async fn cancelled_call_does_not_wait() {
        let call = CallContext::background();
        call.cancel_token().cancel();
        let source = StoreSource::new("slow", Arc::new(SlowStore), Duration::from_secs(60));
        let batch = source.fetch(&call).await;
        assert!(batch.warnings[0].message.contains("cancelled"));
    }
}
