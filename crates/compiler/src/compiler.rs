//! Orchestrates one compilation end to end and owns the
//! shared state: registered stores, the state version, and the cache.
//!
//! ```text
//! Validate → CacheLookup → Aggregate → Select → Resolve → Fit → Assemble → CacheStore
//! ```
//!
//! # Concurrency
//!
//! Every `compile` call runs independently. The store table sits behind a
//! `tokio::sync::RwLock`: a compilation holds the read lock from the cache
//! lookup through aggregation, and `register_store` / `unregister_store`
//! take the write lock, so a store is never swapped while a reader is
//! still fetching from it. The version counter is only bumped under that
//! write lock, so the version read under the read lock always matches the
//! stores being read.

use crate::assembler::assemble;
use crate::cache::{CacheKey, CompilationCache};
use crate::fitter::fit;
use crate::resolver::resolve;
use crate::selector::{AtomSelector, SelectorConfig};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use promptc_config::{PromptcConfig, TimeoutConfig};
use promptc_core::atom::Atom;
use promptc_core::call::CallContext;
use promptc_core::context::CompilationContext;
use promptc_core::error::{Error, Result, StoreError};
use promptc_core::inference::InferenceEngine;
use promptc_core::result::{CompilationResult, StateVersion, Warning};
use promptc_core::similarity::SimilaritySearch;
use promptc_core::source::{AtomSource, AtomStore};
use promptc_sources::{EmbeddedSource, InferenceSource, StoreSource};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info};

/// Public view of one registered store.
#[derive(Debug, Clone, Serialize)]
pub struct StoreInfo {
    pub name: String,
    pub kind: String,
    /// State version produced by this store's registration
    pub version: StateVersion,
    pub registered_at: DateTime<Utc>,
}

struct RegisteredStore {
    store: Arc<dyn AtomStore>,
    info: StoreInfo,
}

pub struct Compiler {
    embedded: EmbeddedSource,
    inference: Option<InferenceSource>,
    selector: AtomSelector,
    stores: RwLock<BTreeMap<String, RegisteredStore>>,
    version: AtomicU64,
    cache: CompilationCache,
    timeouts: TimeoutConfig,
    max_atom_chars: usize,
}

impl Compiler {
    /// Create a compiler over the embedded atom set with no external
    /// collaborators and no registered stores.
    pub fn new(config: &PromptcConfig, embedded: EmbeddedSource) -> Self {
        let selector = AtomSelector::new(SelectorConfig {
            always_include: config.compiler.always_include.iter().copied().collect(),
            similarity_top_k: config.compiler.similarity_top_k,
            similarity_min_score: config.compiler.similarity_min_score,
            inference_timeout: config.timeouts.inference(),
            similarity_timeout: config.timeouts.similarity(),
        });
        Self {
            embedded,
            inference: None,
            selector,
            stores: RwLock::new(BTreeMap::new()),
            version: AtomicU64::new(StateVersion::INITIAL.0),
            cache: CompilationCache::new(config.compiler.cache_capacity),
            timeouts: config.timeouts.clone(),
            max_atom_chars: config.compiler.max_atom_chars,
        }
    }

    /// Use `engine` both for relevance queries and as a source of
    /// injected atoms.
    pub fn with_inference_engine(mut self, engine: Arc<dyn InferenceEngine>) -> Self {
        self.selector = self.selector.with_engine(engine.clone());
        self.inference = Some(
            InferenceSource::new(engine, self.timeouts.inference())
                .with_lock(self.selector.engine_lock()),
        );
        self
    }

    pub fn with_similarity(mut self, similarity: Arc<dyn SimilaritySearch>) -> Self {
        self.selector = self.selector.with_similarity(similarity);
        self
    }

    pub fn state_version(&self) -> StateVersion {
        StateVersion(self.version.load(Ordering::SeqCst))
    }

    // ── Store registration ──

    /// Register `store` under `name`, replacing any store already there.
    ///
    /// Waits for in-flight aggregations to finish, swaps the handle, and
    /// bumps the state version. Returns the new version.
    pub async fn register_store(
        &self,
        name: impl Into<String>,
        store: Arc<dyn AtomStore>,
    ) -> Result<StateVersion> {
        let name = name.into();
        if name.trim().is_empty() || name.trim() != name {
            return Err(StoreError::InvalidName(name).into());
        }

        let mut stores = self.stores.write().await;
        let version = self.bump_version();
        let info = StoreInfo {
            name: name.clone(),
            kind: store.kind().to_string(),
            version,
            registered_at: Utc::now(),
        };
        let replaced = stores.insert(name.clone(), RegisteredStore { store, info }).is_some();
        drop(stores);

        let purged = self.cache.purge_stale(version).await;
        info!(store = %name, replaced, version = %version, purged, "Store registered");
        Ok(version)
    }

    /// Remove the store registered under `name` and bump the state version.
    pub async fn unregister_store(&self, name: &str) -> Result<StateVersion> {
        let mut stores = self.stores.write().await;
        if stores.remove(name).is_none() {
            return Err(StoreError::NotRegistered(name.to_string()).into());
        }
        let version = self.bump_version();
        drop(stores);

        let purged = self.cache.purge_stale(version).await;
        info!(store = %name, version = %version, purged, "Store unregistered");
        Ok(version)
    }

    /// Registered stores in name order.
    pub async fn stores(&self) -> Vec<StoreInfo> {
        self.stores
            .read()
            .await
            .values()
            .map(|s| s.info.clone())
            .collect()
    }

    pub async fn cache_len(&self) -> usize {
        self.cache.len().await
    }

    pub async fn clear_cache(&self) {
        self.cache.clear().await;
    }

    /// Must be called with the store write lock held.
    fn bump_version(&self) -> StateVersion {
        StateVersion(self.version.fetch_add(1, Ordering::SeqCst)).next()
    }

    // ── Compilation ──

    /// Compile a prompt for `cc`.
    ///
    /// Source, engine and similarity failures degrade into warnings on the
    /// result. Errors are structural only: an invalid context, duplicate
    /// atom IDs across sources, an unresolvable graph, or cancellation
    /// before an external call.
    pub async fn compile(
        &self,
        call: &CallContext,
        cc: &CompilationContext,
    ) -> Result<CompilationResult> {
        cc.validate()?;
        let call = call
            .clone()
            .with_deadline(Instant::now() + self.timeouts.compile());
        let context_hash = cc.hash();

        let stores = self.stores.read().await;
        let version = self.state_version();
        let key = CacheKey::new(context_hash, version);

        if let Some(hit) = self.cache.get(&key).await {
            debug!(context = %context_hash.short(), version = %version, "Cache hit");
            return Ok(hit);
        }
        debug!(context = %context_hash.short(), version = %version, "Cache miss");

        call.check("aggregation")?;
        let aggregated = self.aggregate(&call, &stores).await;
        drop(stores);
        let (pool, mut warnings) = aggregated?;

        let selection = self.selector.select(&call, &pool, cc).await?;
        warnings.extend(selection.warnings);

        let resolution = resolve(&pool, &selection.mandatory, &selection.optional)?;
        warnings.extend(resolution.warnings);

        let fitted = fit(&resolution.atoms, cc.budget, self.max_atom_chars);
        let result = assemble(&fitted, warnings, context_hash, version);

        if result.is_transient() {
            debug!(context = %context_hash.short(), "Degraded result not cached");
        } else if self.state_version() == version {
            self.cache.put(key, result.clone()).await;
        }

        info!(
            context = %context_hash.short(),
            version = %version,
            atoms = result.included_atoms.len(),
            tokens = result.total_tokens,
            budget = cc.budget,
            warnings = result.warnings.len(),
            "Compiled prompt"
        );
        Ok(result)
    }

    /// Fetch every source concurrently and merge in source order:
    /// embedded, registered stores by name, then injected atoms.
    async fn aggregate(
        &self,
        call: &CallContext,
        stores: &BTreeMap<String, RegisteredStore>,
    ) -> Result<(Vec<Atom>, Vec<Warning>)> {
        let mut sources: Vec<Box<dyn AtomSource>> = vec![Box::new(self.embedded.clone())];
        for (name, registered) in stores {
            sources.push(Box::new(StoreSource::new(
                name.clone(),
                registered.store.clone(),
                self.timeouts.store(),
            )));
        }
        if let Some(inference) = &self.inference {
            sources.push(Box::new(inference.clone()));
        }

        let batches = join_all(sources.iter().map(|s| s.fetch(call))).await;

        let mut seen: HashMap<String, String> = HashMap::new();
        let mut pool = Vec::new();
        let mut warnings = Vec::new();
        for (source, batch) in sources.iter().zip(batches) {
            let label = source.label();
            debug!(source = %label, atoms = batch.atoms.len(), warnings = batch.warnings.len(), "Source fetched");
            for atom in batch.atoms {
                if let Some(first) = seen.get(&atom.id) {
                    return Err(Error::DuplicateAtom {
                        id: atom.id,
                        first: first.clone(),
                        second: label,
                    });
                }
                seen.insert(atom.id.clone(), label.clone());
                pool.push(atom);
            }
            warnings.extend(batch.warnings);
        }
        Ok((pool, warnings))
    }
}
