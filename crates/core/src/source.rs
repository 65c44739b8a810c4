//! Atom sources: the uniform view over every place atoms come from.
//!
//! Two traits live here:
//!
//! - [`AtomStore`] is what an operator registers: a named, independently
//!   mutable store that hands back raw records.
//! - [`AtomSource`] is what the compiler aggregates over: something that
//!   yields validated atoms plus warnings and never fails outright.

use async_trait::async_trait;
use tokio::time::Instant;

use crate::atom::{Atom, AtomRecord};
use crate::call::CallContext;
use crate::error::StoreError;
use crate::result::Warning;

/// Atoms produced by one source for one compilation, plus anything that
/// went wrong while producing them.
#[derive(Debug, Clone, Default)]
pub struct SourceBatch {
    pub atoms: Vec<Atom>,
    pub warnings: Vec<Warning>,
}

impl SourceBatch {
    pub fn new(atoms: Vec<Atom>) -> Self {
        Self {
            atoms,
            warnings: Vec::new(),
        }
    }

    /// An empty batch carrying a single warning.
    pub fn failed(warning: Warning) -> Self {
        Self {
            atoms: Vec::new(),
            warnings: vec![warning],
        }
    }

    pub fn warn(&mut self, warning: Warning) {
        self.warnings.push(warning);
    }
}

/// A producer of candidate atoms.
///
/// `fetch` must return within the call's deadline and must degrade to a
/// partial batch with warnings instead of failing.
#[async_trait]
pub trait AtomSource: Send + Sync {
    /// Human-readable label used in warnings and logs.
    fn label(&self) -> String;

    async fn fetch(&self, call: &CallContext) -> SourceBatch;
}

/// Raw records read from a store, plus entries it had to skip.
#[derive(Debug, Clone, Default)]
pub struct StoreContents {
    pub records: Vec<AtomRecord>,
    /// One message per unreadable entry (e.g. a corrupt JSON line)
    pub skipped: Vec<String>,
}

impl StoreContents {
    pub fn new(records: Vec<AtomRecord>) -> Self {
        Self {
            records,
            skipped: Vec::new(),
        }
    }
}

/// A named, externally registered, independently mutable atom store.
#[async_trait]
pub trait AtomStore: Send + Sync {
    /// The store kind (e.g. "memory", "file").
    fn kind(&self) -> &str;

    /// Read the current records. Must give up at `deadline`.
    async fn load(&self, deadline: Instant) -> Result<StoreContents, StoreError>;
}
