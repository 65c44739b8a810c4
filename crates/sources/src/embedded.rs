//! The embedded atom set: immutable for the life of the process.

use async_trait::async_trait;
use promptc_core::atom::{Atom, AtomOrigin, AtomRecord, RecordError};
use promptc_core::call::CallContext;
use promptc_core::source::{AtomSource, SourceBatch};
use std::sync::Arc;

/// Atoms shipped with the process. Cheap to clone; never changes.
#[derive(Clone, Default)]
pub struct EmbeddedSource {
    atoms: Arc<[Atom]>,
}

impl EmbeddedSource {
    /// Wrap atoms, forcing their origin to `Embedded`.
    pub fn new(atoms: Vec<Atom>) -> Self {
        let atoms: Vec<Atom> = atoms
            .into_iter()
            .map(|mut a| {
                a.origin = AtomOrigin::Embedded;
                a
            })
            .collect();
        Self {
            atoms: atoms.into(),
        }
    }

    /// Build from raw records. Unlike external stores, an invalid embedded
    /// record is a startup error rather than a skipped entry.
    pub fn try_from_records(records: Vec<AtomRecord>) -> Result<Self, RecordError> {
        let atoms = records
            .into_iter()
            .map(|r| r.into_atom(AtomOrigin::Embedded))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(atoms))
    }

    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }

    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }
}

#[async_trait]
impl AtomSource for EmbeddedSource {
    fn label(&self) -> String {
        "embedded".into()
    }

    async fn fetch(&self, _call: &CallContext) -> SourceBatch {
        SourceBatch::new(self.atoms.to_vec())
    }
}
