//! Atom sources and reference collaborators for promptc.
//!
//! - [`EmbeddedSource`]: the immutable atom set shipped with the process
//! - [`StoreSource`]: adapter over a registered [`AtomStore`](promptc_core::AtomStore)
//! - [`InferenceSource`]: atoms injected by the inference engine
//! - [`InMemoryStore`], [`FileStore`]: store backends
//! - [`FactStore`]: an in-process inference engine
//! - [`SimilarityIndex`]: an in-process similarity backend

pub mod embedded;
pub mod facts;
pub mod file_store;
pub mod in_memory;
pub mod inference;
pub mod store;
pub mod vector;

pub use embedded::EmbeddedSource;
pub use facts::{FactFile, FactStore, Rule};
pub use file_store::{FileStore, read_atom_file};
pub use in_memory::InMemoryStore;
pub use inference::{INJECT_PREDICATE, InferenceSource};
pub use store::{StoreSource, records_into_batch};
pub use vector::SimilarityIndex;
