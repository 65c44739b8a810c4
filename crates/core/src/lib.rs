//! # promptc core
//!
//! Domain types, traits, and error definitions for the prompt compiler.
//! This crate defines the model that every other crate implements against:
//! atoms and where they come from, the compilation context and result, and
//! the narrow contracts of the external collaborators (inference engine,
//! similarity search, atom stores).
//!
//! ## Design Philosophy
//!
//! Every collaborator is a trait here. Implementations live in
//! `promptc-sources` or in the embedding application, which keeps the
//! selection and resolution logic origin-agnostic and lets tests swap in
//! scripted collaborators.

pub mod atom;
pub mod call;
pub mod context;
pub mod error;
pub mod inference;
pub mod result;
pub mod similarity;
pub mod source;

// Re-export key types at crate root for ergonomics
pub use atom::{Atom, AtomCategory, AtomOrigin, AtomRecord, RecordError, normalize_atom_id};
pub use call::CallContext;
pub use context::{CompilationContext, ContextHash, Intent};
pub use error::{Error, FactValueError, InferenceError, Result, SimilarityError, StoreError};
pub use inference::{Fact, FactValue, InferenceEngine};
pub use result::{CompilationResult, StateVersion, Warning, WarningKind};
pub use similarity::{ScoredId, SimilaritySearch};
pub use source::{AtomSource, AtomStore, SourceBatch, StoreContents};
