//! # promptc compiler
//!
//! The compilation pipeline: select atoms for a context, resolve their
//! dependencies, fit them into a token budget, and render the prompt.
//!
//! | Stage | Module | Fails on |
//! |-------|--------|----------|
//! | Aggregate | [`compiler`] | duplicate IDs, cancellation |
//! | Select | [`selector`] | cancellation |
//! | Resolve | [`resolver`] | unresolvable graph |
//! | Fit | [`fitter`] | never |
//! | Assemble | [`assembler`] | never |
//!
//! Everything else degrades into warnings on the result.

pub mod assembler;
pub mod cache;
pub mod compiler;
pub mod fitter;
pub mod resolver;
pub mod selector;
pub mod token;

pub use cache::{CacheKey, CompilationCache};
pub use compiler::{Compiler, StoreInfo};
pub use fitter::{Fitted, FittedAtom};
pub use resolver::{Resolution, ResolvedAtom};
pub use selector::{AtomSelector, FactScope, RELEVANCE_PREDICATE, Selection, SelectorConfig};
