//! Error types for the prompt compiler.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each collaborator boundary has its own error type; only structural
//! failures ever reach the caller of `Compiler::compile`.

use thiserror::Error;

/// The top-level error type for all compiler operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Structural failures (caller-visible) ---
    #[error("Invalid compilation context: {0}")]
    InvalidContext(String),

    #[error("Duplicate atom id '{id}' from {first} and {second}")]
    DuplicateAtom {
        id: String,
        first: String,
        second: String,
    },

    #[error("Dependency resolution failed: {0}")]
    Resolution(String),

    #[error("Compilation cancelled before {stage}")]
    Cancelled { stage: String },

    // --- Store registration ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Build a cancellation error naming the stage that was not started.
    pub fn cancelled(stage: impl Into<String>) -> Self {
        Self::Cancelled {
            stage: stage.into(),
        }
    }

    /// Whether this error came from caller cancellation or an expired deadline.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Collaborator errors ---

/// Failures reading or registering an external atom store.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Store '{0}' is unavailable: {1}")]
    Unavailable(String, String),

    #[error("Store '{store}' timed out after {elapsed_ms}ms")]
    Timeout { store: String, elapsed_ms: u64 },

    #[error("Store '{store}' returned a malformed payload: {reason}")]
    Malformed { store: String, reason: String },

    #[error("Store not registered: {0}")]
    NotRegistered(String),

    #[error("Invalid store name: {0:?}")]
    InvalidName(String),
}

/// Failures talking to the external inference engine.
#[derive(Debug, Clone, Error)]
pub enum InferenceError {
    #[error("Assert failed: {0}")]
    AssertFailed(String),

    #[error("Query '{predicate}' failed: {reason}")]
    QueryFailed { predicate: String, reason: String },

    #[error("Retract of '{tag}' failed: {reason}")]
    RetractFailed { tag: String, reason: String },

    #[error("Inference engine timed out: {0}")]
    Timeout(String),
}

/// Failures talking to the similarity-search backend.
#[derive(Debug, Clone, Error)]
pub enum SimilarityError {
    #[error("Similarity search failed: {0}")]
    SearchFailed(String),

    #[error("Similarity search exceeded its deadline")]
    DeadlineExceeded,
}

/// A fact argument that could not be narrowed to an atom identifier.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FactValueError {
    #[error("unrecognized fact argument of type {0}")]
    Unrecognized(String),

    #[error("numeric fact argument {0} has no identifier form")]
    NonFiniteNumber(f64),

    #[error("empty identifier")]
    Empty,

    #[error("missing argument at position {0}")]
    MissingArgument(usize),
}
