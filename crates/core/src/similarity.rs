//! Similarity search boundary.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::error::SimilarityError;

/// One ranked hit from the similarity backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredId {
    /// Atom ID (may carry a namespace prefix; normalized by the caller)
    pub id: String,
    /// Similarity score, higher is closer
    pub score: f32,
}

impl ScoredId {
    pub fn new(id: impl Into<String>, score: f32) -> Self {
        Self {
            id: id.into(),
            score,
        }
    }
}

/// The consumed similarity-search contract.
///
/// Implementations return at most `top_k` hits sorted by descending score
/// and must give up once `deadline` has passed.
#[async_trait]
pub trait SimilaritySearch: Send + Sync {
    /// The backend name for diagnostics.
    fn name(&self) -> &str;

    async fn search(
        &self,
        query: &str,
        top_k: usize,
        deadline: Instant,
    ) -> Result<Vec<ScoredId>, SimilarityError>;
}
