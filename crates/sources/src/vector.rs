//! Lexical similarity search over atom content.
//!
//! Atoms are embedded as term-frequency vectors and ranked against the
//! query with cosine similarity. No model, no external service: the
//! backend exists so the selector's similarity signal can run in-process.

use async_trait::async_trait;
use promptc_core::atom::{Atom, normalize_atom_id};
use promptc_core::error::SimilarityError;
use promptc_core::similarity::{ScoredId, SimilaritySearch};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1]; 0.0 if the lengths differ or either
/// vector has no magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let (dot, norm_a, norm_b) = a.iter().zip(b).fold((0.0f64, 0.0f64, 0.0f64), |acc, (x, y)| {
        let (x, y) = (*x as f64, *y as f64);
        (acc.0 + x * y, acc.1 + x * x, acc.2 + y * y)
    });

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }
    (dot / denom) as f32
}

/// Lowercased alphanumeric terms of at least two characters.
pub fn terms(text: &str) -> BTreeMap<String, f32> {
    let mut counts = BTreeMap::new();
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= 2)
    {
        *counts.entry(word.to_lowercase()).or_insert(0.0) += 1.0;
    }
    counts
}

/// Densify two sparse term maps over their shared vocabulary.
fn densify(a: &BTreeMap<String, f32>, b: &BTreeMap<String, f32>) -> (Vec<f32>, Vec<f32>) {
    let vocab: BTreeSet<&String> = a.keys().chain(b.keys()).collect();
    vocab
        .into_iter()
        .map(|t| (a.get(t).copied().unwrap_or(0.0), b.get(t).copied().unwrap_or(0.0)))
        .unzip()
}

/// In-process [`SimilaritySearch`] keyed by atom ID. Cloning shares the index.
#[derive(Clone, Default)]
pub struct SimilarityIndex {
    docs: Arc<RwLock<BTreeMap<String, BTreeMap<String, f32>>>>,
}

impl SimilarityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index the content of every atom, replacing earlier entries by ID.
    pub async fn index_atoms<'a>(&self, atoms: impl IntoIterator<Item = &'a Atom>) {
        let mut docs = self.docs.write().await;
        for atom in atoms {
            docs.insert(atom.id.clone(), terms(&atom.content));
        }
    }

    pub async fn insert(&self, id: &str, text: &str) {
        self.docs
            .write()
            .await
            .insert(normalize_atom_id(id).to_string(), terms(text));
    }

    pub async fn remove(&self, id: &str) -> bool {
        self.docs.write().await.remove(normalize_atom_id(id)).is_some()
    }

    pub async fn len(&self) -> usize {
        self.docs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.docs.read().await.is_empty()
    }
}

#[async_trait]
impl SimilaritySearch for SimilarityIndex {
    fn name(&self) -> &str {
        "lexical"
    }

    async fn search(
        &self,
        query: &str,
        top_k: usize,
        deadline: Instant,
    ) -> Result<Vec<ScoredId>, SimilarityError> {
        if Instant::now() >= deadline {
            return Err(SimilarityError::DeadlineExceeded);
        }
        let query_terms = terms(query);
        if query_terms.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let docs = self.docs.read().await;
        let mut scored: Vec<ScoredId> = docs
            .iter()
            .filter_map(|(id, doc)| {
                let (q, d) = densify(&query_terms, doc);
                let score = cosine_similarity(&q, &d);
                (score > 0.0).then(|| ScoredId::new(id.clone(), score))
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        scored.truncate(top_k);
        Ok(scored)
    }
}
