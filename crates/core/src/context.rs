//! Compilation context: the immutable per-request input to the compiler.
//!
//! A context must hash identically regardless of the order its filter tags
//! were supplied in, because the hash is half of the cache key.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fmt;

use crate::error::{Error, Result};

/// Classified intent of the request being served.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intent {
    /// Coarse classification (e.g. "query", "mutation", "instruction")
    #[serde(default = "default_intent_category")]
    pub category: String,

    /// The action verb (e.g. "explain", "fix", "search")
    pub verb: String,

    /// What the verb applies to, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

fn default_intent_category() -> String {
    "query".into()
}

impl Intent {
    pub fn new(verb: impl Into<String>) -> Self {
        Self {
            category: default_intent_category(),
            verb: verb.into(),
            target: None,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }
}

/// All inputs that identify a single compilation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilationContext {
    /// The agent shard this prompt is compiled for
    pub shard_id: String,

    /// Conversation/session identifier, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// Intent classification of the current request
    pub intent: Intent,

    /// Token budget; zero or negative means "mandatory atoms only"
    pub budget: i64,

    /// Context filter tags (order-insensitive)
    #[serde(default)]
    pub tags: BTreeSet<String>,

    /// Free text used for similarity ranking; falls back to the intent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
}

impl CompilationContext {
    pub fn new(shard_id: impl Into<String>, intent: Intent, budget: i64) -> Self {
        Self {
            shard_id: shard_id.into(),
            session_id: None,
            intent,
            budget,
            tags: BTreeSet::new(),
            query: None,
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    /// Reject contexts that cannot identify a compilation.
    pub fn validate(&self) -> Result<()> {
        if self.shard_id.trim().is_empty() {
            return Err(Error::InvalidContext("shard_id must not be empty".into()));
        }
        if self.intent.verb.trim().is_empty() {
            return Err(Error::InvalidContext("intent verb must not be empty".into()));
        }
        if self.tags.iter().any(|t| t.trim().is_empty()) {
            return Err(Error::InvalidContext("filter tags must not be blank".into()));
        }
        Ok(())
    }

    /// Text handed to the similarity backend.
    pub fn similarity_query(&self) -> String {
        if let Some(q) = self.query.as_deref().filter(|q| !q.trim().is_empty()) {
            return q.to_string();
        }
        match &self.intent.target {
            Some(target) => format!("{} {}", self.intent.verb, target),
            None => self.intent.verb.clone(),
        }
    }

    /// Stable, order-independent hash of this context.
    ///
    /// Every field is written with a field marker and a length prefix so
    /// that no two distinct contexts share an encoding.
    pub fn hash(&self) -> ContextHash {
        let mut hasher = Sha256::new();
        let mut field = |name: &str, value: &str| {
            hasher.update(name.as_bytes());
            hasher.update((value.len() as u64).to_le_bytes());
            hasher.update(value.as_bytes());
        };

        field("shard", &self.shard_id);
        field("session", self.session_id.as_deref().unwrap_or(""));
        field("intent.category", &self.intent.category);
        field("intent.verb", &self.intent.verb);
        field("intent.target", self.intent.target.as_deref().unwrap_or(""));
        field("budget", &self.budget.to_string());
        // BTreeSet iteration is sorted, so tag order never matters.
        for tag in &self.tags {
            field("tag", tag);
        }
        field("query", self.query.as_deref().unwrap_or(""));

        ContextHash(hasher.finalize().into())
    }
}

/// SHA-256 identity of a `CompilationContext`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContextHash(pub [u8; 32]);

impl ContextHash {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First eight hex characters, for log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for ContextHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ContextHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContextHash({})", self.short())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> CompilationContext {
        CompilationContext::new("shard-1", Intent::new("explain").with_target("borrowck"), 1000)
    }

    #[test]
    fn hash_ignores_tag_order() {
        let a = ctx().with_tags(["rust", "beginner", "cli"]);
        let b = ctx().with_tags(["cli", "rust", "beginner"]);
        assert_eq!(a.hash(), b.hash());
    }

    #[test]
    fn hash_changes_with_any_field() {
        let base = ctx().hash();
        assert_ne!(base, ctx().with_session("s1").hash());
        assert_ne!(base, ctx().with_tag("rust").hash());
        assert_ne!(base, ctx().with_query("lifetimes").hash());

        let mut budget = ctx();
        budget.budget = 999;
        assert_ne!(base, budget.hash());
    }

    #[test]
    fn field_boundaries_do_not_collide() {
        let a = CompilationContext::new("ab", Intent::new("c"), 1);
        let b = CompilationContext::new("a", Intent::new("bc"), 1);
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn hash_hex_is_64_chars() {
        let hex = ctx().hash().to_hex();
        assert_eq!(hex.len(), 64);
        assert_eq!(ctx().hash().short().len(), 8);
    }

    #[test]
    fn validation_rejects_empty_shard() {
        let bad = CompilationContext::new("  ", Intent::new("explain"), 10);
        assert!(matches!(bad.validate(), Err(Error::InvalidContext(_))));
        assert!(ctx().validate().is_ok());
    }

    #[test]
    fn similarity_query_prefers_explicit_text() {
        assert_eq!(ctx().similarity_query(), "explain borrowck");
        assert_eq!(ctx().with_query("lifetimes").similarity_query(), "lifetimes");
    }
}
