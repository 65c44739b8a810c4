//! Reference inference engine: an in-process fact store with one-step rules.
//!
//! Good enough to drive the compiler from a file of facts and rules, and
//! the engine used throughout the test suite. Queries match on the
//! predicate and on leading arguments; rules derive a fact when every
//! one of their conditions matches a stored fact.

use async_trait::async_trait;
use promptc_core::error::InferenceError;
use promptc_core::inference::{Fact, FactValue, InferenceEngine};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// A derivation: when every condition matches a stored fact, `then` holds.
///
/// Conditions match like queries: same predicate, leading arguments equal.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub when: Vec<Fact>,
    pub then: Fact,
}

impl Rule {
    pub fn new(when: Vec<Fact>, then: Fact) -> Self {
        Self { when, then }
    }
}

fn matches_pattern(fact: &Fact, predicate: &str, args: &[FactValue]) -> bool {
    fact.predicate == predicate
        && fact.args.len() >= args.len()
        && args.iter().zip(&fact.args).all(|(want, have)| want.matches(have))
}

#[derive(Default)]
struct FactBase {
    facts: Vec<Fact>,
    rules: Vec<Rule>,
}

/// In-process [`InferenceEngine`]. Cloning shares the fact base.
#[derive(Clone, Default)]
pub struct FactStore {
    base: Arc<RwLock<FactBase>>,
}

impl FactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from a TOML fact file (see [`FactFile`]).
    pub fn from_file_contents(file: FactFile) -> Self {
        let (facts, rules) = file.into_parts();
        Self {
            base: Arc::new(RwLock::new(FactBase { facts, rules })),
        }
    }

    pub async fn add_rule(&self, rule: Rule) {
        self.base.write().await.rules.push(rule);
    }

    /// Number of stored (not derived) facts.
    pub async fn fact_count(&self) -> usize {
        self.base.read().await.facts.len()
    }
}

#[async_trait]
impl InferenceEngine for FactStore {
    fn name(&self) -> &str {
        "fact_store"
    }

    async fn assert(&self, facts: Vec<Fact>) -> Result<(), InferenceError> {
        if let Some(bad) = facts.iter().find(|f| f.predicate.trim().is_empty()) {
            return Err(InferenceError::AssertFailed(format!(
                "fact with empty predicate ({} args)",
                bad.args.len()
            )));
        }
        let mut base = self.base.write().await;
        debug!(count = facts.len(), "Asserting facts");
        base.facts.extend(facts);
        Ok(())
    }

    async fn query(&self, predicate: &str, args: &[FactValue]) -> Result<Vec<Fact>, InferenceError> {
        let base = self.base.read().await;
        let mut results: Vec<Fact> = base
            .facts
            .iter()
            .filter(|f| matches_pattern(f, predicate, args))
            .cloned()
            .collect();

        for rule in &base.rules {
            if !matches_pattern(&rule.then, predicate, args) {
                continue;
            }
            let holds = rule.when.iter().all(|cond| {
                base.facts
                    .iter()
                    .any(|f| matches_pattern(f, &cond.predicate, &cond.args))
            });
            if holds && !results.contains(&rule.then) {
                results.push(rule.then.clone());
            }
        }
        Ok(results)
    }

    async fn retract(&self, tag: &str) -> Result<(), InferenceError> {
        let mut base = self.base.write().await;
        let before = base.facts.len();
        base.facts.retain(|f| f.tag.as_deref() != Some(tag));
        debug!(tag, removed = before - base.facts.len(), "Retracted facts");
        Ok(())
    }
}

// ── File format ───────────────────────────────────────────────────────────

/// A fact as written in a file: arguments are untyped values, lifted with
/// [`FactValue::from_json`]. Strings beginning with `/` become identifiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawFact {
    pub predicate: String,
    #[serde(default)]
    pub args: Vec<serde_json::Value>,
}

impl RawFact {
    fn into_fact(self) -> Fact {
        Fact::new(
            self.predicate,
            self.args.iter().map(FactValue::from_json).collect(),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRule {
    #[serde(default)]
    pub when: Vec<RawFact>,
    pub then: RawFact,
}

/// On-disk fact file:
///
/// ```toml
/// [[facts]]
/// predicate = "relevant_atom"
/// args = ["/style_guide"]
///
/// [[rules]]
/// when = [{ predicate = "context_tag", args = ["deploy"] }]
/// then = { predicate = "relevant_atom", args = ["/deploy_checklist"] }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FactFile {
    #[serde(default)]
    pub facts: Vec<RawFact>,
    #[serde(default)]
    pub rules: Vec<RawRule>,
}

impl FactFile {
    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn read(path: &Path) -> Result<Self, InferenceError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| InferenceError::AssertFailed(format!("{}: {e}", path.display())))?;
        Self::parse(&content)
            .map_err(|e| InferenceError::AssertFailed(format!("{}: {e}", path.display())))
    }

    fn into_parts(self) -> (Vec<Fact>, Vec<Rule>) {
        let facts = self.facts.into_iter().map(RawFact::into_fact).collect();
        let rules = self
            .rules
            .into_iter()
            .map(|r| {
                Rule::new(
                    r.when.into_iter().map(RawFact::into_fact).collect(),
                    r.then.into_fact(),
                )
            })
            .collect();
        (facts, rules)
    }
}
