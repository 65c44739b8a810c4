//! Atom selection: which candidates are mandatory, which optional ones
//! are relevant for this compilation.
//!
//! Mandatory atoms (marked at the source, or in an always-include
//! category) bypass relevance entirely. Optional atoms pass a tag gate and
//! then the union of two relevance signals:
//!
//! 1. **Inference engine**: context facts are asserted under a scope tag,
//!    `relevant_atom(id, ..)` is queried, and the scope is retracted on
//!    every exit path. The engine's fact base is shared, so the whole
//!    assert → query → retract window holds the engine lock; a compilation
//!    never sees another compilation's context facts.
//! 2. **Similarity search**: hits at or above `min_score`.
//!
//! With neither signal configured, every eligible optional atom is
//! relevant. A failing signal contributes nothing and records a warning;
//! selection itself only fails on cancellation.

use promptc_core::atom::{Atom, AtomCategory, AtomOrigin};
use promptc_core::call::CallContext;
use promptc_core::context::CompilationContext;
use promptc_core::error::{Error, InferenceError, Result};
use promptc_core::inference::{Fact, FactValue, InferenceEngine};
use promptc_core::result::{Warning, WarningKind};
use promptc_core::similarity::SimilaritySearch;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};
use uuid::Uuid;

/// Predicate queried for optional-atom relevance; first argument is the atom.
pub const RELEVANCE_PREDICATE: &str = "relevant_atom";

/// Selector tuning, usually derived from `[compiler]` and `[timeouts]`.
#[derive(Debug, Clone)]
pub struct SelectorConfig {
    pub always_include: BTreeSet<AtomCategory>,
    pub similarity_top_k: usize,
    pub similarity_min_score: f32,
    pub inference_timeout: Duration,
    pub similarity_timeout: Duration,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            always_include: [AtomCategory::Safety, AtomCategory::Identity].into(),
            similarity_top_k: 8,
            similarity_min_score: 0.1,
            inference_timeout: Duration::from_millis(500),
            similarity_timeout: Duration::from_millis(500),
        }
    }
}

/// Output of [`AtomSelector::select`]. Both lists are ordered by
/// `(priority desc, id asc)`.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub mandatory: Vec<Atom>,
    pub optional: Vec<Atom>,
    pub warnings: Vec<Warning>,
}

// ── Fact scope ────────────────────────────────────────────────────────────

/// Context facts asserted for one compilation, retracted on release.
///
/// Call [`FactScope::release`] on every path. If the scope is dropped
/// without release (the compile future was cancelled mid-flight), the
/// retraction is spawned onto the current runtime instead. A held engine
/// lock is released only after the retraction finishes, on either path.
pub struct FactScope {
    engine: Arc<dyn InferenceEngine>,
    tag: String,
    released: bool,
    exclusive: Option<OwnedMutexGuard<()>>,
}

impl FactScope {
    pub fn new(engine: Arc<dyn InferenceEngine>) -> Self {
        Self {
            engine,
            tag: format!("compile/{}", Uuid::new_v4()),
            released: false,
            exclusive: None,
        }
    }

    /// Keep `guard` for the lifetime of the scope.
    pub fn holding(mut self, guard: OwnedMutexGuard<()>) -> Self {
        self.exclusive = Some(guard);
        self
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Assert `facts` under this scope's tag.
    pub async fn assert(&self, facts: Vec<Fact>) -> std::result::Result<(), InferenceError> {
        let tagged = facts.into_iter().map(|f| f.tagged(self.tag.clone())).collect();
        self.engine.assert(tagged).await
    }

    /// Retract everything asserted under this scope. Runs to completion
    /// regardless of caller cancellation, bounded by `timeout`.
    pub async fn release(mut self, timeout: Duration) -> std::result::Result<(), InferenceError> {
        self.released = true;
        match tokio::time::timeout(timeout, self.engine.retract(&self.tag)).await {
            Ok(res) => res,
            Err(_) => Err(InferenceError::Timeout(format!("retract {}", self.tag))),
        }
    }
}

impl Drop for FactScope {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let engine = self.engine.clone();
        let tag = std::mem::take(&mut self.tag);
        let exclusive = self.exclusive.take();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = engine.retract(&tag).await {
                        warn!(tag = %tag, error = %e, "Deferred fact retraction failed");
                    }
                    drop(exclusive);
                });
            }
            Err(_) => warn!(tag = %tag, "Fact scope dropped outside a runtime; facts not retracted"),
        }
    }
}

/// Facts describing the compilation context to the engine.
pub fn context_facts(cc: &CompilationContext) -> Vec<Fact> {
    let mut facts = vec![Fact::new(
        "context_shard",
        vec![FactValue::string(&cc.shard_id)],
    )];
    if let Some(session) = &cc.session_id {
        facts.push(Fact::new("context_session", vec![FactValue::string(session)]));
    }
    let mut intent = vec![
        FactValue::string(&cc.intent.category),
        FactValue::string(&cc.intent.verb),
    ];
    if let Some(target) = &cc.intent.target {
        intent.push(FactValue::string(target));
    }
    facts.push(Fact::new("context_intent", intent));
    facts.extend(
        cc.tags
            .iter()
            .map(|t| Fact::new("context_tag", vec![FactValue::string(t)])),
    );
    facts
}

// ── Selector ──────────────────────────────────────────────────────────────

/// Outcome of one relevance signal.
enum Signal {
    Hits(BTreeSet<String>),
    Degraded,
}

pub struct AtomSelector {
    config: SelectorConfig,
    engine: Option<Arc<dyn InferenceEngine>>,
    /// Held from context assertion until retraction completes
    engine_lock: Arc<Mutex<()>>,
    similarity: Option<Arc<dyn SimilaritySearch>>,
}

impl AtomSelector {
    pub fn new(config: SelectorConfig) -> Self {
        Self {
            config,
            engine: None,
            engine_lock: Arc::new(Mutex::new(())),
            similarity: None,
        }
    }

    pub fn with_engine(mut self, engine: Arc<dyn InferenceEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn with_similarity(mut self, similarity: Arc<dyn SimilaritySearch>) -> Self {
        self.similarity = Some(similarity);
        self
    }

    pub fn config(&self) -> &SelectorConfig {
        &self.config
    }

    /// The lock serializing access to the engine's fact base. Anything
    /// else that queries the same engine should take it too.
    pub fn engine_lock(&self) -> Arc<Mutex<()>> {
        self.engine_lock.clone()
    }

    pub fn is_mandatory(&self, atom: &Atom) -> bool {
        atom.is_mandatory || self.config.always_include.contains(&atom.category)
    }

    /// Split `candidates` into mandatory and relevant optional atoms.
    ///
    /// Returns an error only if the call was cancelled before an external
    /// call; any asserted context facts are retracted first.
    pub async fn select(
        &self,
        call: &CallContext,
        candidates: &[Atom],
        cc: &CompilationContext,
    ) -> Result<Selection> {
        let mut selection = Selection::default();
        let mut eligible = Vec::new();

        for atom in candidates {
            if self.is_mandatory(atom) {
                selection.mandatory.push(atom.clone());
            } else if atom.tags.is_empty() || !atom.tags.is_disjoint(&cc.tags) {
                eligible.push(atom);
            }
        }

        let relevant = if self.engine.is_none() && self.similarity.is_none() {
            None
        } else {
            let mut relevant = BTreeSet::new();
            if let Some(engine) = &self.engine {
                if let Signal::Hits(hits) = self
                    .engine_signal(engine, call, cc, &mut selection.warnings)
                    .await?
                {
                    relevant.extend(hits);
                }
            }
            if let Some(similarity) = &self.similarity {
                if let Signal::Hits(hits) = self
                    .similarity_signal(similarity.as_ref(), call, cc, &mut selection.warnings)
                    .await?
                {
                    relevant.extend(hits);
                }
            }
            Some(relevant)
        };

        selection.optional = eligible
            .into_iter()
            .filter(|atom| match &relevant {
                None => true,
                Some(ids) => atom.origin == AtomOrigin::InferenceEngine || ids.contains(&atom.id),
            })
            .cloned()
            .collect();

        let by_rank = |a: &Atom, b: &Atom| b.priority.cmp(&a.priority).then_with(|| a.id.cmp(&b.id));
        selection.mandatory.sort_by(by_rank);
        selection.optional.sort_by(by_rank);

        debug!(
            mandatory = selection.mandatory.len(),
            optional = selection.optional.len(),
            candidates = candidates.len(),
            "Selection complete"
        );
        Ok(selection)
    }

    async fn engine_signal(
        &self,
        engine: &Arc<dyn InferenceEngine>,
        call: &CallContext,
        cc: &CompilationContext,
        warnings: &mut Vec<Warning>,
    ) -> Result<Signal> {
        call.check("inference query")?;
        let deadline = call.sub_deadline(self.config.inference_timeout);

        let acquired = tokio::select! {
            biased;
            _ = call.cancel_token().cancelled() => return Err(Error::cancelled("inference query")),
            res = tokio::time::timeout_at(deadline, self.engine_lock.clone().lock_owned()) => res,
        };
        let Ok(guard) = acquired else {
            warn!(engine = engine.name(), "Engine busy past the deadline");
            warnings.push(Warning::new(
                WarningKind::SelectionDegraded,
                "inference: engine busy, relevance query timed out",
            ));
            return Ok(Signal::Degraded);
        };

        let scope = FactScope::new(engine.clone()).holding(guard);
        let outcome = self.query_relevance(&scope, call, cc, deadline, warnings).await;

        if let Err(e) = scope.release(self.config.inference_timeout).await {
            warn!(engine = engine.name(), error = %e, "Failed to retract context facts");
            warnings.push(Warning::new(
                WarningKind::SelectionDegraded,
                format!("inference: context facts not retracted: {e}"),
            ));
        }
        outcome
    }

    async fn query_relevance(
        &self,
        scope: &FactScope,
        call: &CallContext,
        cc: &CompilationContext,
        deadline: tokio::time::Instant,
        warnings: &mut Vec<Warning>,
    ) -> Result<Signal> {
        let asserted = tokio::time::timeout_at(deadline, scope.assert(context_facts(cc))).await;
        if let Some(reason) = degraded_reason(asserted) {
            warn!(tag = scope.tag(), reason = %reason, "Context assertion failed");
            warnings.push(Warning::new(
                WarningKind::SelectionDegraded,
                format!("inference: {reason}"),
            ));
            return Ok(Signal::Degraded);
        }

        call.check("inference query")?;
        let facts = match tokio::time::timeout_at(
            deadline,
            scope.engine.query(RELEVANCE_PREDICATE, &[]),
        )
        .await
        {
            Ok(Ok(facts)) => facts,
            Ok(Err(e)) => {
                warn!(error = %e, "Relevance query failed");
                warnings.push(Warning::new(
                    WarningKind::SelectionDegraded,
                    format!("inference: {e}"),
                ));
                return Ok(Signal::Degraded);
            }
            Err(_) => {
                warn!("Relevance query timed out");
                warnings.push(Warning::new(
                    WarningKind::SelectionDegraded,
                    "inference: relevance query timed out",
                ));
                return Ok(Signal::Degraded);
            }
        };

        let mut hits = BTreeSet::new();
        for fact in &facts {
            match fact.arg(0).and_then(|v| v.to_atom_id()) {
                Ok(id) => {
                    hits.insert(id);
                }
                Err(e) => warnings.push(Warning::new(
                    WarningKind::MalformedFact,
                    format!("inference: skipped {RELEVANCE_PREDICATE} fact: {e}"),
                )),
            }
        }
        debug!(hits = hits.len(), "Inference relevance");
        Ok(Signal::Hits(hits))
    }

    async fn similarity_signal(
        &self,
        similarity: &dyn SimilaritySearch,
        call: &CallContext,
        cc: &CompilationContext,
        warnings: &mut Vec<Warning>,
    ) -> Result<Signal> {
        call.check("similarity search")?;

        let query = cc.similarity_query();
        let deadline = call.sub_deadline(self.config.similarity_timeout);
        let found = tokio::time::timeout_at(
            deadline,
            similarity.search(&query, self.config.similarity_top_k, deadline),
        )
        .await;

        let scored = match found {
            Ok(Ok(scored)) => scored,
            Ok(Err(e)) => {
                warn!(backend = similarity.name(), error = %e, "Similarity search failed");
                warnings.push(Warning::new(
                    WarningKind::SelectionDegraded,
                    format!("similarity: {e}"),
                ));
                return Ok(Signal::Degraded);
            }
            Err(_) => {
                warn!(backend = similarity.name(), "Similarity search timed out");
                warnings.push(Warning::new(
                    WarningKind::SelectionDegraded,
                    "similarity: search timed out",
                ));
                return Ok(Signal::Degraded);
            }
        };

        let hits: BTreeSet<String> = scored
            .into_iter()
            .filter(|s| s.score.is_finite() && s.score >= self.config.similarity_min_score)
            .map(|s| promptc_core::normalize_atom_id(&s.id).to_string())
            .collect();
        debug!(hits = hits.len(), query = %query, "Similarity relevance");
        Ok(Signal::Hits(hits))
    }
}

fn degraded_reason(
    res: std::result::Result<std::result::Result<(), InferenceError>, tokio::time::error::Elapsed>,
) -> Option<String> {
    match res {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(e.to_string()),
        Err(_) => Some("context assertion timed out".into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use promptc_core::context::Intent;
    use promptc_core::error::SimilarityError;
    use promptc_core::similarity::ScoredId;
    use promptc_sources::FactStore;
    use tokio::time::Instant;

    fn atom(id: &str, category: AtomCategory) -> Atom {
        Atom::new(id, category, format!("content of {id}"), AtomOrigin::Embedded)
    }

    fn context() -> CompilationContext {
        CompilationContext::new("shard-1", Intent::new("explain").with_target("rust"), 1000)
    }

    fn ids(atoms: &[Atom]) -> Vec<&str> {
        atoms.iter().map(|a| a.id.as_str()).collect()
    }

    struct FixedSimilarity(Vec<ScoredId>);

    #[async_trait]
    impl SimilaritySearch for FixedSimilarity {
        fn name(&self) -> &str {
            "fixed"
        }
        async fn search(&self, _q: &str, _k: usize, _d: Instant) -> std::result::Result<Vec<ScoredId>, SimilarityError> {
            Ok(self.0.clone())
        }
    }

    struct DownSimilarity;

    #[async_trait]
    impl SimilaritySearch for DownSimilarity {
        fn name(&self) -> &str {
            "down"
        }
        async fn search(&self, _q: &str, _k: usize, _d: Instant) -> std::result::Result<Vec<ScoredId>, SimilarityError> {
            Err(SimilarityError::SearchFailed("index offline".into()))
        }
    }

    /// Engine whose queries fail but which records retractions.
    #[derive(Default)]
    struct FailingQueryEngine {
        inner: FactStore,
    }

    #[async_trait]
    impl InferenceEngine for FailingQueryEngine {
        fn name(&self) -> &str {
            "failing"
        }
        async fn assert(&self, facts: Vec<Fact>) -> std::result::Result<(), InferenceError> {
            self.inner.assert(facts).await
        }
        async fn query(&self, predicate: &str, _args: &[FactValue]) -> std::result::Result<Vec<Fact>, InferenceError> {
            Err(InferenceError::QueryFailed {
                predicate: predicate.into(),
                reason: "engine crashed".into(),
            })
        }
        async fn retract(&self, tag: &str) -> std::result::Result<(), InferenceError> {
            self.inner.retract(tag).await
        }
    }

    #[tokio::test]
    async fn always_include_categories_are_mandatory() {
        let selector = AtomSelector::new(SelectorConfig::default());
        let candidates = vec![
            atom("rules", AtomCategory::Safety),
            atom("persona", AtomCategory::Identity),
            atom("marked", AtomCategory::Knowledge).mandatory(),
            atom("fact", AtomCategory::Knowledge),
        ];
        let sel = selector
            .select(&CallContext::background(), &candidates, &context())
            .await
            .unwrap();
        assert_eq!(ids(&sel.mandatory), vec!["marked", "persona", "rules"]);
        assert_eq!(ids(&sel.optional), vec!["fact"]);
    }

    #[tokio::test]
    async fn tagged_atoms_need_a_matching_context_tag() {
        let selector = AtomSelector::new(SelectorConfig::default());
        let candidates = vec![
            atom("deploy", AtomCategory::Knowledge).with_tags(["ops"]),
            atom("general", AtomCategory::Knowledge),
        ];
        let sel = selector
            .select(&CallContext::background(), &candidates, &context())
            .await
            .unwrap();
        assert_eq!(ids(&sel.optional), vec!["general"]);

        let sel = selector
            .select(&CallContext::background(), &candidates, &context().with_tag("ops"))
            .await
            .unwrap();
        assert_eq!(ids(&sel.optional), vec!["deploy", "general"]);
    }

    #[tokio::test]
    async fn optional_sorted_by_priority_then_id() {
        let selector = AtomSelector::new(SelectorConfig::default());
        let candidates = vec![
            atom("b", AtomCategory::Knowledge),
            atom("a", AtomCategory::Knowledge),
            atom("z", AtomCategory::Knowledge).with_priority(5),
        ];
        let sel = selector
            .select(&CallContext::background(), &candidates, &context())
            .await
            .unwrap();
        assert_eq!(ids(&sel.optional), vec!["z", "a", "b"]);
    }

    #[tokio::test]
    async fn engine_relevance_filters_and_retracts() {
        let engine = Arc::new(FactStore::new());
        engine
            .add_rule(promptc_sources::Rule::new(
                vec![Fact::new("context_intent", vec![
                    FactValue::string("query"),
                    FactValue::string("explain"),
                ])],
                Fact::new(RELEVANCE_PREDICATE, vec![FactValue::atom("/lifetimes")]),
            ))
            .await;

        let selector = AtomSelector::new(SelectorConfig::default()).with_engine(engine.clone());
        let candidates = vec![
            atom("lifetimes", AtomCategory::Knowledge),
            atom("cooking", AtomCategory::Knowledge),
        ];
        let sel = selector
            .select(&CallContext::background(), &candidates, &context())
            .await
            .unwrap();
        assert_eq!(ids(&sel.optional), vec!["lifetimes"]);
        assert!(sel.warnings.is_empty());
        assert_eq!(engine.fact_count().await, 0);
    }

    #[tokio::test]
    async fn engine_failure_degrades_optional_but_keeps_mandatory() {
        let engine = Arc::new(FailingQueryEngine::default());
        let selector = AtomSelector::new(SelectorConfig::default()).with_engine(engine.clone());
        let candidates = vec![
            atom("rules", AtomCategory::Safety),
            atom("fact", AtomCategory::Knowledge),
        ];
        let sel = selector
            .select(&CallContext::background(), &candidates, &context())
            .await
            .unwrap();
        assert_eq!(ids(&sel.mandatory), vec!["rules"]);
        assert!(sel.optional.is_empty());
        assert_eq!(sel.warnings[0].kind, WarningKind::SelectionDegraded);
        assert!(sel.warnings[0].message.contains("engine crashed"));
        assert_eq!(engine.inner.fact_count().await, 0);
    }

    #[tokio::test]
    async fn similarity_hits_respect_min_score() {
        let similarity = Arc::new(FixedSimilarity(vec![
            ScoredId::new("/close", 0.9),
            ScoredId::new("far", 0.01),
        ]));
        let selector = AtomSelector::new(SelectorConfig::default()).with_similarity(similarity);
        let candidates = vec![
            atom("close", AtomCategory::Knowledge),
            atom("far", AtomCategory::Knowledge),
        ];
        let sel = selector
            .select(&CallContext::background(), &candidates, &context())
            .await
            .unwrap();
        assert_eq!(ids(&sel.optional), vec!["close"]);
    }

    #[tokio::test]
    async fn one_failed_signal_keeps_the_other() {
        let engine = Arc::new(FactStore::new());
        engine
            .assert(vec![Fact::new(RELEVANCE_PREDICATE, vec![FactValue::string("a")])])
            .await
            .unwrap();
        let selector = AtomSelector::new(SelectorConfig::default())
            .with_engine(engine)
            .with_similarity(Arc::new(DownSimilarity));
        let candidates = vec![
            atom("a", AtomCategory::Knowledge),
            atom("b", AtomCategory::Knowledge),
        ];
        let sel = selector
            .select(&CallContext::background(), &candidates, &context())
            .await
            .unwrap();
        assert_eq!(ids(&sel.optional), vec!["a"]);
        assert_eq!(sel.warnings.len(), 1);
        assert!(sel.warnings[0].message.contains("index offline"));
    }

    #[tokio::test]
    async fn malformed_relevance_fact_is_skipped() {
        let engine = Arc::new(FactStore::new());
        engine
            .assert(vec![
                Fact::new(RELEVANCE_PREDICATE, vec![FactValue::Unrecognized("list".into())]),
                Fact::new(RELEVANCE_PREDICATE, vec![FactValue::Number(7.0)]),
            ])
            .await
            .unwrap();
        let selector = AtomSelector::new(SelectorConfig::default()).with_engine(engine);
        let candidates = vec![atom("7", AtomCategory::Knowledge)];
        let sel = selector
            .select(&CallContext::background(), &candidates, &context())
            .await
            .unwrap();
        assert_eq!(ids(&sel.optional), vec!["7"]);
        assert_eq!(sel.warnings[0].kind, WarningKind::MalformedFact);
    }

    #[tokio::test]
    async fn cancelled_call_fails_before_engine() {
        let engine = Arc::new(FactStore::new());
        let selector = AtomSelector::new(SelectorConfig::default()).with_engine(engine.clone());
        let call = CallContext::background();
        call.cancel_token().cancel();
        let err = selector
            .select(&call, &[atom("a", AtomCategory::Knowledge)], &context())
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(engine.fact_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn busy_engine_degrades_without_asserting() {
        let engine = Arc::new(FactStore::new());
        let selector = AtomSelector::new(SelectorConfig::default()).with_engine(engine.clone());
        let _held = selector.engine_lock().lock_owned().await;

        let candidates = vec![
            atom("rules", AtomCategory::Safety),
            atom("fact", AtomCategory::Knowledge),
        ];
        let sel = selector
            .select(&CallContext::background(), &candidates, &context())
            .await
            .unwrap();
        assert_eq!(ids(&sel.mandatory), vec!["rules"]);
        assert!(sel.optional.is_empty());
        assert_eq!(sel.warnings[0].kind, WarningKind::SelectionDegraded);
        assert!(sel.warnings[0].message.contains("engine busy"));
        assert_eq!(engine.fact_count().await, 0);
    }

    #[tokio::test]
    async fn dropped_scope_releases_lock_after_retract() {
        let engine = Arc::new(FactStore::new());
        let lock = Arc::new(Mutex::new(()));
        {
            let guard = lock.clone().lock_owned().await;
            let scope = FactScope::new(engine.clone()).holding(guard);
            scope.assert(context_facts(&context())).await.unwrap();
            assert!(lock.try_lock().is_err());
        }
        let _next = lock.lock().await;
        assert_eq!(engine.fact_count().await, 0);
    }

    #[tokio::test]
    async fn dropped_scope_retracts_in_background() {
        let engine = Arc::new(FactStore::new());
        {
            let scope = FactScope::new(engine.clone());
            scope.assert(context_facts(&context())).await.unwrap();
            assert!(engine.fact_count().await > 0);
        }
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(engine.fact_count().await, 0);
    }

    #[test]
    fn context_facts_cover_every_field() {
        let cc = context().with_session("s-9").with_tags(["ops", "prod"]);
        let facts = context_facts(&cc);
        let predicates: Vec<_> = facts.iter().map(|f| f.predicate.as_str()).collect();
        assert_eq!(
            predicates,
            vec!["context_shard", "context_session", "context_intent", "context_tag", "context_tag"]
        );
        assert_eq!(facts[2].args.len(), 3);
    }
}
