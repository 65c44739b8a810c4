//! Inference-engine adapter: atoms injected by the engine for one
//! compilation.
//!
//! The engine answers `inject_atom(id, category, content[, priority])`.
//! Fact arguments are untyped on the engine side, so every argument is
//! narrowed explicitly; a fact whose identity or content cannot be
//! recovered is skipped with a warning.
//!
//! The query runs under an engine lock that callers asserting their own
//! facts into the same engine share (see [`InferenceSource::with_lock`]),
//! so injection never observes another compilation's context facts.

use async_trait::async_trait;
use promptc_core::atom::{Atom, AtomCategory, AtomOrigin};
use promptc_core::call::CallContext;
use promptc_core::error::FactValueError;
use promptc_core::inference::{Fact, InferenceEngine};
use promptc_core::result::{Warning, WarningKind};
use promptc_core::source::{AtomSource, SourceBatch};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Predicate the engine uses to inject atoms.
pub const INJECT_PREDICATE: &str = "inject_atom";

#[derive(Clone)]
pub struct InferenceSource {
    engine: Arc<dyn InferenceEngine>,
    timeout: Duration,
    lock: Arc<Mutex<()>>,
}

impl InferenceSource {
    pub fn new(engine: Arc<dyn InferenceEngine>, timeout: Duration) -> Self {
        Self {
            engine,
            timeout,
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Share `lock` with other users of the same engine.
    pub fn with_lock(mut self, lock: Arc<Mutex<()>>) -> Self {
        self.lock = lock;
        self
    }
}

/// Turn one `inject_atom` fact into an atom, plus any soft warnings.
fn fact_to_atom(fact: &Fact) -> Result<(Atom, Vec<Warning>), FactValueError> {
    let id = fact.arg(0)?.to_atom_id()?;
    let content = fact.arg(2)?.to_text()?;
    if content.trim().is_empty() {
        return Err(FactValueError::Empty);
    }

    let mut warnings = Vec::new();
    let category = match fact.arg(1).and_then(|v| v.to_text()) {
        Ok(raw) => raw.parse::<AtomCategory>().unwrap_or_else(|e| {
            warnings.push(Warning::new(
                WarningKind::MalformedFact,
                format!("inference: atom '{id}' {e}, using context"),
            ));
            AtomCategory::Context
        }),
        Err(e) => {
            warnings.push(Warning::new(
                WarningKind::MalformedFact,
                format!("inference: atom '{id}' category: {e}, using context"),
            ));
            AtomCategory::Context
        }
    };

    let priority = match fact.args.get(3) {
        None => 0,
        Some(v) => v.to_priority().unwrap_or_else(|e| {
            warnings.push(Warning::new(
                WarningKind::MalformedFact,
                format!("inference: atom '{id}' priority: {e}, using 0"),
            ));
            0
        }),
    };

    let atom = Atom::new(id, category, content, AtomOrigin::InferenceEngine).with_priority(priority);
    Ok((atom, warnings))
}

#[async_trait]
impl AtomSource for InferenceSource {
    fn label(&self) -> String {
        format!("inference:{}", self.engine.name())
    }

    async fn fetch(&self, call: &CallContext) -> SourceBatch {
        if call.is_done() {
            return SourceBatch::failed(Warning::new(
                WarningKind::SourceFailure,
                "inference: injection query cancelled",
            ));
        }

        let deadline = call.sub_deadline(self.timeout);
        let query = async {
            let _exclusive = self.lock.lock().await;
            self.engine.query(INJECT_PREDICATE, &[]).await
        };
        let outcome = tokio::select! {
            biased;
            _ = call.cancel_token().cancelled() => {
                return SourceBatch::failed(Warning::new(
                    WarningKind::SourceFailure,
                    "inference: injection query cancelled",
                ));
            }
            res = tokio::time::timeout_at(deadline, query) => res,
        };
        let facts = match outcome {
            Ok(Ok(facts)) => facts,
            Ok(Err(e)) => {
                warn!(engine = self.engine.name(), error = %e, "Injection query failed");
                return SourceBatch::failed(Warning::new(
                    WarningKind::SourceFailure,
                    format!("inference: {e}"),
                ));
            }
            Err(_) => {
                warn!(engine = self.engine.name(), "Injection query timed out");
                return SourceBatch::failed(Warning::new(
                    WarningKind::SourceFailure,
                    "inference: injection query timed out",
                ));
            }
        };

        let mut batch = SourceBatch::default();
        for fact in &facts {
            match fact_to_atom(fact) {
                Ok((atom, warnings)) => {
                    batch.atoms.push(atom);
                    batch.warnings.extend(warnings);
                }
                Err(e) => {
                    debug!(predicate = %fact.predicate, error = %e, "Skipping malformed fact");
                    batch.warn(Warning::new(
                        WarningKind::MalformedFact,
                        format!("inference: skipped {INJECT_PREDICATE} fact: {e}"),
                    ));
                }
            }
        }
        batch
    }
}
