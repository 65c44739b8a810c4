//! Compilation output types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::atom::AtomCategory;
use crate::context::ContextHash;

/// Generation of the mutable backing-store content.
///
/// Incremented exactly once per successful store registration or removal.
/// A result is only valid for cache lookups under the version it was
/// computed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StateVersion(pub u64);

impl StateVersion {
    pub const INITIAL: StateVersion = StateVersion(0);

    pub fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for StateVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// What kind of degradation a warning reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// A source was unreachable or timed out; its atoms are missing.
    SourceFailure,
    /// A stored record could not be turned into an atom.
    MalformedRecord,
    /// An inference-engine fact had an argument of an unusable type.
    MalformedFact,
    /// Relevance ranking was reduced (engine or similarity failure).
    SelectionDegraded,
    /// A dependency referenced an ID not in the candidate pool.
    MissingDependency,
    /// A dependency cycle was broken by removing one edge.
    CycleBroken,
    /// Mandatory atoms alone exceed the token budget.
    BudgetExceeded,
    /// An optional atom was left out of the fitted set.
    AtomSkipped,
    /// An atom's content was capped before token estimation.
    ContentTruncated,
}

impl WarningKind {
    /// The condition depends on external availability rather than on store
    /// content, so a retry under the same state may produce a different result.
    pub fn is_transient(self) -> bool {
        matches!(self, Self::SourceFailure | Self::SelectionDegraded)
    }
}

/// A non-fatal condition recorded during compilation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    pub fn new(kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn budget_exceeded(mandatory: usize, budget: i64) -> Self {
        Self::new(
            WarningKind::BudgetExceeded,
            format!("budget exceeded: mandatory={mandatory} budget={budget}"),
        )
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// The compiled prompt and everything known about how it was built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompilationResult {
    /// Final rendered text
    pub text: String,

    /// Included atom IDs in rendered order
    pub included_atoms: Vec<String>,

    /// Sum of the token estimates of all included atoms
    pub total_tokens: usize,

    /// Number of included atoms that were mandatory
    pub mandatory_count: usize,

    /// Token totals per category
    #[serde(default)]
    pub category_tokens: BTreeMap<AtomCategory, usize>,

    /// Optional atoms that were resolved but not included
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dropped_atoms: Vec<String>,

    /// Every warning raised by any stage
    #[serde(default)]
    pub warnings: Vec<Warning>,

    /// Hash of the context this result was compiled for
    pub context_hash: ContextHash,

    /// Store generation this result was compiled against
    pub state_version: StateVersion,
}

impl CompilationResult {
    pub fn has_warning(&self, kind: WarningKind) -> bool {
        self.warnings.iter().any(|w| w.kind == kind)
    }

    /// Whether any stage degraded for a reason that may not recur.
    pub fn is_transient(&self) -> bool {
        self.warnings.iter().any(|w| w.kind.is_transient())
    }

    pub fn warning_messages(&self) -> Vec<String> {
        self.warnings.iter().map(|w| w.message.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_warning_format() {
        let w = Warning::budget_exceeded(100, 0);
        assert_eq!(w.to_string(), "budget exceeded: mandatory=100 budget=0");
        assert_eq!(w.kind, WarningKind::BudgetExceeded);
    }

    #[test]
    fn state_version_saturates() {
        assert_eq!(StateVersion::INITIAL.next(), StateVersion(1));
        assert_eq!(StateVersion(u64::MAX).next(), StateVersion(u64::MAX));
    }

    #[test]
    fn warning_kind_serializes_snake_case() {
        let json = serde_json::to_string(&WarningKind::CycleBroken).unwrap();
        assert_eq!(json, "\"cycle_broken\"");
    }
}
