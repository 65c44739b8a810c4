//! Atoms: the addressable content fragments a prompt is compiled from.
//!
//! Atoms are immutable once constructed. Every source (embedded set,
//! external store, inference engine) produces the same `Atom` value so the
//! selection and resolution stages never care where an atom came from.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Strip the namespace prefix from an atom identifier.
///
/// `/safety` and `safety` name the same atom. This is applied to every ID
/// entering the pipeline and to every ID read back from the inference
/// engine, so both sides of a comparison are always normalized.
pub fn normalize_atom_id(raw: &str) -> &str {
    raw.trim().trim_start_matches('/')
}

/// Broad content category of an atom.
///
/// The order of variants is the order used for per-category reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AtomCategory {
    /// Safety constraints; always mandatory and always placed first.
    Safety,
    /// Agent identity and persona; always mandatory.
    Identity,
    /// Operating protocol (output format, tool etiquette).
    Protocol,
    /// Situational context about the shard, session or task.
    Context,
    /// Domain knowledge.
    Knowledge,
    /// Tool usage instructions.
    Tool,
    /// Worked examples.
    Exemplar,
}

impl AtomCategory {
    pub const ALL: [AtomCategory; 7] = [
        Self::Safety,
        Self::Identity,
        Self::Protocol,
        Self::Context,
        Self::Knowledge,
        Self::Tool,
        Self::Exemplar,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Safety => "safety",
            Self::Identity => "identity",
            Self::Protocol => "protocol",
            Self::Context => "context",
            Self::Knowledge => "knowledge",
            Self::Tool => "tool",
            Self::Exemplar => "exemplar",
        }
    }
}

impl fmt::Display for AtomCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a category string is not one of the known values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown atom category: {0:?}")]
pub struct UnknownCategory(pub String);

impl FromStr for AtomCategory {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = normalize_atom_id(s).to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == lowered)
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}

/// Where an atom came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum AtomOrigin {
    /// The immutable set compiled into the process.
    Embedded,
    /// A named, externally registered store.
    Store(String),
    /// Injected by the inference engine for a single compilation.
    InferenceEngine,
}

impl fmt::Display for AtomOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Embedded => f.write_str("embedded"),
            Self::Store(name) => write!(f, "store:{name}"),
            Self::InferenceEngine => f.write_str("inference"),
        }
    }
}

/// An immutable content fragment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Atom {
    /// Unique identifier (normalized, no namespace prefix)
    pub id: String,

    /// Content category
    pub category: AtomCategory,

    /// Opaque text; never interpreted by the compiler
    pub content: String,

    /// Whether the source marked this atom as must-include
    #[serde(default)]
    pub is_mandatory: bool,

    /// IDs of atoms this atom needs alongside it
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub depends_on: BTreeSet<String>,

    /// Ordering weight, higher first
    #[serde(default)]
    pub priority: i32,

    /// Filter tags; an optional atom with tags needs a matching context tag
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,

    /// Source of this atom
    pub origin: AtomOrigin,
}

impl Atom {
    /// Create an optional atom with no dependencies and zero priority.
    pub fn new(
        id: impl AsRef<str>,
        category: AtomCategory,
        content: impl Into<String>,
        origin: AtomOrigin,
    ) -> Self {
        Self {
            id: normalize_atom_id(id.as_ref()).to_string(),
            category,
            content: content.into(),
            is_mandatory: false,
            depends_on: BTreeSet::new(),
            priority: 0,
            tags: BTreeSet::new(),
            origin,
        }
    }

    pub fn mandatory(mut self) -> Self {
        self.is_mandatory = true;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn depends_on<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.depends_on
            .extend(ids.into_iter().map(|s| normalize_atom_id(s.as_ref()).to_string()));
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
}

/// The raw, loosely-typed shape of an atom as stored in files and stores.
///
/// Records are validated into `Atom`s by [`AtomRecord::into_atom`]; a record
/// that fails validation is skipped by the adapter with a warning.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AtomRecord {
    pub id: String,

    #[serde(default = "default_category")]
    pub category: String,

    #[serde(default)]
    pub content: String,

    #[serde(default)]
    pub mandatory: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,

    #[serde(default)]
    pub priority: i32,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

fn default_category() -> String {
    "context".into()
}

/// Why a record could not become an atom.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    #[error("record has an empty id")]
    EmptyId,

    #[error("record '{0}' has empty content")]
    EmptyContent(String),

    #[error("record '{id}': {source}")]
    Category {
        id: String,
        #[source]
        source: UnknownCategory,
    },
}

impl AtomRecord {
    /// Validate and normalize this record into an atom from `origin`.
    pub fn into_atom(self, origin: AtomOrigin) -> Result<Atom, RecordError> {
        let id = normalize_atom_id(&self.id).to_string();
        if id.is_empty() {
            return Err(RecordError::EmptyId);
        }
        if self.content.trim().is_empty() {
            return Err(RecordError::EmptyContent(id));
        }
        let category = self
            .category
            .parse::<AtomCategory>()
            .map_err(|source| RecordError::Category {
                id: id.clone(),
                source,
            })?;
        let depends_on: BTreeSet<String> = self
            .depends_on
            .iter()
            .map(|d| normalize_atom_id(d).to_string())
            .filter(|d| !d.is_empty())
            .collect();

        Ok(Atom {
            id,
            category,
            content: self.content,
            is_mandatory: self.mandatory,
            depends_on,
            priority: self.priority,
            tags: self.tags.into_iter().collect(),
            origin,
        })
    }
}

impl From<&Atom> for AtomRecord {
    fn from(atom: &Atom) -> Self {
        Self {
            id: atom.id.clone(),
            category: atom.category.as_str().into(),
            content: atom.content.clone(),
            mandatory: atom.is_mandatory,
            depends_on: atom.depends_on.iter().cloned().collect(),
            priority: atom.priority,
            tags: atom.tags.iter().cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_prefix_is_stripped() {
        assert_eq!(normalize_atom_id("/safety"), "safety");
        assert_eq!(normalize_atom_id("safety"), "safety");
        assert_eq!(normalize_atom_id("  /tool_use "), "tool_use");
    }

    #[test]
    fn category_parsing_is_case_insensitive() {
        assert_eq!("Safety".parse::<AtomCategory>(), Ok(AtomCategory::Safety));
        assert_eq!("/knowledge".parse::<AtomCategory>(), Ok(AtomCategory::Knowledge));
        assert!("gossip".parse::<AtomCategory>().is_err());
    }

    #[test]
    fn record_normalizes_ids_and_dependencies() {
        let record = AtomRecord {
            id: "/style".into(),
            category: "protocol".into(),
            content: "Answer tersely.".into(),
            depends_on: vec!["/format".into(), "".into()],
            ..Default::default()
        };
        let atom = record.into_atom(AtomOrigin::Embedded).unwrap();
        assert_eq!(atom.id, "style");
        assert_eq!(atom.category, AtomCategory::Protocol);
        assert_eq!(atom.depends_on.iter().collect::<Vec<_>>(), vec!["format"]);
    }

    #[test]
    fn invalid_records_are_rejected() {
        let empty = AtomRecord {
            id: "/".into(),
            content: "x".into(),
            ..Default::default()
        };
        assert_eq!(
            empty.into_atom(AtomOrigin::Embedded),
            Err(RecordError::EmptyId)
        );

        let bad_category = AtomRecord {
            id: "a".into(),
            category: "gossip".into(),
            content: "x".into(),
            ..Default::default()
        };
        assert!(matches!(
            bad_category.into_atom(AtomOrigin::Embedded),
            Err(RecordError::Category { .. })
        ));

        let blank = AtomRecord {
            id: "a".into(),
            content: "   ".into(),
            ..Default::default()
        };
        assert_eq!(
            blank.into_atom(AtomOrigin::Embedded),
            Err(RecordError::EmptyContent("a".into()))
        );
    }

    #[test]
    fn origin_display() {
        assert_eq!(AtomOrigin::Store("team".into()).to_string(), "store:team");
        assert_eq!(AtomOrigin::InferenceEngine.to_string(), "inference");
    }
}
