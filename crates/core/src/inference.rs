//! Inference engine boundary: facts in, facts out.
//!
//! The compiler never depends on how the engine represents values
//! internally. Arguments cross the boundary as the closed [`FactValue`]
//! union, and every narrowing conversion is explicit and fallible.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::atom::normalize_atom_id;
use crate::error::{FactValueError, InferenceError};

/// A single fact argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FactValue {
    /// Plain string value.
    String(String),
    /// Numeric value.
    Number(f64),
    /// Namespaced identifier (e.g. `/safety`).
    AtomRef(String),
    /// Anything else; carries the engine's type name for diagnostics.
    Unrecognized(String),
}

impl FactValue {
    pub fn string(s: impl Into<String>) -> Self {
        Self::String(s.into())
    }

    pub fn atom(id: impl Into<String>) -> Self {
        Self::AtomRef(id.into())
    }

    /// Lift an untyped JSON value into the closed union.
    ///
    /// Booleans, nulls, arrays and objects are not meaningful atom
    /// arguments and become `Unrecognized`.
    pub fn from_json(value: &serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::String(s) if s.starts_with('/') => Self::AtomRef(s.clone()),
            Value::String(s) => Self::String(s.clone()),
            Value::Number(n) => match n.as_f64() {
                Some(f) => Self::Number(f),
                None => Self::Unrecognized("number".into()),
            },
            Value::Bool(_) => Self::Unrecognized("bool".into()),
            Value::Null => Self::Unrecognized("null".into()),
            Value::Array(_) => Self::Unrecognized("array".into()),
            Value::Object(_) => Self::Unrecognized("object".into()),
        }
    }

    /// Narrow this value to a normalized atom identifier.
    ///
    /// Strings and identifiers are taken directly (namespace prefix
    /// stripped). Integral numbers render without a fractional part,
    /// other finite numbers use their shortest display form.
    pub fn to_atom_id(&self) -> Result<String, FactValueError> {
        let id = match self {
            Self::String(s) | Self::AtomRef(s) => normalize_atom_id(s).to_string(),
            Self::Number(n) => {
                if !n.is_finite() {
                    return Err(FactValueError::NonFiniteNumber(*n));
                }
                if n.fract() == 0.0 && n.abs() < 9.0e15 {
                    format!("{}", *n as i64)
                } else {
                    format!("{n}")
                }
            }
            Self::Unrecognized(ty) => return Err(FactValueError::Unrecognized(ty.clone())),
        };
        if id.is_empty() {
            return Err(FactValueError::Empty);
        }
        Ok(id)
    }

    /// Narrow this value to text. Identifiers keep their prefix stripped.
    pub fn to_text(&self) -> Result<String, FactValueError> {
        match self {
            Self::String(s) => Ok(s.clone()),
            Self::AtomRef(s) => Ok(normalize_atom_id(s).to_string()),
            Self::Number(_) => self.to_atom_id(),
            Self::Unrecognized(ty) => Err(FactValueError::Unrecognized(ty.clone())),
        }
    }

    /// Narrow this value to an integer priority.
    pub fn to_priority(&self) -> Result<i32, FactValueError> {
        match self {
            Self::Number(n) if n.is_finite() => {
                Ok(n.round().clamp(i32::MIN as f64, i32::MAX as f64) as i32)
            }
            Self::Number(n) => Err(FactValueError::NonFiniteNumber(*n)),
            Self::String(s) => s
                .trim()
                .parse::<i32>()
                .map_err(|_| FactValueError::Unrecognized(format!("string {s:?}"))),
            Self::AtomRef(_) => Err(FactValueError::Unrecognized("atom_ref".into())),
            Self::Unrecognized(ty) => Err(FactValueError::Unrecognized(ty.clone())),
        }
    }

    /// Loose equality used for argument matching: identifiers compare
    /// after namespace normalization on both sides.
    pub fn matches(&self, other: &FactValue) -> bool {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::Unrecognized(_), _) | (_, Self::Unrecognized(_)) => false,
            (a, b) => match (a.to_text(), b.to_text()) {
                (Ok(x), Ok(y)) => normalize_atom_id(&x) == normalize_atom_id(&y),
                _ => false,
            },
        }
    }
}

/// A unit of data asserted into or queried from the inference engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    pub predicate: String,

    #[serde(default)]
    pub args: Vec<FactValue>,

    /// Retraction scope; facts asserted by one compilation share a tag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

impl Fact {
    pub fn new(predicate: impl Into<String>, args: Vec<FactValue>) -> Self {
        Self {
            predicate: predicate.into(),
            args,
            tag: None,
        }
    }

    pub fn tagged(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Argument at `index`, or an error naming the missing position.
    pub fn arg(&self, index: usize) -> Result<&FactValue, FactValueError> {
        self.args
            .get(index)
            .ok_or(FactValueError::MissingArgument(index))
    }
}

/// The consumed inference-engine contract.
///
/// Implementations must be safe to call concurrently from many
/// compilations; each compilation scopes its assertions with a unique tag.
#[async_trait]
pub trait InferenceEngine: Send + Sync {
    /// The engine name for diagnostics.
    fn name(&self) -> &str;

    /// Assert facts. Facts carrying a tag can later be retracted together.
    async fn assert(&self, facts: Vec<Fact>) -> Result<(), InferenceError>;

    /// Return facts for `predicate` whose leading arguments match `args`.
    async fn query(&self, predicate: &str, args: &[FactValue]) -> Result<Vec<Fact>, InferenceError>;

    /// Remove every fact asserted with `tag`.
    async fn retract(&self, tag: &str) -> Result<(), InferenceError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strings_and_refs_normalize() {
        assert_eq!(FactValue::string("/safety").to_atom_id().unwrap(), "safety");
        assert_eq!(FactValue::atom("/safety").to_atom_id().unwrap(), "safety");
        assert_eq!(FactValue::string("safety").to_atom_id().unwrap(), "safety");
    }

    #[test]
    fn numbers_convert_narrowly() {
        assert_eq!(FactValue::Number(42.0).to_atom_id().unwrap(), "42");
        assert_eq!(FactValue::Number(1.5).to_atom_id().unwrap(), "1.5");
        assert!(matches!(
            FactValue::Number(f64::NAN).to_atom_id(),
            Err(FactValueError::NonFiniteNumber(_))
        ));
    }

    #[test]
    fn unrecognized_is_an_error_not_a_panic() {
        let v = FactValue::from_json(&json!({"nested": true}));
        assert_eq!(v, FactValue::Unrecognized("object".into()));
        assert_eq!(
            v.to_atom_id(),
            Err(FactValueError::Unrecognized("object".into()))
        );
        assert!(FactValue::from_json(&json!(true)).to_atom_id().is_err());
    }

    #[test]
    fn json_strings_with_prefix_become_refs() {
        assert_eq!(FactValue::from_json(&json!("/a")), FactValue::atom("/a"));
        assert_eq!(FactValue::from_json(&json!(7)), FactValue::Number(7.0));
    }

    #[test]
    fn empty_identifier_rejected() {
        assert_eq!(FactValue::string("/").to_atom_id(), Err(FactValueError::Empty));
    }

    #[test]
    fn priority_conversion() {
        assert_eq!(FactValue::Number(7.4).to_priority().unwrap(), 7);
        assert_eq!(FactValue::string(" -3 ").to_priority().unwrap(), -3);
        assert!(FactValue::string("high").to_priority().is_err());
    }

    #[test]
    fn matching_normalizes_both_sides() {
        assert!(FactValue::atom("/a").matches(&FactValue::string("a")));
        assert!(FactValue::string("/a").matches(&FactValue::atom("a")));
        assert!(!FactValue::string("a").matches(&FactValue::string("b")));
        assert!(!FactValue::Unrecognized("x".into()).matches(&FactValue::Unrecognized("x".into())));
    }

    #[test]
    fn missing_argument_reported() {
        let fact = Fact::new("relevant_atom", vec![]);
        assert_eq!(fact.arg(0), Err(FactValueError::MissingArgument(0)));
    }
}
