//! Final rendering of the fitted atom list.
//!
//! # Placement
//!
//! | Band | Categories | Order within band |
//! |------|------------|-------------------|
//! | 1 | `safety` | fitted (topological) |
//! | 2 | `identity` | fitted (topological) |
//! | 3 | everything else | fitted (topological) |
//!
//! Content is opaque and rendered verbatim (indentation and surrounding
//! whitespace included); atoms are separated by a blank line. Rendering is
//! pure: identical input always produces identical text.

use crate::fitter::{Fitted, FittedAtom};
use promptc_core::atom::AtomCategory;
use promptc_core::context::ContextHash;
use promptc_core::result::{CompilationResult, StateVersion, Warning};

const SEPARATOR: &str = "\n\n";

fn band(category: AtomCategory) -> u8 {
    match category {
        AtomCategory::Safety => 0,
        AtomCategory::Identity => 1,
        _ => 2,
    }
}

/// Render `fitted` into a [`CompilationResult`]. `warnings` are the
/// warnings of earlier stages; the fitter's own are appended after them.
pub fn assemble(
    fitted: &Fitted,
    mut warnings: Vec<Warning>,
    context_hash: ContextHash,
    state_version: StateVersion,
) -> CompilationResult {
    let mut placed: Vec<&FittedAtom> = fitted.atoms.iter().collect();
    // Stable sort keeps fitted order inside each band.
    placed.sort_by_key(|f| band(f.atom.category));

    let text = placed
        .iter()
        .map(|f| f.atom.content.as_str())
        .collect::<Vec<_>>()
        .join(SEPARATOR);

    warnings.extend(fitted.warnings.iter().cloned());

    CompilationResult {
        text,
        included_atoms: placed.iter().map(|f| f.atom.id.clone()).collect(),
        total_tokens: fitted.total_tokens,
        mandatory_count: fitted.mandatory_count,
        category_tokens: fitted.category_tokens.clone(),
        dropped_atoms: fitted.dropped.clone(),
        warnings,
        context_hash,
        state_version,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use promptc_core::atom::{Atom, AtomOrigin};
    use promptc_core::result::WarningKind;

    fn fitted(atoms: &[(&str, AtomCategory)]) -> Fitted {
        Fitted {
            atoms: atoms
                .iter()
                .map(|(id, cat)| FittedAtom {
                    atom: Atom::new(*id, *cat, format!("[{id}]"), AtomOrigin::Embedded),
                    mandatory: false,
                    tokens: 1,
                })
                .collect(),
            total_tokens: atoms.len(),
            ..Default::default()
        }
    }

    fn hash() -> ContextHash {
        ContextHash([7; 32])
    }

    #[test]
    fn safety_then_identity_then_rest() {
        let f = fitted(&[
            ("glossary", AtomCategory::Knowledge),
            ("persona", AtomCategory::Identity),
            ("tooling", AtomCategory::Tool),
            ("rules", AtomCategory::Safety),
        ]);
        let res = assemble(&f, vec![], hash(), StateVersion(3));
        assert_eq!(res.included_atoms, vec!["rules", "persona", "glossary", "tooling"]);
        assert_eq!(res.text, "[rules]\n\n[persona]\n\n[glossary]\n\n[tooling]");
        assert_eq!(res.state_version, StateVersion(3));
    }

    #[test]
    fn order_within_band_is_preserved() {
        let f = fitted(&[
            ("C", AtomCategory::Knowledge),
            ("B", AtomCategory::Knowledge),
            ("A", AtomCategory::Knowledge),
        ]);
        let res = assemble(&f, vec![], hash(), StateVersion::INITIAL);
        assert_eq!(res.text, "[C]\n\n[B]\n\n[A]");
    }

    #[test]
    fn warnings_are_merged_in_stage_order() {
        let mut f = fitted(&[("a", AtomCategory::Context)]);
        f.warnings.push(Warning::budget_exceeded(10, 5));
        let upstream = vec![Warning::new(WarningKind::SourceFailure, "store:x: down")];
        let res = assemble(&f, upstream, hash(), StateVersion::INITIAL);
        assert_eq!(res.warning_messages(), vec![
            "store:x: down".to_string(),
            "budget exceeded: mandatory=10 budget=5".to_string(),
        ]);
    }

    #[test]
    fn content_is_rendered_verbatim() {
        let mut f = fitted(&[("snippet", AtomCategory::Exemplar), ("note", AtomCategory::Knowledge)]);
        f.atoms[0].atom.content = "    fn main() {}\n".into();
        f.atoms[1].atom.content = "  indented note".into();
        let res = assemble(&f, vec![], hash(), StateVersion::INITIAL);
        assert_eq!(res.text, "    fn main() {}\n\n\n  indented note");
        assert_eq!(res.included_atoms, vec!["snippet", "note"]);
    }

    #[test]
    fn empty_input_renders_empty_text() {
        let res = assemble(&Fitted::default(), vec![], hash(), StateVersion::INITIAL);
        assert!(res.text.is_empty());
        assert!(res.included_atoms.is_empty());
    }

    #[test]
    fn rendering_is_deterministic() {
        let f = fitted(&[("x", AtomCategory::Exemplar), ("y", AtomCategory::Safety)]);
        let a = assemble(&f, vec![], hash(), StateVersion::INITIAL);
        let b = assemble(&f, vec![], hash(), StateVersion::INITIAL);
        assert_eq!(a, b);
    }
}
