//! Token budget fitting.
//!
//! Mandatory atoms are always included; if they alone exceed the budget
//! they are kept anyway and a `budget exceeded` warning is recorded.
//! Optional atoms are then taken greedily in resolved order, skipping
//! (not stopping at) any that would overflow or whose dependency was left
//! out.

use crate::resolver::ResolvedAtom;
use crate::token::atom_cost;
use promptc_core::atom::{Atom, AtomCategory};
use promptc_core::result::{Warning, WarningKind};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};

/// One included atom with its cost.
#[derive(Debug, Clone, PartialEq)]
pub struct FittedAtom {
    pub atom: Atom,
    pub mandatory: bool,
    pub tokens: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Fitted {
    /// Included atoms in resolved order
    pub atoms: Vec<FittedAtom>,
    pub total_tokens: usize,
    pub mandatory_count: usize,
    pub category_tokens: BTreeMap<AtomCategory, usize>,
    /// Optional atoms left out, in resolved order
    pub dropped: Vec<String>,
    pub warnings: Vec<Warning>,
}

/// Fit `resolved` into `budget` tokens. A budget of zero or less admits
/// mandatory atoms only.
pub fn fit(resolved: &[ResolvedAtom], budget: i64, max_atom_chars: usize) -> Fitted {
    let costs: Vec<_> = resolved
        .iter()
        .map(|r| atom_cost(&r.atom.content, max_atom_chars))
        .collect();

    let mandatory_tokens = resolved
        .iter()
        .zip(&costs)
        .filter(|(r, _)| r.mandatory)
        .fold(0usize, |acc, (_, c)| acc.saturating_add(c.tokens));

    let mut fitted = Fitted::default();
    let limit = usize::try_from(budget).unwrap_or(0);

    if mandatory_tokens > limit {
        warn!(mandatory = mandatory_tokens, budget, "Mandatory atoms exceed budget");
        fitted
            .warnings
            .push(Warning::budget_exceeded(mandatory_tokens, budget));
    }

    let mut running = mandatory_tokens;
    let mut included: HashSet<&str> = resolved
        .iter()
        .filter(|r| r.mandatory)
        .map(|r| r.atom.id.as_str())
        .collect();

    for (resolved_atom, cost) in resolved.iter().zip(&costs) {
        let id = resolved_atom.atom.id.as_str();
        if !resolved_atom.mandatory {
            if limit == 0 {
                fitted.dropped.push(id.to_string());
                continue;
            }
            if let Some(missing) = resolved_atom.deps.iter().find(|d| !included.contains(d.as_str())) {
                fitted.warnings.push(Warning::new(
                    WarningKind::AtomSkipped,
                    format!("atom '{id}' skipped: dependency '{missing}' not included"),
                ));
                fitted.dropped.push(id.to_string());
                continue;
            }
            match running.checked_add(cost.tokens) {
                Some(total) if total <= limit => running = total,
                _ => {
                    debug!(atom = id, tokens = cost.tokens, running, "Atom does not fit");
                    fitted.dropped.push(id.to_string());
                    continue;
                }
            }
            included.insert(id);
        }

        if cost.capped {
            fitted.warnings.push(Warning::new(
                WarningKind::ContentTruncated,
                format!(
                    "atom '{id}' is longer than {max_atom_chars} bytes; costed at the cap"
                ),
            ));
        }
        *fitted
            .category_tokens
            .entry(resolved_atom.atom.category)
            .or_insert(0) += cost.tokens;
        if resolved_atom.mandatory {
            fitted.mandatory_count += 1;
        }
        fitted.atoms.push(FittedAtom {
            atom: resolved_atom.atom.clone(),
            mandatory: resolved_atom.mandatory,
            tokens: cost.tokens,
        });
    }

    fitted.total_tokens = running;
    debug!(
        included = fitted.atoms.len(),
        dropped = fitted.dropped.len(),
        tokens = fitted.total_tokens,
        budget,
        "Budget fitted"
    );
    fitted
}
