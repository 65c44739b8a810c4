//! Dependency resolution: expand a selection to its dependency closure,
//! break cycles, and order the result topologically.
//!
//! The graph lives in an arena indexed by position; traversal is
//! iterative with a three-state marker, so deep chains cannot exhaust the
//! stack. Output order puts dependencies before dependents, ties broken
//! by `(priority desc, id asc)`.

use promptc_core::atom::Atom;
use promptc_core::error::{Error, Result};
use promptc_core::result::{Warning, WarningKind};
use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, warn};

/// One atom in resolved order.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedAtom {
    pub atom: Atom,
    /// Selected as mandatory, or a dependency of a mandatory atom
    pub mandatory: bool,
    /// Dependencies that survived resolution (missing IDs and broken
    /// cycle edges removed)
    pub deps: BTreeSet<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub atoms: Vec<ResolvedAtom>,
    pub warnings: Vec<Warning>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// The closure graph: node `i` is `atoms[i]`, `edges[i]` are the
/// arena indices it depends on.
struct Graph<'a> {
    atoms: Vec<&'a Atom>,
    edges: Vec<BTreeSet<usize>>,
}

/// One broken cycle: its node path and the edge removed to break it.
struct CycleBreak {
    cycle: Vec<usize>,
    victim: usize,
    target: usize,
}

impl Graph<'_> {
    fn id(&self, node: usize) -> &str {
        &self.atoms[node].id
    }

    /// Break every cycle in a single depth-first pass. Roots and
    /// successors are visited in ID order for determinism.
    ///
    /// When a back edge closes a cycle, the victim's edge to the next
    /// cycle member is removed. Frames above the victim were reached
    /// through that edge, so they are popped and reset to unvisited;
    /// they all sort after the current root, so the root loop reaches
    /// them again. Everything else keeps its mark and traversal resumes
    /// at the victim.
    fn break_cycles(&mut self) -> Vec<CycleBreak> {
        let n = self.atoms.len();
        let mut marks = vec![Mark::Unvisited; n];
        let mut roots: Vec<usize> = (0..n).collect();
        roots.sort_by(|a, b| self.id(*a).cmp(self.id(*b)));
        let mut breaks = Vec::new();

        for root in roots {
            if marks[root] != Mark::Unvisited {
                continue;
            }
            // (node, successors not yet explored)
            let mut stack: Vec<(usize, Vec<usize>)> = vec![(root, self.sorted_deps(root))];
            marks[root] = Mark::InProgress;

            while let Some((node, pending)) = stack.last_mut() {
                let node = *node;
                let Some(next) = pending.pop() else {
                    marks[node] = Mark::Done;
                    stack.pop();
                    continue;
                };
                match marks[next] {
                    Mark::Unvisited => {
                        marks[next] = Mark::InProgress;
                        stack.push((next, self.sorted_deps(next)));
                    }
                    Mark::Done => {}
                    Mark::InProgress => {
                        let start = stack.iter().position(|(n, _)| *n == next).unwrap_or(0);
                        let cycle: Vec<usize> = stack[start..].iter().map(|(n, _)| *n).collect();
                        let pos = self.victim_position(&cycle);
                        let victim = cycle[pos];
                        let target = cycle[(pos + 1) % cycle.len()];
                        self.edges[victim].remove(&target);
                        for (popped, _) in stack.drain(start + pos + 1..) {
                            marks[popped] = Mark::Unvisited;
                        }
                        breaks.push(CycleBreak { cycle, victim, target });
                    }
                }
            }
        }
        breaks
    }

    /// Lowest priority loses its edge; among equals, the greatest ID.
    fn victim_position(&self, cycle: &[usize]) -> usize {
        (0..cycle.len())
            .min_by(|a, b| {
                let (x, y) = (self.atoms[cycle[*a]], self.atoms[cycle[*b]]);
                x.priority.cmp(&y.priority).then_with(|| y.id.cmp(&x.id))
            })
            .unwrap_or(0)
    }

    /// Successors in reverse ID order, so popping yields ascending order.
    fn sorted_deps(&self, node: usize) -> Vec<usize> {
        let mut deps: Vec<usize> = self.edges[node].iter().copied().collect();
        deps.sort_by(|a, b| self.id(*b).cmp(self.id(*a)));
        deps
    }
}

/// Resolve `selected` (mandatory and relevant optional atoms) against the
/// full candidate `pool`.
///
/// Missing dependencies and cycles are repaired with warnings. An error is
/// returned only for a selected atom that is not in the pool.
pub fn resolve(pool: &[Atom], mandatory: &[Atom], optional: &[Atom]) -> Result<Resolution> {
    let by_id: HashMap<&str, &Atom> = pool.iter().map(|a| (a.id.as_str(), a)).collect();
    let mut warnings = Vec::new();

    // ── Closure ──
    let mut graph = Graph {
        atoms: Vec::new(),
        edges: Vec::new(),
    };
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut work: Vec<&Atom> = Vec::new();

    for atom in mandatory.iter().chain(optional) {
        let pooled = by_id.get(atom.id.as_str()).copied().ok_or_else(|| {
            Error::Resolution(format!("selected atom '{}' is not in the candidate pool", atom.id))
        })?;
        if !index.contains_key(pooled.id.as_str()) {
            index.insert(pooled.id.as_str(), graph.atoms.len());
            graph.atoms.push(pooled);
            work.push(pooled);
        }
    }

    while let Some(atom) = work.pop() {
        for dep in &atom.depends_on {
            match by_id.get(dep.as_str()) {
                Some(&found) if !index.contains_key(dep.as_str()) => {
                    index.insert(found.id.as_str(), graph.atoms.len());
                    graph.atoms.push(found);
                    work.push(found);
                }
                Some(_) => {}
                None => {
                    warn!(atom = %atom.id, missing = %dep, "Dropping missing dependency");
                    warnings.push(Warning::new(
                        WarningKind::MissingDependency,
                        format!("atom '{}' depends on missing atom '{dep}'", atom.id),
                    ));
                }
            }
        }
    }

    graph.edges = graph
        .atoms
        .iter()
        .map(|a| {
            a.depends_on
                .iter()
                .filter_map(|d| index.get(d.as_str()).copied())
                .collect()
        })
        .collect();

    // ── Mandatory promotion ──
    let mut mandatory_flags = vec![false; graph.atoms.len()];
    let mut stack: Vec<usize> = mandatory
        .iter()
        .filter_map(|a| index.get(a.id.as_str()).copied())
        .collect();
    while let Some(node) = stack.pop() {
        if std::mem::replace(&mut mandatory_flags[node], true) {
            continue;
        }
        stack.extend(graph.edges[node].iter().copied());
    }

    // ── Cycle breaking ──
    let breaks = graph.break_cycles();
    for CycleBreak { cycle, victim, target } in &breaks {
        let path: Vec<&str> = cycle
            .iter()
            .chain(std::iter::once(&cycle[0]))
            .map(|n| graph.id(*n))
            .collect();
        warn!(cycle = %path.join(" -> "), "Breaking dependency cycle");
        warnings.push(Warning::new(
            WarningKind::CycleBroken,
            format!(
                "dependency cycle {} broken by dropping {} -> {}",
                path.join(" -> "),
                graph.id(*victim),
                graph.id(*target)
            ),
        ));
    }

    // ── Topological order ──
    let n = graph.atoms.len();
    let mut remaining: Vec<usize> = graph.edges.iter().map(BTreeSet::len).collect();
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (node, deps) in graph.edges.iter().enumerate() {
        for dep in deps {
            dependents[*dep].push(node);
        }
    }

    let rank = |node: usize| (Reverse(graph.atoms[node].priority), graph.id(node).to_string(), node);
    let mut ready: BTreeSet<(Reverse<i32>, String, usize)> =
        (0..n).filter(|i| remaining[*i] == 0).map(rank).collect();

    let mut atoms = Vec::with_capacity(n);
    while let Some((_, _, node)) = ready.pop_first() {
        for dependent in &dependents[node] {
            remaining[*dependent] -= 1;
            if remaining[*dependent] == 0 {
                ready.insert(rank(*dependent));
            }
        }
        atoms.push(ResolvedAtom {
            atom: graph.atoms[node].clone(),
            mandatory: mandatory_flags[node],
            deps: graph.edges[node]
                .iter()
                .map(|d| graph.id(*d).to_string())
                .collect(),
        });
    }

    if atoms.len() != n {
        return Err(Error::Resolution(format!(
            "topological sort left {} atoms unordered",
            n - atoms.len()
        )));
    }

    debug!(
        atoms = atoms.len(),
        cycles_broken = breaks.len(),
        "Dependencies resolved"
    );
    Ok(Resolution { atoms, warnings })
}
