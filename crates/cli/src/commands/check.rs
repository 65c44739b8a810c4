//! `promptc check`: lint the configured atom corpus.
//!
//! Reads the embedded file and every enabled store, then reports
//! malformed records, duplicate IDs, missing dependencies and cycles.
//! Exits non-zero when any problem is found.

use super::{CmdResult, load_config};
use promptc_compiler::resolver::resolve;
use promptc_core::atom::{Atom, AtomOrigin};
use promptc_sources::read_atom_file;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Everything `check` found, in discovery order.
#[derive(Debug, Default)]
pub struct CheckReport {
    pub atoms: usize,
    pub problems: Vec<String>,
}

/// Lint a set of `(origin, path)` atom files.
pub fn check_files(files: &[(AtomOrigin, PathBuf)]) -> CheckReport {
    let mut report = CheckReport::default();
    let mut pool: Vec<Atom> = Vec::new();
    let mut seen: HashMap<String, AtomOrigin> = HashMap::new();

    for (origin, path) in files {
        let contents = match read_atom_file(path) {
            Ok(contents) => contents,
            Err(e) => {
                report.problems.push(format!("{origin}: {e}"));
                continue;
            }
        };
        for skipped in contents.skipped {
            report.problems.push(format!("{origin}: {skipped}"));
        }
        for record in contents.records {
            match record.into_atom(origin.clone()) {
                Ok(atom) => {
                    if let Some(first) = seen.get(&atom.id) {
                        report.problems.push(format!(
                            "duplicate atom id '{}' in {first} and {origin}",
                            atom.id
                        ));
                        continue;
                    }
                    seen.insert(atom.id.clone(), origin.clone());
                    pool.push(atom);
                }
                Err(e) => report.problems.push(format!("{origin}: {e}")),
            }
        }
    }

    report.atoms = pool.len();
    match resolve(&pool, &[], &pool) {
        Ok(resolution) => report
            .problems
            .extend(resolution.warnings.into_iter().map(|w| w.message)),
        Err(e) => report.problems.push(e.to_string()),
    }
    report
}

pub async fn run(config_path: Option<&Path>) -> CmdResult {
    let config = load_config(config_path)?;

    let mut files = Vec::new();
    if let Some(path) = &config.embedded {
        files.push((AtomOrigin::Embedded, path.clone()));
    }
    for store in config.stores.iter().filter(|s| s.enabled) {
        files.push((AtomOrigin::Store(store.name.clone()), store.path.clone()));
    }

    println!("🔍 Checking {} atom file(s)...", files.len());
    let report = check_files(&files);

    if report.problems.is_empty() {
        println!("   ✅ {} atoms, no problems", report.atoms);
        return Ok(());
    }
    for problem in &report.problems {
        println!("   ❌ {problem}");
    }
    Err(format!("{} problem(s) found", report.problems.len()).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_every_kind_of_problem() {
        let dir = tempfile::tempdir().unwrap();
        let core = dir.path().join("core.toml");
        std::fs::write(
            &core,
            r#"
[[atoms]]
id = "safety"
category = "safety"
content = "Stay safe."
depends_on = ["ghost"]

[[atoms]]
id = "a"
content = "A"
depends_on = ["b"]

[[atoms]]
id = "b"
content = "B"
depends_on = ["a"]
"#,
        )
        .unwrap();
        let team = dir.path().join("team.jsonl");
        std::fs::write(
            &team,
            "{\"id\":\"safety\",\"content\":\"again\"}\n{\"id\":\"x\",\"category\":\"bogus\",\"content\":\"x\"}\nnot json\n",
        )
        .unwrap();

        let report = check_files(&[
            (AtomOrigin::Embedded, core),
            (AtomOrigin::Store("team".into()), team),
        ]);
        assert_eq!(report.atoms, 3);
        let all = report.problems.join("\n");
        assert!(all.contains("line 3"), "{all}");
        assert!(all.contains("duplicate atom id 'safety'"), "{all}");
        assert!(all.contains("bogus"), "{all}");
        assert!(all.contains("ghost"), "{all}");
        assert!(all.contains("dependency cycle"), "{all}");
    }

    #[test]
    fn clean_corpus_has_no_problems() {
        let dir = tempfile::tempdir().unwrap();
        let core = dir.path().join("core.toml");
        std::fs::write(&core, "[[atoms]]\nid = \"a\"\ncontent = \"A\"\n").unwrap();
        let report = check_files(&[(AtomOrigin::Embedded, core)]);
        assert_eq!(report.atoms, 1);
        assert!(report.problems.is_empty());
    }

    #[test]
    fn unreadable_file_is_a_problem() {
        let report = check_files(&[(AtomOrigin::Embedded, PathBuf::from("/nonexistent/core.toml"))]);
        assert_eq!(report.problems.len(), 1);
    }
}
