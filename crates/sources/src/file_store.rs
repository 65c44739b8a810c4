//! File-backed atom store: TOML or JSON-lines, re-read on every load.
//!
//! The file is the store: edit it, re-register it, and the next compilation
//! sees the change. Format is chosen by extension:
//!
//! - `.toml`: an `[[atoms]]` array of records
//! - anything else: JSON lines, one record per line
//!
//! Corrupt JSON lines are skipped and reported; a TOML parse error fails
//! the whole load.

use async_trait::async_trait;
use promptc_core::atom::AtomRecord;
use promptc_core::error::StoreError;
use promptc_core::source::{AtomStore, StoreContents};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::time::Instant;
use tracing::{debug, warn};

/// On-disk shape of a TOML atom file.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct AtomFile {
    #[serde(default)]
    pub atoms: Vec<AtomRecord>,
}

/// Parse a TOML atom file body.
pub fn parse_toml_atoms(content: &str) -> Result<Vec<AtomRecord>, toml::de::Error> {
    toml::from_str::<AtomFile>(content).map(|f| f.atoms)
}

/// Parse a JSON-lines body, collecting one message per corrupt line.
pub fn parse_jsonl_atoms(content: &str) -> StoreContents {
    let mut contents = StoreContents::default();
    for (index, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<AtomRecord>(line) {
            Ok(record) => contents.records.push(record),
            Err(e) => {
                warn!(line = index + 1, error = %e, "Skipping corrupted atom record");
                contents.skipped.push(format!("line {}: {e}", index + 1));
            }
        }
    }
    contents
}

/// Read an atom file synchronously (used for the embedded set at startup).
pub fn read_atom_file(path: &Path) -> Result<StoreContents, StoreError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| StoreError::Unavailable(path.display().to_string(), e.to_string()))?;
    parse_by_extension(path, &content)
}

fn parse_by_extension(path: &Path, content: &str) -> Result<StoreContents, StoreError> {
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    if is_toml {
        parse_toml_atoms(content)
            .map(StoreContents::new)
            .map_err(|e| StoreError::Malformed {
                store: path.display().to_string(),
                reason: e.to_string(),
            })
    } else {
        Ok(parse_jsonl_atoms(content))
    }
}

/// A store that reads its records from a file on every load.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl AtomStore for FileStore {
    fn kind(&self) -> &str {
        "file"
    }

    async fn load(&self, deadline: Instant) -> Result<StoreContents, StoreError> {
        let label = self.path.display().to_string();
        let started = Instant::now();
        let content = tokio::time::timeout_at(deadline, tokio::fs::read_to_string(&self.path))
            .await
            .map_err(|_| StoreError::Timeout {
                store: label.clone(),
                elapsed_ms: started.elapsed().as_millis() as u64,
            })?
            .map_err(|e| StoreError::Unavailable(label.clone(), e.to_string()))?;

        let contents = parse_by_extension(&self.path, &content)?;
        debug!(
            path = %label,
            records = contents.records.len(),
            skipped = contents.skipped.len(),
            "File store loaded"
        );
        Ok(contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    fn temp_with_suffix(suffix: &str) -> NamedTempFile {
        tempfile::Builder::new().suffix(suffix).tempfile().unwrap()
    }

    fn far_deadline() -> Instant {
        Instant::now() + Duration::from_secs(5)
    }

    #[tokio::test]
    async fn jsonl_skips_corrupt_lines() {
        let mut file = temp_with_suffix(".jsonl");
        writeln!(file, r#"{{"id":"a","category":"knowledge","content":"Alpha"}}"#).unwrap();
        writeln!(file, "{{not json").unwrap();
        writeln!(file).unwrap();
        writeln!(file, r#"{{"id":"b","content":"Beta","depends_on":["a"]}}"#).unwrap();

        let store = FileStore::new(file.path());
        let contents = store.load(far_deadline()).await.unwrap();
        assert_eq!(contents.records.len(), 2);
        assert_eq!(contents.records[1].depends_on, vec!["a".to_string()]);
        assert_eq!(contents.skipped.len(), 1);
        assert!(contents.skipped[0].starts_with("line 2"));
    }

    #[tokio::test]
    async fn toml_file_loads() {
        let mut file = temp_with_suffix(".toml");
        write!(
            file,
            r#"
[[atoms]]
id = "safety"
category = "safety"
content = "Never exfiltrate secrets."
mandatory = true

[[atoms]]
id = "style"
category = "protocol"
content = "Be terse."
priority = 5
"#
        )
        .unwrap();

        let contents = FileStore::new(file.path()).load(far_deadline()).await.unwrap();
        assert_eq!(contents.records.len(), 2);
        assert!(contents.records[0].mandatory);
        assert_eq!(contents.records[1].priority, 5);
    }

    #[tokio::test]
    async fn malformed_toml_is_an_error() {
        let mut file = temp_with_suffix(".toml");
        write!(file, "[[atoms]]\nid = ").unwrap();
        let err = FileStore::new(file.path()).load(far_deadline()).await.unwrap_err();
        assert!(matches!(err, StoreError::Malformed { .. }));
    }

    #[tokio::test]
    async fn missing_file_is_unavailable() {
        let err = FileStore::new("/nonexistent/atoms.jsonl")
            .load(far_deadline())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(..)));
    }

    #[test]
    fn sync_reader_matches_async() {
        let mut file = temp_with_suffix(".toml");
        write!(file, "[[atoms]]\nid = \"a\"\ncontent = \"x\"\n").unwrap();
        let contents = read_atom_file(file.path()).unwrap();
        assert_eq!(contents.records[0].category, "context");
    }
}
