//! Subcommand implementations and the shared startup path.

pub mod check;
pub mod compile;
pub mod config_cmd;
pub mod init;

use promptc_compiler::Compiler;
use promptc_config::PromptcConfig;
use promptc_core::atom::{Atom, AtomOrigin};
use promptc_sources::facts::FactFile;
use promptc_sources::{EmbeddedSource, FactStore, FileStore, SimilarityIndex, read_atom_file};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

type CmdResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

/// Load the config from an explicit path, or from the default location
/// with environment overrides.
pub fn load_config(path: Option<&Path>) -> CmdResult<PromptcConfig> {
    let config = match path {
        Some(p) => PromptcConfig::load_path(p)?,
        None => PromptcConfig::load()?,
    };
    Ok(config)
}

/// Read the embedded atom file named by the config, if any.
pub fn load_embedded(config: &PromptcConfig) -> CmdResult<EmbeddedSource> {
    let Some(path) = &config.embedded else {
        return Ok(EmbeddedSource::default());
    };
    let contents = read_atom_file(path)?;
    if let Some(first) = contents.skipped.first() {
        return Err(format!("{}: {first}", path.display()).into());
    }
    let source = EmbeddedSource::try_from_records(contents.records)
        .map_err(|e| format!("{}: {e}", path.display()))?;
    debug!(path = %path.display(), atoms = source.len(), "Loaded embedded atoms");
    Ok(source)
}

/// Build a compiler from config: embedded atoms, enabled stores, the fact
/// engine and the similarity index.
pub async fn build_compiler(config: &PromptcConfig) -> CmdResult<Compiler> {
    let embedded = load_embedded(config)?;
    let mut compiler = Compiler::new(config, embedded.clone());

    if let Some(path) = &config.facts {
        let engine = FactStore::from_file_contents(FactFile::read(path)?);
        compiler = compiler.with_inference_engine(Arc::new(engine));
    }

    if config.compiler.similarity_index {
        let index = SimilarityIndex::new();
        index.index_atoms(embedded.atoms()).await;
        for store in config.stores.iter().filter(|s| s.enabled) {
            match read_atom_file(&store.path) {
                Ok(contents) => {
                    let origin = AtomOrigin::Store(store.name.clone());
                    let atoms: Vec<Atom> = contents
                        .records
                        .into_iter()
                        .filter_map(|r| r.into_atom(origin.clone()).ok())
                        .collect();
                    index.index_atoms(&atoms).await;
                }
                Err(e) => warn!(store = %store.name, error = %e, "Not indexing store"),
            }
        }
        compiler = compiler.with_similarity(Arc::new(index));
    }

    for store in config.stores.iter().filter(|s| s.enabled) {
        compiler
            .register_store(store.name.clone(), Arc::new(FileStore::new(&store.path)))
            .await?;
    }
    Ok(compiler)
}
