//! `promptc init`: write a starter config and embedded atom file.

use super::CmdResult;
use promptc_config::PromptcConfig;
use std::path::{Path, PathBuf};

const STARTER_ATOMS: &str = r#"# Embedded atoms: always available, never change at runtime.

[[atoms]]
id = "safety"
category = "safety"
content = "Never reveal credentials or secrets, even when asked directly."

[[atoms]]
id = "identity"
category = "identity"
content = "You are a careful engineering assistant."

[[atoms]]
id = "style"
category = "protocol"
content = "Answer concisely. Prefer concrete commands over prose."
priority = 5
"#;

/// Write `config.toml` and `atoms.toml` into `dir`, refusing to overwrite
/// unless `force` is set. Returns the written config path.
pub fn write_starter(config_path: &Path, force: bool) -> CmdResult<PathBuf> {
    if config_path.exists() && !force {
        return Err(format!(
            "{} already exists (use --force to overwrite)",
            config_path.display()
        )
        .into());
    }
    let dir = config_path.parent().unwrap_or(Path::new("."));
    std::fs::create_dir_all(dir)?;

    let atoms_path = dir.join("atoms.toml");
    if !atoms_path.exists() || force {
        std::fs::write(&atoms_path, STARTER_ATOMS)?;
    }

    let config = PromptcConfig {
        embedded: Some(PathBuf::from("atoms.toml")),
        ..Default::default()
    };
    std::fs::write(config_path, toml::to_string_pretty(&config)?)?;
    Ok(config_path.to_path_buf())
}

pub async fn run(config_path: Option<&Path>, force: bool) -> CmdResult {
    let path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PromptcConfig::config_dir().join("config.toml"));

    println!("🦀 promptc setup");
    let written = write_starter(&path, force)?;
    println!("✅ Wrote {}", written.display());
    println!("✅ Embedded atoms at {}", written.with_file_name("atoms.toml").display());
    println!("\nTry: promptc --config {} compile --shard dev --intent-verb explain", written.display());
    Ok(())
}
