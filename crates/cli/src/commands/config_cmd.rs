//! `promptc config`: configuration inspection.

use super::{CmdResult, load_config};
use promptc_config::PromptcConfig;
use std::path::Path;

pub async fn validate(config_path: Option<&Path>) -> CmdResult {
    println!("🔍 Validating configuration...");

    match load_config(config_path) {
        Ok(config) => {
            println!("   ✅ Config parsed successfully");

            let mut warnings = Vec::new();
            if config.embedded.is_none() {
                warnings.push("No embedded atom file; only stores will be compiled".to_string());
            }
            for path in config.embedded.iter().chain(config.facts.iter()) {
                if !path.exists() {
                    warnings.push(format!("{} does not exist", path.display()));
                }
            }
            for store in config.stores.iter().filter(|s| s.enabled) {
                if !store.path.exists() {
                    warnings.push(format!("store '{}': {} does not exist", store.name, store.path.display()));
                }
            }
            if config.compiler.default_budget <= 0 {
                warnings.push("default_budget <= 0 compiles mandatory atoms only".to_string());
            }

            if warnings.is_empty() {
                println!("   ✅ All checks passed");
            } else {
                println!();
                for w in &warnings {
                    println!("   ⚠️  {w}");
                }
            }

            println!();
            println!("   Budget:    {}", config.compiler.default_budget);
            println!("   Cache:     {}", config.compiler.cache_capacity);
            println!("   Stores:    {}", config.stores.len());
            println!(
                "   Engine:    {}",
                if config.facts.is_some() { "fact store" } else { "none" }
            );
        }
        Err(e) => {
            println!("   ❌ Config error: {e}");
            return Err(e);
        }
    }

    Ok(())
}

pub async fn show(config_path: Option<&Path>) -> CmdResult {
    let config = load_config(config_path)?;
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

pub async fn path(config_path: Option<&Path>) -> CmdResult {
    let path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PromptcConfig::config_dir().join("config.toml"));
    println!("{}", path.display());
    Ok(())
}
