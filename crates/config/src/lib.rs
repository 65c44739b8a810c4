//! Configuration loading, validation, and management for promptc.
//!
//! Loads configuration from `~/.promptc/config.toml` (or an explicit path)
//! with environment variable overrides. Validates all settings at startup.

use promptc_core::AtomCategory;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The root configuration structure.
///
/// Maps directly to `~/.promptc/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptcConfig {
    /// Path to the embedded (immutable) atom file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedded: Option<PathBuf>,

    /// Path to a fact file for the built-in inference engine
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facts: Option<PathBuf>,

    /// Compiler tuning
    #[serde(default)]
    pub compiler: CompilerConfig,

    /// Deadlines for the pipeline and its collaborators
    #[serde(default)]
    pub timeouts: TimeoutConfig,

    /// File-backed external stores registered at startup
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stores: Vec<StoreConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompilerConfig {
    /// Budget used when a request does not specify one
    #[serde(default = "default_budget")]
    pub default_budget: i64,

    /// Content length cap applied before token estimation
    #[serde(default = "default_max_atom_chars")]
    pub max_atom_chars: usize,

    /// Maximum cached results (0 = unbounded)
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// Categories that are mandatory regardless of how the source tagged them
    #[serde(default = "default_always_include")]
    pub always_include: Vec<AtomCategory>,

    /// Number of similarity hits requested per compilation
    #[serde(default = "default_similarity_top_k")]
    pub similarity_top_k: usize,

    /// Similarity hits below this score are ignored
    #[serde(default = "default_similarity_min_score")]
    pub similarity_min_score: f32,

    /// Build the in-process similarity index over the corpus at startup
    #[serde(default)]
    pub similarity_index: bool,
}

fn default_budget() -> i64 {
    4096
}
fn default_max_atom_chars() -> usize {
    16 * 1024
}
fn default_cache_capacity() -> usize {
    1024
}
fn default_always_include() -> Vec<AtomCategory> {
    vec![AtomCategory::Safety, AtomCategory::Identity]
}
fn default_similarity_top_k() -> usize {
    8
}
fn default_similarity_min_score() -> f32 {
    0.1
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            default_budget: default_budget(),
            max_atom_chars: default_max_atom_chars(),
            cache_capacity: default_cache_capacity(),
            always_include: default_always_include(),
            similarity_top_k: default_similarity_top_k(),
            similarity_min_score: default_similarity_min_score(),
            similarity_index: false,
        }
    }
}

/// Timeouts in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Overall deadline for one compilation
    #[serde(default = "default_compile_ms")]
    pub compile_ms: u64,

    /// Per-store read deadline
    #[serde(default = "default_store_ms")]
    pub store_ms: u64,

    /// Per-call inference engine deadline
    #[serde(default = "default_inference_ms")]
    pub inference_ms: u64,

    /// Similarity search deadline
    #[serde(default = "default_similarity_ms")]
    pub similarity_ms: u64,
}

fn default_compile_ms() -> u64 {
    5_000
}
fn default_store_ms() -> u64 {
    1_000
}
fn default_inference_ms() -> u64 {
    500
}
fn default_similarity_ms() -> u64 {
    500
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            compile_ms: default_compile_ms(),
            store_ms: default_store_ms(),
            inference_ms: default_inference_ms(),
            similarity_ms: default_similarity_ms(),
        }
    }
}

impl TimeoutConfig {
    pub fn compile(&self) -> Duration {
        Duration::from_millis(self.compile_ms)
    }
    pub fn store(&self) -> Duration {
        Duration::from_millis(self.store_ms)
    }
    pub fn inference(&self) -> Duration {
        Duration::from_millis(self.inference_ms)
    }
    pub fn similarity(&self) -> Duration {
        Duration::from_millis(self.similarity_ms)
    }
}

/// A file-backed store registered under `name`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub name: String,
    pub path: PathBuf,

    /// Whether to register this store at startup (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl PromptcConfig {
    /// Load configuration from `PROMPTC_CONFIG` or the default path
    /// (`~/.promptc/config.toml`), then apply environment overrides:
    ///
    /// - `PROMPTC_BUDGET`: default token budget
    /// - `PROMPTC_CACHE_CAPACITY`: cache capacity
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("PROMPTC_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| Self::config_dir().join("config.toml"));
        Self::load_path(&path)
    }

    /// Load from `path`, then apply environment overrides and validate.
    pub fn load_path(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    ///
    /// Relative store and embedded paths are resolved against the config
    /// file's directory.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".promptc")
    }

    fn resolve_paths(&mut self, base: &Path) {
        for path in [self.embedded.as_mut(), self.facts.as_mut()].into_iter().flatten() {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
        for store in &mut self.stores {
            if store.path.is_relative() {
                store.path = base.join(&store.path);
            }
        }
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(raw) = std::env::var("PROMPTC_BUDGET") {
            self.compiler.default_budget = raw.trim().parse().map_err(|_| {
                ConfigError::ValidationError(format!("PROMPTC_BUDGET is not an integer: {raw:?}"))
            })?;
        }
        if let Ok(raw) = std::env::var("PROMPTC_CACHE_CAPACITY") {
            self.compiler.cache_capacity = raw.trim().parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "PROMPTC_CACHE_CAPACITY is not a non-negative integer: {raw:?}"
                ))
            })?;
        }
        Ok(())
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.timeouts;
        if t.compile_ms == 0 || t.store_ms == 0 || t.inference_ms == 0 || t.similarity_ms == 0 {
            return Err(ConfigError::ValidationError(
                "timeouts must all be greater than 0 ms".into(),
            ));
        }

        let score = self.compiler.similarity_min_score;
        if !(0.0..=1.0).contains(&score) {
            return Err(ConfigError::ValidationError(
                "similarity_min_score must be between 0.0 and 1.0".into(),
            ));
        }

        let mut seen = HashSet::new();
        for store in &self.stores {
            if store.name.trim().is_empty() {
                return Err(ConfigError::ValidationError("store name must not be empty".into()));
            }
            if !seen.insert(store.name.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate store name: {}",
                    store.name
                )));
            }
        }

        Ok(())
    }

    /// Generate a default config TOML string (for `init`).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
