/// Configuration module for mettarag.
///
/// Handles loading, validating, and providing default configuration values.
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::deps::DependencyExpander;

pub const DEFAULT_CONFIG_PATH: &str = "config.json";

// ── Default value functions ──────────────────────────────────────────

fn default_db_path() -> String {
    "./chunks.db".to_string()
}

fn default_search_top_k() -> usize {
    5
}

fn default_max_chunk_size() -> usize {
    1500
}

fn default_max_depth() -> usize {
    crate::deps::expander::DEFAULT_MAX_DEPTH
}

fn default_timeout_ms() -> u64 {
    2000
}

fn default_batch_size() -> usize {
    crate::deps::resolver::DEFAULT_BATCH_SIZE
}

fn default_true() -> bool {
    true
}

fn default_model_repo() -> String {
    "sentence-transformers/all-MiniLM-L6-v2".to_string()
}

fn default_model_dir() -> String {
    "models/all-MiniLM-L6-v2".to_string()
}

fn default_dimensions() -> usize {
    crate::db::EMBEDDING_DIMENSIONS
}

// ── Config structs ───────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    #[serde(default = "default_search_top_k")]
    pub search_top_k: usize,

    /// Upper bound, in characters, for packing code forms into one chunk.
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: usize,

    #[serde(default)]
    pub dependencies: DependencyConfig,

    #[serde(default)]
    pub model: ModelConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ModelConfig {
    /// HuggingFace repository the ONNX export is fetched from.
    #[serde(default = "default_model_repo")]
    pub repo: String,

    #[serde(default = "default_model_dir")]
    pub dir: String,

    #[serde(default = "default_dimensions")]
    pub dimensions: usize,

    /// Fetch missing model files on startup.
    #[serde(default = "default_true")]
    pub auto_download: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct DependencyConfig {
    /// Dependency hops followed beyond the retrieved chunks.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Wall-clock budget for one expansion.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Page size of the batch resolver.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_true")]
    pub expand_on_search: bool,
}

// ── Default impls ────────────────────────────────────────────────────

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            search_top_k: default_search_top_k(),
            max_chunk_size: default_max_chunk_size(),
            dependencies: DependencyConfig::default(),
            model: ModelConfig::default(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            repo: default_model_repo(),
            dir: default_model_dir(),
            dimensions: default_dimensions(),
            auto_download: default_true(),
        }
    }
}

impl Default for DependencyConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            timeout_ms: default_timeout_ms(),
            batch_size: default_batch_size(),
            expand_on_search: default_true(),
        }
    }
}

// ── Config implementation ────────────────────────────────────────────

impl DependencyConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// An expander using these settings, optionally overriding the depth.
    #[must_use]
    pub fn expander(&self, max_depth: Option<usize>) -> DependencyExpander {
        DependencyExpander::new(max_depth.unwrap_or(self.max_depth), self.timeout())
    }
}

impl Config {
    /// Load configuration from a JSON file.
    ///
    /// If `config_path` is empty, defaults to `"config.json"`.
    /// If the file does not exist, returns a default config and optionally
    /// generates a template file.
    pub fn load(config_path: &str) -> Result<Self> {
        let path = if config_path.is_empty() {
            DEFAULT_CONFIG_PATH
        } else {
            config_path
        };

        if !Path::new(path).exists() {
            info!("{path} not found, using defaults");
            let cfg = Self::default();

            // Generate template only for the default path
            if path == DEFAULT_CONFIG_PATH {
                match cfg.save(path) {
                    Ok(()) => info!("Generated config template: {path}"),
                    Err(e) => warn!("Failed to generate config template: {e}"),
                }
            }

            return Ok(cfg);
        }

        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {path}"))?;

        let cfg: Config = match serde_json::from_str(&data) {
            Ok(c) => c,
            Err(e) => {
                warn!("Invalid JSON in {path}: {e}");
                warn!("Using default configuration");
                return Ok(Self::default());
            }
        };

        info!("Loaded configuration from {path}");
        Ok(cfg)
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &str) -> Result<()> {
        let data = serde_json::to_string_pretty(self).context("failed to marshal config")?;
        std::fs::write(path, data).with_context(|| format!("failed to write config: {path}"))?;
        Ok(())
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(!self.db_path.is_empty(), "db_path must not be empty");
        anyhow::ensure!(self.search_top_k > 0, "search_top_k must be positive");
        anyhow::ensure!(self.max_chunk_size > 0, "max_chunk_size must be positive");
        anyhow::ensure!(
            self.dependencies.batch_size > 0,
            "dependencies.batch_size must be positive"
        );
        anyhow::ensure!(
            self.dependencies.timeout_ms > 0,
            "dependencies.timeout_ms must be positive"
        );
        anyhow::ensure!(
            self.model.dimensions == crate::db::EMBEDDING_DIMENSIONS,
            "model.dimensions must be {} to match the vector index",
            crate::db::EMBEDDING_DIMENSIONS
        );
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────────
