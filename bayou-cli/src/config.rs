//! Bayou configuration loading from `.bayourc.toml`.
//!
//! Configuration is optional. Every field has a default and command-line
//! flags override whatever the file sets.
//!
//! # Example Configuration
//!
//! ```toml
//! [database]
//! dimension = 256
//! threads = 8
//! shard_capacity = 10000
//! min_files = 1
//! max_files = 40
//! embedding_field = "b2"
//! timeout_secs = 600
//!
//! [search]
//! top_k = 10
//! batch_size = 10
//! metric = "squared_euclidean"
//!
//! [beam]
//! beam_width = 10
//! max_rounds = 20
//!
//! [output]
//! format = "table"
//! color = true
//! ```

use serde::Deserialize;
use std::path::Path;

use bayou_core::beam::DEFAULT_MAX_ROUNDS;
use bayou_core::corpus::{DEFAULT_DIMENSION, DEFAULT_EMBEDDING_FIELD};
use bayou_core::database::DEFAULT_SHARD_CAPACITY;
use bayou_core::query::DEFAULT_BATCH_SIZE;
use bayou_core::search::DEFAULT_TOP_K;
use bayou_core::Metric;

/// File name looked up in the working directory.
pub const CONFIG_FILE: &str = ".bayourc.toml";

/// Root configuration structure loaded from `.bayourc.toml`.
#[derive(Debug, Deserialize, Default)]
pub struct BayouConfig {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub beam: BeamSettings,

    #[serde(default)]
    pub output: OutputSettings,
}

/// Corpus loading settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Embedding dimension of every record.
    pub dimension: usize,

    /// Loader and scanner threads; 0 uses all cores.
    pub threads: usize,

    /// Maximum records per shard.
    pub shard_capacity: usize,

    /// First corpus file to read (1-based, sorted by path).
    pub min_files: usize,

    /// Last corpus file to read, inclusive.
    pub max_files: Option<usize>,

    /// Name of the embedding field in program objects.
    pub embedding_field: String,

    /// Files not started within this many seconds are skipped.
    pub timeout_secs: Option<u64>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            dimension: DEFAULT_DIMENSION,
            threads: 0,
            shard_capacity: DEFAULT_SHARD_CAPACITY,
            min_files: 1,
            max_files: None,
            embedding_field: DEFAULT_EMBEDDING_FIELD.to_string(),
            timeout_secs: None,
        }
    }
}

/// Retrieval settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub top_k: usize,
    pub batch_size: usize,
    pub metric: Metric,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            batch_size: DEFAULT_BATCH_SIZE,
            metric: Metric::default(),
        }
    }
}

/// Beam-search settings. `beam_width` defaults to the model's batch size.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct BeamSettings {
    pub beam_width: Option<usize>,
    pub max_rounds: usize,
}

impl Default for BeamSettings {
    fn default() -> Self {
        Self {
            beam_width: None,
            max_rounds: DEFAULT_MAX_ROUNDS,
        }
    }
}

/// Output formatting preferences.
///
/// Command-line flags (e.g., `--format json`) override these settings.
#[derive(Debug, Deserialize, Default)]
pub struct OutputSettings {
    /// Valid values: `table`, `json`
    #[serde(default)]
    pub format: Option<String>,

    /// Defaults to `true` when stdout is a TTY.
    #[serde(default)]
    pub color: Option<bool>,
}

impl BayouConfig {
    /// Load `.bayourc.toml` from `root`.
    ///
    /// Missing or unparsable files give the defaults; problems are logged
    /// as warnings.
    pub fn load(root: &Path) -> Self {
        Self::load_file(&root.join(CONFIG_FILE))
    }

    /// Load an explicit configuration file, falling back to defaults.
    pub fn load_file(config_path: &Path) -> Self {
        if config_path.exists() {
            match std::fs::read_to_string(config_path) {
                Ok(content) => match toml::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse {}: {}", config_path.display(), e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read {}: {}", config_path.display(), e);
                }
            }
        }
        Self::default()
    }

    /// Get the default output format, if configured.
    pub fn default_format(&self) -> Option<&str> {
        self.output.format.as_deref()
    }

    /// Returns the configured value, or `None` to use auto-detection.
    pub fn use_color(&self) -> Option<bool> {
        self.output.color
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BayouConfig::default();
        assert_eq!(config.database.dimension, 256);
        assert_eq!(config.database.min_files, 1);
        assert_eq!(config.search.top_k, 5);
        assert_eq!(config.search.metric, Metric::SquaredEuclidean);
        assert_eq!(config.beam.max_rounds, 20);
        assert!(config.output.format.is_none());
    }

    #[test]
    fn test_parse_full_config() {
        let toml_content = r#"
[database]
dimension = 64
threads = 4
shard_capacity = 500
min_files = 2
max_files = 9
embedding_field = "b2"
timeout_secs = 30

[search]
top_k = 10
batch_size = 4
metric = "cosine"

[beam]
beam_width = 3
max_rounds = 12

[output]
format = "json"
color = false
"#;
        let config: BayouConfig = toml::from_str(toml_content).unwrap();

        assert_eq!(config.database.dimension, 64);
        assert_eq!(config.database.max_files, Some(9));
        assert_eq!(config.database.embedding_field, "b2");
        assert_eq!(config.database.timeout_secs, Some(30));
        assert_eq!(config.search.metric, Metric::Cosine);
        assert_eq!(config.beam.beam_width, Some(3));
        assert_eq!(config.default_format(), Some("json"));
        assert_eq!(config.use_color(), Some(false));
    }

    #[test]
    fn test_partial_section_keeps_defaults() {
        let config: BayouConfig = toml::from_str("[database]\nthreads = 2\n").unwrap();
        assert_eq!(config.database.threads, 2);
        assert_eq!(config.database.dimension, 256);
        assert_eq!(config.database.shard_capacity, 10_000);
    }

    #[test]
    fn test_load_falls_back_on_bad_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "[search\ntop_k = ").unwrap();
        let config = BayouConfig::load(dir.path());
        assert_eq!(config.search.top_k, 5);

        std::fs::write(dir.path().join(CONFIG_FILE), "[search]\ntop_k = 7\n").unwrap();
        assert_eq!(BayouConfig::load(dir.path()).search.top_k, 7);
    }
}
