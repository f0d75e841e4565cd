//! Command implementations for the Bayou CLI
//!
//! Each command module provides a `run` function. Heavy work runs on the
//! blocking pool, optionally under a whole-operation timeout.

use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Context as _};
use bayou_core::{CorpusReader, LoadedCorpus, LoaderConfig};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};

use crate::config::{BayouConfig, DatabaseConfig};
use crate::constants::SPINNER_TICK_MS;
use crate::output::OutputFormat;

pub mod load;
pub mod precision;
pub mod search;
pub mod synthesize;

/// Resolved global settings shared by every command.
pub struct Context {
    pub config: BayouConfig,
    pub format: OutputFormat,
    pub quiet: bool,
}

/// Corpus loading flags; unset values come from `[database]`.
#[derive(Args, Debug, Default)]
pub struct CorpusArgs {
    /// Embedding dimension
    #[arg(long)]
    pub dimension: Option<usize>,

    /// Worker threads (0 = all cores)
    #[arg(long)]
    pub threads: Option<usize>,

    /// Maximum records per shard
    #[arg(long)]
    pub shard_capacity: Option<usize>,

    /// First corpus file to read (1-based)
    #[arg(long)]
    pub min_files: Option<usize>,

    /// Last corpus file to read (inclusive)
    #[arg(long)]
    pub max_files: Option<usize>,

    /// Name of the embedding field in program objects
    #[arg(long)]
    pub embedding_field: Option<String>,

    /// Skip files not started within this many seconds
    #[arg(long)]
    pub load_timeout_secs: Option<u64>,
}

impl CorpusArgs {
    /// Merge flags over the configured defaults.
    pub fn loader_config(&self, location: &Path, defaults: &DatabaseConfig) -> LoaderConfig {
        let mut loader = LoaderConfig::new(location, self.dimension.unwrap_or(defaults.dimension))
            .with_threads(self.threads.unwrap_or(defaults.threads))
            .with_shard_capacity(self.shard_capacity.unwrap_or(defaults.shard_capacity))
            .with_file_range(
                self.min_files.unwrap_or(defaults.min_files),
                self.max_files.or(defaults.max_files),
            )
            .with_embedding_field(
                self.embedding_field
                    .clone()
                    .unwrap_or_else(|| defaults.embedding_field.clone()),
            );
        if let Some(secs) = self.load_timeout_secs.or(defaults.timeout_secs) {
            loader = loader.with_timeout(Duration::from_secs(secs));
        }
        loader
    }
}

/// Create the standard progress spinner; hidden when `quiet`.
pub fn spinner(message: &str, quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner()
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
        .template("{spinner:.cyan} {msg}")
    {
        spinner.set_style(style);
    }
    spinner.enable_steady_tick(Duration::from_millis(SPINNER_TICK_MS));
    spinner.set_message(message.to_string());
    spinner
}

/// Run `task` on the blocking pool, failing if it outlives `timeout_secs`.
///
/// On timeout the task keeps running detached and its result is dropped.
pub async fn run_blocking<T, F>(timeout_secs: Option<u64>, task: F) -> anyhow::Result<T>
where
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let handle = tokio::task::spawn_blocking(task);
    let joined = match timeout_secs {
        Some(secs) => tokio::time::timeout(Duration::from_secs(secs), handle)
            .await
            .map_err(|_| anyhow!("Operation timed out after {}s", secs))?,
        None => handle.await,
    };
    joined.context("Worker task failed")?
}

/// Load the corpus at `location` on the blocking pool.
pub async fn load_corpus(loader: LoaderConfig, quiet: bool) -> anyhow::Result<LoadedCorpus> {
    let location = loader.location.display().to_string();
    let spinner = spinner(&format!("Loading corpus from {}...", location), quiet);
    let result = run_blocking(None, move || Ok(CorpusReader::new(loader).read_all()?)).await;
    spinner.finish_and_clear();
    result.with_context(|| format!("Failed to load corpus from {}", location))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let defaults = DatabaseConfig {
            max_files: Some(4),
            timeout_secs: Some(9),
            ..DatabaseConfig::default()
        };
        let args = CorpusArgs {
            dimension: Some(8),
            min_files: Some(2),
            ..CorpusArgs::default()
        };
        let loader = args.loader_config(Path::new("corpus"), &defaults);

        assert_eq!(loader.dimension, 8);
        assert_eq!(loader.min_files, 2);
        assert_eq!(loader.max_files, Some(4));
        assert_eq!(loader.timeout, Some(Duration::from_secs(9)));
        assert_eq!(loader.embedding_field, "embedding");
    }

    #[tokio::test]
    async fn test_run_blocking_times_out() {
        let result = run_blocking(Some(0), || {
            std::thread::sleep(Duration::from_millis(200));
            Ok(())
        })
        .await;
        assert!(result.unwrap_err().to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_run_blocking_returns_value() {
        assert_eq!(run_blocking(Some(5), || Ok(7)).await.unwrap(), 7);
    }
}
