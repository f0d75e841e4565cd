//! Bayou CLI - program retrieval and synthesis from the command line
//!
//! Loads a sharded program corpus, ranks it against query embeddings,
//! evaluates retrieval quality and synthesizes ASTs with beam search.

use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;
mod config;
mod constants;
mod output;

use commands::{load, precision, search, synthesize, Context, CorpusArgs};
use config::BayouConfig;
use output::OutputFormat;

/// Parse a positive count.
fn parse_positive(s: &str) -> Result<usize, String> {
    let value: usize = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid number", s))?;
    if value == 0 {
        return Err("value must be at least 1".to_string());
    }
    Ok(value)
}

/// Code search and synthesis over a Bayou program corpus.
#[derive(Parser)]
#[command(name = "bayou")]
#[command(author, version)]
#[command(about = "Code search and synthesis over a Bayou program corpus")]
#[command(propagate_version = true)]
#[command(after_help = "Examples:
  bayou load data/programs                  Load a corpus and report counts
  bayou search data/programs queries.json   Rank programs for each query
  bayou precision data/programs labelled.json --top-k 10
  bayou synthesize models/bayou evidence.json --beam-width 10")]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Output format (overrides config default)
    #[arg(long, global = true, value_enum)]
    format: Option<OutputFormat>,

    /// Configuration file (defaults to ./.bayourc.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a corpus and print the load report
    Load {
        /// Corpus directory or file
        db: PathBuf,

        #[command(flatten)]
        corpus: CorpusArgs,
    },

    /// Rank corpus programs for every query embedding
    #[command(visible_alias = "s")]
    Search {
        /// Corpus directory or file
        db: PathBuf,

        /// Query file (`psis_encs` or `programs` JSON)
        queries: PathBuf,

        #[command(flatten)]
        corpus: CorpusArgs,

        /// Results per query
        #[arg(short = 'k', long, value_parser = parse_positive)]
        top_k: Option<usize>,

        /// Queries per batch; the last batch is padded
        #[arg(long, value_parser = parse_positive)]
        batch_size: Option<usize>,

        /// Similarity metric: squared_euclidean, inner_product, cosine
        #[arg(long)]
        metric: Option<String>,

        /// Abort the whole search after this many seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// Evaluate retrieval against labelled queries
    Precision {
        /// Corpus directory or file
        db: PathBuf,

        /// Labelled query file (`programs` JSON)
        queries: PathBuf,

        #[command(flatten)]
        corpus: CorpusArgs,

        /// Results per query
        #[arg(short = 'k', long, value_parser = parse_positive)]
        top_k: Option<usize>,

        /// Cut-offs to report, comma separated (default 1..=10 up to top-k)
        #[arg(long, value_delimiter = ',', value_parser = parse_positive)]
        hit_points: Vec<usize>,

        /// Write the top programs of every query to this JSONL file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Abort the whole evaluation after this many seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// Synthesize ASTs for an evidence query
    Synthesize {
        /// Model directory (config.json, vocab.json, model.safetensors)
        model_dir: PathBuf,

        /// Evidence JSON object
        evidence: PathBuf,

        /// Beam width; resizes the model's decoder batch (defaults to its configured size)
        #[arg(long, value_parser = parse_positive)]
        beam_width: Option<usize>,

        /// Maximum decoding rounds
        #[arg(long, value_parser = parse_positive)]
        max_rounds: Option<usize>,
    },
}

fn setup_logging(verbose: bool, quiet: bool) {
    let filter = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "warn"
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    let config = match &cli.config {
        Some(path) => BayouConfig::load_file(path),
        None => BayouConfig::load(std::path::Path::new(".")),
    };

    // CLI flag > config default > Table
    let format = cli.format.unwrap_or_else(|| {
        config
            .default_format()
            .and_then(|f| f.parse().ok())
            .unwrap_or(OutputFormat::Table)
    });

    if let Some(use_color) = config.use_color() {
        colored::control::set_override(use_color);
    }

    let command = match cli.command {
        Some(cmd) => cmd,
        None => {
            let _ = Cli::command().print_help();
            println!();
            return Ok(());
        }
    };

    let ctx = Context {
        config,
        format,
        quiet: cli.quiet,
    };

    match command {
        Commands::Load { db, corpus } => load::run(&ctx, &db, &corpus).await,
        Commands::Search {
            db,
            queries,
            corpus,
            top_k,
            batch_size,
            metric,
            timeout_secs,
        } => {
            let options = search::SearchOptions {
                top_k,
                batch_size,
                metric: metric.as_deref(),
                timeout_secs,
            };
            search::run(&ctx, &db, &queries, &corpus, options).await
        }
        Commands::Precision {
            db,
            queries,
            corpus,
            top_k,
            hit_points,
            output,
            timeout_secs,
        } => {
            let options = precision::PrecisionOptions {
                top_k,
                hit_points,
                output,
                timeout_secs,
            };
            precision::run(&ctx, &db, &queries, &corpus, options).await
        }
        Commands::Synthesize {
            model_dir,
            evidence,
            beam_width,
            max_rounds,
        } => synthesize::run(&ctx, &model_dir, &evidence, beam_width, max_rounds).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_search_flags() {
        let cli = Cli::try_parse_from([
            "bayou", "search", "db", "q.json", "-k", "3", "--threads", "2", "--format", "json",
        ])
        .unwrap();
        assert_eq!(cli.format, Some(OutputFormat::Json));
        match cli.command {
            Some(Commands::Search { top_k, corpus, .. }) => {
                assert_eq!(top_k, Some(3));
                assert_eq!(corpus.threads, Some(2));
            }
            _ => panic!("expected search command"),
        }
    }

    #[test]
    fn test_parse_hit_points() {
        let cli = Cli::try_parse_from(["bayou", "precision", "db", "q.json", "--hit-points", "1,5,10"])
            .unwrap();
        match cli.command {
            Some(Commands::Precision { hit_points, .. }) => assert_eq!(hit_points, vec![1, 5, 10]),
            _ => panic!("expected precision command"),
        }
    }

    #[test]
    fn test_rejects_zero_top_k() {
        assert!(Cli::try_parse_from(["bayou", "search", "db", "q.json", "-k", "0"]).is_err());
    }
}
