//! Bayou core - program retrieval and AST synthesis.
//!
//! This crate holds everything that runs at query time around the trained
//! model:
//!
//! - **Corpus reader**: parallel, streaming load of program JSON files into
//!   column shards
//! - **Column database**: ordered shards of records plus dense embedding
//!   matrices
//! - **Top-K scanner**: brute-force nearest-neighbour search across shards on
//!   a rayon pool, with deterministic tie-breaking
//! - **Beam search**: AST decoding over an injected [`beam::ScoringOracle`]
//! - **Evaluation**: precision, first-hit and MRR statistics for labelled
//!   query sets
//!
//! # Usage
//!
//! ```rust,no_run
//! use bayou_core::{CorpusReader, LoaderConfig, QueryBatch, QueryEntry, Scanner};
//!
//! let corpus = CorpusReader::new(LoaderConfig::new("data/programs", 256).with_threads(8))
//!     .read_all()?;
//! let batch = QueryBatch::single(vec![QueryEntry::new(vec![0.0; 256])], 256)?;
//! let results = Scanner::new(&corpus.database, 5).search_and_top_k_parallel(&batch, 8)?;
//! for hit in &results[0].hits {
//!     println!("{} {} {:.4}", hit.record.file_name, hit.record.method_name, hit.score);
//! }
//! # Ok::<(), bayou_core::CoreError>(())
//! ```

pub mod ast;
pub mod beam;
pub mod corpus;
pub mod database;
mod error;
pub mod evaluation;
pub mod evidence;
pub mod query;
pub mod search;
pub mod types;

pub use ast::{AstNode, SynthesizedAst};
pub use beam::{synthesize, BeamConfig, BeamSearch, ScoringOracle, Vocabulary};
pub use corpus::{CorpusReader, LoadReport, LoadedCorpus, LoaderConfig};
pub use database::{ColumnDatabase, ColumnShard, ShardBuilder};
pub use error::{CoreError, Result};
pub use evaluation::{Desired, PrecisionReport, PrecisionTracker};
pub use evidence::{Evidence, EvidenceKind, EvidenceSet};
pub use query::{PaddingPolicy, QueryBatch, QueryEntry, QuerySlot};
pub use search::{Hit, Metric, RankedResult, Scanner};
pub use types::{EvalLabels, ProgramRecord};
