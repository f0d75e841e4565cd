//! Error types for bayou-core.

use thiserror::Error;

/// Result type alias for bayou-core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors that can occur while loading, searching or decoding.
#[derive(Error, Debug)]
pub enum CoreError {
    /// A corpus object could not be turned into a program record.
    #[error("Corpus parse error in {file}: {message}")]
    CorpusParse {
        /// File the object came from.
        file: String,
        /// Description of the problem.
        message: String,
    },

    /// An embedding or query vector has the wrong length.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension required by the shard, batch or database.
        expected: usize,
        /// Dimension actually supplied.
        actual: usize,
    },

    /// An embedding contains NaN or infinite values.
    #[error("Embedding has a non-finite value at position {position}")]
    NonFiniteEmbedding {
        /// Index of the first offending value.
        position: usize,
    },

    /// A shard already holds its maximum number of rows.
    #[error("Shard is full ({capacity} rows)")]
    ShardFull {
        /// Capacity of the shard.
        capacity: usize,
    },

    /// A query batch could not be built or does not fit the operation.
    #[error("Invalid batch: {reason}")]
    InvalidBatch {
        /// Why the batch was rejected.
        reason: String,
    },

    /// The scoring oracle returned output that breaks its contract.
    #[error("Scoring oracle contract violation: {reason}")]
    OracleContractViolation {
        /// What was wrong with the oracle output.
        reason: String,
    },

    /// Beam search finished without a single completed candidate.
    #[error("Beam search exhausted after {rounds} rounds without a finished candidate")]
    BeamExhausted {
        /// Number of rounds that were run.
        rounds: usize,
    },

    /// A corpus load produced no usable records.
    #[error("Corpus at {location} produced no valid records")]
    EmptyCorpus {
        /// Location that was read.
        location: String,
    },

    /// A decoder vocabulary is missing a required symbol.
    #[error("Invalid vocabulary: {message}")]
    InvalidVocabulary {
        /// Description of the problem.
        message: String,
    },

    /// The scoring oracle itself failed.
    #[error("Scoring oracle error: {message}")]
    Oracle {
        /// Error reported by the oracle implementation.
        message: String,
    },

    /// IO error reading corpus or query files.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error reading corpus or query files.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    pub(crate) fn contract(reason: impl Into<String>) -> Self {
        CoreError::OracleContractViolation {
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_batch(reason: impl Into<String>) -> Self {
        CoreError::InvalidBatch {
            reason: reason.into(),
        }
    }
}
