//! Error types for bayou-model.

use bayou_core::CoreError;
use thiserror::Error;

/// Result type alias for bayou-model operations.
pub type Result<T> = std::result::Result<T, ModelError>;

/// Errors that can occur while loading or running the model.
#[derive(Error, Debug)]
pub enum ModelError {
    /// Model directory or file not found.
    #[error("Model file not found: {path}")]
    ModelNotFound {
        /// Path that was searched.
        path: String,
    },

    /// Error loading model weights.
    #[error("Failed to load model weights: {message}")]
    WeightLoadError {
        /// Description of the weight loading error.
        message: String,
    },

    /// Invalid model configuration.
    #[error("Invalid model configuration: {message}")]
    ConfigError {
        /// Description of the configuration error.
        message: String,
    },

    /// Decoder vocabulary or evidence vocabulary rejected.
    #[error("Vocabulary error: {message}")]
    VocabularyError {
        /// Description of the vocabulary error.
        message: String,
    },

    /// A step was called with the wrong number of rows.
    #[error("Batch size mismatch: got {actual} rows, model runs {expected}")]
    BatchSizeMismatch {
        /// Configured batch size.
        expected: usize,
        /// Rows received.
        actual: usize,
    },

    /// A vector did not have the expected length.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected length.
        expected: usize,
        /// Received length.
        actual: usize,
    },

    /// IO error reading model files.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON parsing error for config files.
    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Candle tensor operation error.
    #[error("Tensor error: {message}")]
    TensorError {
        /// Description of the tensor error.
        message: String,
    },
}

impl From<candle_core::Error> for ModelError {
    fn from(err: candle_core::Error) -> Self {
        ModelError::TensorError {
            message: err.to_string(),
        }
    }
}

impl From<ModelError> for CoreError {
    fn from(err: ModelError) -> Self {
        CoreError::Oracle {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ModelError::ModelNotFound {
            path: "/path/to/model".to_string(),
        };
        assert!(err.to_string().contains("/path/to/model"));

        let err = ModelError::BatchSizeMismatch {
            expected: 10,
            actual: 3,
        };
        assert!(err.to_string().contains("10"));
        assert!(err.to_string().contains('3'));
    }

    #[test]
    fn test_converts_to_oracle_error() {
        let err: CoreError = ModelError::ConfigError {
            message: "units must be positive".to_string(),
        }
        .into();
        assert!(matches!(err, CoreError::Oracle { .. }));
        assert!(err.to_string().contains("units must be positive"));
    }
}
