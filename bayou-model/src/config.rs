//! Model hyper-parameters read from `config.json`.

use std::path::Path;

use bayou_core::EvidenceKind;
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};

/// One evidence encoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceConfig {
    pub kind: EvidenceKind,
    /// Hidden units of the dense layer.
    pub units: usize,
    /// Standard deviation of this evidence's encoding; its precision is `1/σ²`.
    pub sigma: f32,
}

/// Configuration for the encoder/decoder pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Size of the latent intent vector.
    pub latent_size: usize,
    /// Decoder hidden state size.
    pub units: usize,
    /// Decoder symbol embedding size.
    #[serde(default = "default_embedding_size")]
    pub embedding_size: usize,
    /// Rows per decoding step; equals the beam width.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    pub evidence: Vec<EvidenceConfig>,
}

fn default_embedding_size() -> usize {
    128
}

fn default_batch_size() -> usize {
    10
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            latent_size: 256,
            units: 256,
            embedding_size: default_embedding_size(),
            batch_size: default_batch_size(),
            evidence: vec![
                EvidenceConfig {
                    kind: EvidenceKind::ApiCalls,
                    units: 64,
                    sigma: 0.1,
                },
                EvidenceConfig {
                    kind: EvidenceKind::Types,
                    units: 32,
                    sigma: 0.1,
                },
                EvidenceConfig {
                    kind: EvidenceKind::Keywords,
                    units: 64,
                    sigma: 0.1,
                },
            ],
        }
    }
}

impl ModelConfig {
    /// Load configuration from a JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject sizes of zero, non-positive sigmas and repeated evidence kinds.
    pub fn validate(&self) -> Result<()> {
        let sizes = [
            ("latent_size", self.latent_size),
            ("units", self.units),
            ("embedding_size", self.embedding_size),
            ("batch_size", self.batch_size),
        ];
        if let Some((name, _)) = sizes.iter().find(|(_, v)| *v == 0) {
            return Err(ModelError::ConfigError {
                message: format!("{} must be positive", name),
            });
        }

        let mut seen = Vec::with_capacity(self.evidence.len());
        for evidence in &self.evidence {
            if seen.contains(&evidence.kind) {
                return Err(ModelError::ConfigError {
                    message: format!("evidence '{}' is configured twice", evidence.kind),
                });
            }
            seen.push(evidence.kind);
            if evidence.units == 0 || !(evidence.sigma > 0.0 && evidence.sigma.is_finite()) {
                return Err(ModelError::ConfigError {
                    message: format!(
                        "evidence '{}' needs positive units and sigma",
                        evidence.kind
                    ),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(ModelConfig::default().validate().is_ok());
    }

    #[test]
    fn test_parse_with_defaults() {
        let json = r#"{
            "latent_size": 32,
            "units": 16,
            "evidence": [{"kind": "api_calls", "units": 8, "sigma": 0.5}]
        }"#;
        let config: ModelConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.embedding_size, 128);
        assert_eq!(config.evidence[0].kind, EvidenceKind::ApiCalls);
    }

    #[test]
    fn test_rejects_bad_sigma_and_duplicates() {
        let mut config = ModelConfig::default();
        config.evidence[0].sigma = 0.0;
        assert!(config.validate().is_err());

        let mut config = ModelConfig::default();
        let first = config.evidence[0].clone();
        config.evidence.push(first);
        assert!(config.validate().is_err());
    }
}
