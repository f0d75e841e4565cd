//! Evidence encoder.
//!
//! Each configured evidence kind is encoded independently (multi-hot bag,
//! dense tanh layer, projection to the latent space). The encodings are
//! fused into a Gaussian by precision weighting against a standard-normal
//! prior.

use bayou_core::beam::LatentDistribution;
use bayou_core::{EvidenceKind, EvidenceSet};
use candle_core::{Device, Tensor};
use candle_nn::{linear, Linear, Module, VarBuilder};
use tracing::debug;

use crate::config::ModelConfig;
use crate::error::Result;
use crate::vocab::{ModelVocabulary, TokenIndex};

struct EvidenceEncoder {
    kind: EvidenceKind,
    sigma: f32,
    index: TokenIndex,
    hidden: Linear,
    latent: Linear,
}

impl EvidenceEncoder {
    fn forward(&self, bag: Vec<f32>, device: &Device) -> Result<Vec<f32>> {
        let x = Tensor::from_vec(bag, (1, self.index.len()), device)?;
        let h = self.hidden.forward(&x)?.tanh()?;
        let z = self.latent.forward(&h)?;
        Ok(z.squeeze(0)?.to_vec1::<f32>()?)
    }
}

pub struct Encoder {
    encoders: Vec<EvidenceEncoder>,
    latent_size: usize,
    device: Device,
}

impl Encoder {
    /// Weights live under `encoder.<kind>.{hidden,latent}`.
    pub fn new(config: &ModelConfig, vocab: &ModelVocabulary, vb: VarBuilder) -> Result<Self> {
        let mut encoders = Vec::with_capacity(config.evidence.len());
        for evidence in &config.evidence {
            let index = vocab.evidence_index(evidence.kind)?.clone();
            let vb = vb.pp(evidence.kind.name());
            encoders.push(EvidenceEncoder {
                kind: evidence.kind,
                sigma: evidence.sigma,
                hidden: linear(index.len(), evidence.units, vb.pp("hidden"))?,
                latent: linear(evidence.units, config.latent_size, vb.pp("latent"))?,
                index,
            });
        }
        Ok(Self {
            encoders,
            latent_size: config.latent_size,
            device: vb.device().clone(),
        })
    }

    pub fn encode(&self, evidence: &EvidenceSet) -> Result<LatentDistribution> {
        let mut encodings = Vec::new();
        for encoder in &self.encoders {
            let Some(item) = evidence.get(encoder.kind) else {
                continue;
            };
            let Some(bag) = encoder.index.bag(&item.tokens) else {
                debug!("No known tokens for evidence '{}'", encoder.kind);
                continue;
            };
            encodings.push((encoder.forward(bag, &self.device)?, encoder.sigma));
        }
        debug!("Encoded {} evidence kinds", encodings.len());
        Ok(combine(&encodings, self.latent_size))
    }
}

/// Precision-weighted fusion of `(encoding, sigma)` pairs.
///
/// `mean = Σ(enc/σ²) / (1 + Σ 1/σ²)`, `covariance = 1 / (1 + Σ 1/σ²)`.
/// No encodings gives the prior `N(0, 1)`.
pub fn combine(encodings: &[(Vec<f32>, f32)], latent_size: usize) -> LatentDistribution {
    let mut weighted = vec![0.0f32; latent_size];
    let mut precision = 1.0f32;
    for (encoding, sigma) in encodings {
        let p = 1.0 / (sigma * sigma);
        precision += p;
        for (acc, x) in weighted.iter_mut().zip(encoding) {
            *acc += x * p;
        }
    }
    LatentDistribution {
        mean: weighted.into_iter().map(|w| w / precision).collect(),
        covariance: vec![1.0 / precision; latent_size],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_prior_without_evidence() {
        let latent = combine(&[], 3);
        assert_eq!(latent.mean, vec![0.0; 3]);
        assert_eq!(latent.covariance, vec![1.0; 3]);
    }

    #[test]
    fn test_precision_weighting() {
        // precisions 4 and 1: denominator 6
        let latent = combine(&[(vec![3.0, 0.0], 0.5), (vec![0.0, 6.0], 1.0)], 2);
        assert_relative_eq!(latent.mean[0], 2.0, epsilon = 1e-6);
        assert_relative_eq!(latent.mean[1], 1.0, epsilon = 1e-6);
        assert_relative_eq!(latent.covariance[0], 1.0 / 6.0, epsilon = 1e-6);
    }
}
