//! The Bayou scoring model.

use std::path::Path;

use bayou_core::beam::{DecoderInput, LatentDistribution, ScoringOracle, StepOutput};
use bayou_core::{CoreError, EvidenceSet, Vocabulary};
use candle_core::{DType, Device};
use candle_nn::VarBuilder;
use tracing::{debug, info};

use crate::config::ModelConfig;
use crate::decoder::Decoder;
use crate::encoder::Encoder;
use crate::error::{ModelError, Result};
use crate::vocab::ModelVocabulary;

/// Inference-only encoder/decoder pair.
pub struct BayouModel {
    config: ModelConfig,
    vocab: ModelVocabulary,
    encoder: Encoder,
    decoder: Decoder,
    device: Device,
}

impl BayouModel {
    /// Load model from a directory.
    ///
    /// The directory should contain:
    /// - `config.json`: Model configuration
    /// - `vocab.json`: Decoder and evidence vocabularies
    /// - `model.safetensors`: Model weights
    ///
    /// # Errors
    ///
    /// Returns error if any file is missing or does not match the configuration.
    pub fn load<P: AsRef<Path>>(model_dir: P) -> Result<Self> {
        let model_dir = model_dir.as_ref();
        info!("Loading model from: {}", model_dir.display());

        if !model_dir.exists() {
            return Err(ModelError::ModelNotFound {
                path: model_dir.display().to_string(),
            });
        }

        let config_path = model_dir.join("config.json");
        let config =
            ModelConfig::from_file(&config_path).map_err(|e| ModelError::ConfigError {
                message: format!(
                    "Failed to load config from {}: {}",
                    config_path.display(),
                    e
                ),
            })?;
        debug!(
            "Loaded config: latent_size={}, units={}, batch_size={}",
            config.latent_size, config.units, config.batch_size
        );

        let vocab = ModelVocabulary::from_file(model_dir.join("vocab.json"))?;
        debug!("Loaded vocabulary: {} decoder symbols", vocab.decoder.len());

        let device = Self::get_device();
        info!("Using device: {:?}", device);

        let weights_path = model_dir.join("model.safetensors");
        if !weights_path.exists() {
            return Err(ModelError::WeightLoadError {
                message: format!("No weights file found. Expected model.safetensors in {}", model_dir.display()),
            });
        }
        let vb = Self::load_weights(&weights_path, &device)?;
        let model = Self::from_parts(config, vocab, vb)?;

        info!("Model loaded successfully");
        Ok(model)
    }

    /// Build the model from weights in `vb`.
    pub fn from_parts(config: ModelConfig, vocab: ModelVocabulary, vb: VarBuilder) -> Result<Self> {
        config.validate()?;
        let device = vb.device().clone();
        let encoder = Encoder::new(&config, &vocab, vb.pp("encoder"))?;
        let decoder = Decoder::new(&config, vocab.decoder.len(), vb.pp("decoder"))?;
        Ok(Self {
            config,
            vocab,
            encoder,
            decoder,
            device,
        })
    }

    /// Decode `batch_size` rows per step instead of the configured count.
    ///
    /// The weights do not depend on the batch size, so any beam width the
    /// caller wants can be served.
    pub fn with_batch_size(mut self, batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(ModelError::ConfigError {
                message: "batch_size must be at least 1".to_string(),
            });
        }
        debug!("Decoder batch size {} -> {}", self.config.batch_size, batch_size);
        self.config.batch_size = batch_size;
        self.decoder.set_batch_size(batch_size);
        Ok(self)
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    fn get_device() -> Device {
        #[cfg(feature = "cuda")]
        {
            if let Ok(device) = Device::new_cuda(0) {
                return device;
            }
        }

        #[cfg(feature = "metal")]
        {
            if let Ok(device) = Device::new_metal(0) {
                return device;
            }
        }

        Device::Cpu
    }

    fn load_weights(path: &Path, device: &Device) -> Result<VarBuilder<'static>> {
        debug!("Loading weights from: {}", path.display());
        let data = std::fs::read(path)?;
        let tensors = candle_core::safetensors::load_buffer(&data, device).map_err(|e| {
            ModelError::WeightLoadError {
                message: format!("Failed to load safetensors: {}", e),
            }
        })?;
        Ok(VarBuilder::from_tensors(tensors, DType::F32, device))
    }
}

impl ScoringOracle for BayouModel {
    type State = Vec<f32>;

    fn batch_size(&self) -> usize {
        self.decoder.batch_size()
    }

    fn vocabulary(&self) -> &Vocabulary {
        &self.vocab.decoder
    }

    fn encode(&self, evidence: &EvidenceSet) -> bayou_core::Result<LatentDistribution> {
        Ok(self.encoder.encode(evidence)?)
    }

    fn initial_state(&self, psi: &[f32]) -> bayou_core::Result<Self::State> {
        if psi.len() != self.config.latent_size {
            return Err(CoreError::DimensionMismatch {
                expected: self.config.latent_size,
                actual: psi.len(),
            });
        }
        Ok(self.decoder.lift(psi)?)
    }

    fn step(&self, inputs: &[DecoderInput<'_, Self::State>]) -> bayou_core::Result<StepOutput<Self::State>> {
        Ok(self.decoder.step(inputs)?)
    }
}
