//! Bayou model - native inference for the evidence encoder and AST decoder.
//!
//! [`BayouModel`] implements [`bayou_core::ScoringOracle`], so it plugs
//! straight into [`bayou_core::synthesize`].
//!
//! # Usage
//!
//! ```rust,no_run
//! use bayou_core::{synthesize, BeamConfig, EvidenceSet};
//! use bayou_model::BayouModel;
//!
//! let model = BayouModel::load("models/bayou")?;
//! let evidence = EvidenceSet::from_json(&serde_json::json!({"apicalls": ["readLine"]}));
//! let asts = synthesize(&model, &evidence, BeamConfig::new(model.config().batch_size))?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(clippy::all)]

mod config;
mod decoder;
mod encoder;
mod error;
mod model;
mod vocab;

pub use config::{EvidenceConfig, ModelConfig};
pub use encoder::combine;
pub use error::{ModelError, Result};
pub use model::BayouModel;
pub use vocab::{ModelVocabulary, TokenIndex};
