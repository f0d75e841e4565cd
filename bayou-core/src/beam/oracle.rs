//! The scoring oracle consumed by beam search.
//!
//! The oracle is the trained network seen from the outside: it encodes
//! evidence into a latent distribution, lifts a latent vector into an
//! initial decoder state, and scores one decoding step for a whole beam.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::evidence::EvidenceSet;

/// Root symbol of every synthesized tree.
pub const SUBTREE: &str = "DSubTree";
/// End of a sibling chain.
pub const STOP: &str = "STOP";
pub const BRANCH: &str = "DBranch";
pub const LOOP: &str = "DLoop";
pub const EXCEPT: &str = "DExcept";

/// Which link of the cursor the next symbol is attached through.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Edge {
    Child,
    Sibling,
}

/// Ids of the symbols that drive tree growth.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ControlSymbols {
    pub subtree: usize,
    pub stop: usize,
    pub branch: usize,
    pub loop_: usize,
    pub except: usize,
}

impl ControlSymbols {
    /// Whether `symbol` opens a nested construct.
    pub fn is_construct(&self, symbol: usize) -> bool {
        symbol == self.branch || symbol == self.loop_ || symbol == self.except
    }
}

/// Decoder output space: symbol strings indexed by id.
#[derive(Clone, Debug, PartialEq)]
pub struct Vocabulary {
    symbols: Vec<String>,
    index: HashMap<String, usize>,
    control: ControlSymbols,
}

impl Vocabulary {
    /// Build a vocabulary; ids are positions in `symbols`.
    pub fn new(symbols: Vec<String>) -> Result<Self> {
        let mut index = HashMap::with_capacity(symbols.len());
        for (id, symbol) in symbols.iter().enumerate() {
            if index.insert(symbol.clone(), id).is_some() {
                return Err(CoreError::InvalidVocabulary {
                    message: format!("duplicate symbol '{}'", symbol),
                });
            }
        }
        let lookup = |name: &str| {
            index
                .get(name)
                .copied()
                .ok_or_else(|| CoreError::InvalidVocabulary {
                    message: format!("missing required symbol '{}'", name),
                })
        };
        let control = ControlSymbols {
            subtree: lookup(SUBTREE)?,
            stop: lookup(STOP)?,
            branch: lookup(BRANCH)?,
            loop_: lookup(LOOP)?,
            except: lookup(EXCEPT)?,
        };
        Ok(Self {
            symbols,
            index,
            control,
        })
    }

    pub fn id(&self, symbol: &str) -> Option<usize> {
        self.index.get(symbol).copied()
    }

    pub fn symbol(&self, id: usize) -> Option<&str> {
        self.symbols.get(id).map(String::as_str)
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn control(&self) -> ControlSymbols {
        self.control
    }
}

/// Gaussian over the latent intent space, diagonal covariance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LatentDistribution {
    pub mean: Vec<f32>,
    pub covariance: Vec<f32>,
}

/// One row of a decoding step.
#[derive(Debug)]
pub struct DecoderInput<'a, S> {
    /// Last symbol fed to the decoder.
    pub symbol: usize,
    pub edge: Edge,
    pub state: &'a S,
}

/// Result of one decoding step for a beam.
///
/// Row `i` holds the best continuations of input `i`: `indices[i][j]` is a
/// symbol id and `log_probs[i][j]` its log-probability, sorted descending.
#[derive(Clone, Debug)]
pub struct StepOutput<S> {
    pub states: Vec<S>,
    pub log_probs: Vec<Vec<f32>>,
    pub indices: Vec<Vec<usize>>,
}

/// The trained model, seen as a black box.
pub trait ScoringOracle {
    /// Opaque decoder state carried by each candidate.
    type State: Clone;

    /// Rows per step and continuations per row.
    fn batch_size(&self) -> usize;

    fn vocabulary(&self) -> &Vocabulary;

    /// Encode evidence into a latent distribution.
    fn encode(&self, evidence: &EvidenceSet) -> Result<LatentDistribution>;

    /// Lift a latent vector into the decoder's initial state.
    fn initial_state(&self, psi: &[f32]) -> Result<Self::State>;

    /// Score one step for `batch_size()` inputs.
    fn step(&self, inputs: &[DecoderInput<'_, Self::State>]) -> Result<StepOutput<Self::State>>;
}

/// Check a step output against the shape and ordering contract.
pub fn validate_step<S>(output: &StepOutput<S>, rows: usize, width: usize, vocab_len: usize) -> Result<()> {
    if output.states.len() != rows
        || output.log_probs.len() != rows
        || output.indices.len() != rows
    {
        return Err(CoreError::contract(format!(
            "expected {} rows, got {} states, {} score rows, {} index rows",
            rows,
            output.states.len(),
            output.log_probs.len(),
            output.indices.len()
        )));
    }

    for (row, (scores, ids)) in output.log_probs.iter().zip(&output.indices).enumerate() {
        if scores.len() != width || ids.len() != width {
            return Err(CoreError::contract(format!(
                "row {} has {} scores and {} ids, expected {}",
                row,
                scores.len(),
                ids.len(),
                width
            )));
        }
        if let Some(id) = ids.iter().find(|&&id| id >= vocab_len) {
            return Err(CoreError::contract(format!(
                "row {} has symbol id {} outside a vocabulary of {}",
                row, id, vocab_len
            )));
        }
        if scores.iter().any(|s| s.is_nan()) {
            return Err(CoreError::contract(format!("row {} has a NaN score", row)));
        }
        if let Some(score) = scores.iter().find(|&&s| s > 0.0) {
            return Err(CoreError::contract(format!(
                "row {} has log-probability {} above zero",
                row, score
            )));
        }
        if scores.windows(2).any(|w| w[0] < w[1]) {
            return Err(CoreError::contract(format!(
                "row {} is not sorted by descending score",
                row
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symbols(extra: &[&str]) -> Vec<String> {
        [SUBTREE, STOP, BRANCH, LOOP, EXCEPT]
            .iter()
            .chain(extra)
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn test_vocabulary_lookup() {
        let vocab = Vocabulary::new(symbols(&["java.io.File.open()"])).unwrap();
        assert_eq!(vocab.len(), 6);
        assert_eq!(vocab.id("java.io.File.open()"), Some(5));
        assert_eq!(vocab.symbol(1), Some(STOP));
        assert!(vocab.control().is_construct(vocab.id(LOOP).unwrap()));
        assert!(!vocab.control().is_construct(vocab.id(STOP).unwrap()));
    }

    #[test]
    fn test_vocabulary_requires_control_symbols() {
        let err = Vocabulary::new(vec![SUBTREE.to_string(), STOP.to_string()]).unwrap_err();
        assert!(err.to_string().contains(BRANCH));

        let err = Vocabulary::new(symbols(&[STOP])).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_validate_step() {
        let good = StepOutput {
            states: vec![(), ()],
            log_probs: vec![vec![-0.1, -2.0], vec![-0.5, f32::NEG_INFINITY]],
            indices: vec![vec![1, 0], vec![2, 3]],
        };
        assert!(validate_step(&good, 2, 2, 5).is_ok());

        let mut unsorted = good.clone();
        unsorted.log_probs[0] = vec![-2.0, -0.1];
        assert!(matches!(
            validate_step(&unsorted, 2, 2, 5),
            Err(CoreError::OracleContractViolation { .. })
        ));

        let mut out_of_range = good.clone();
        out_of_range.indices[1][0] = 5;
        assert!(validate_step(&out_of_range, 2, 2, 5).is_err());

        let mut nan = good.clone();
        nan.log_probs[1][0] = f32::NAN;
        assert!(validate_step(&nan, 2, 2, 5).is_err());

        let mut positive = good.clone();
        positive.log_probs[0] = vec![f32::INFINITY, -2.0];
        assert!(validate_step(&positive, 2, 2, 5).is_err());
        positive.log_probs[0] = vec![0.5, -2.0];
        assert!(validate_step(&positive, 2, 2, 5).is_err());

        let mut certain = good.clone();
        certain.log_probs[0] = vec![0.0, f32::NEG_INFINITY];
        assert!(validate_step(&certain, 2, 2, 5).is_ok());

        assert!(validate_step(&good, 3, 2, 5).is_err());
        assert!(validate_step(&good, 2, 3, 5).is_err());
    }
}
