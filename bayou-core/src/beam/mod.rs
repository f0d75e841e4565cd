//! Beam-search AST decoder.
//!
//! Keeps `beam_width` candidates. Every round sends all of them to the
//! scoring oracle in one batch, expands each into `beam_width`
//! continuations, and keeps the best `beam_width` of the `beam_width²`
//! extensions. A candidate that has stopped contributes a single no-op
//! continuation with its unchanged score, so finished trees compete with
//! growing ones until the end.
//!
//! # Example
//!
//! ```rust,ignore
//! let asts = bayou_core::beam::synthesize(&oracle, &evidence, BeamConfig::new(10))?;
//! println!("{}", serde_json::to_string_pretty(&asts[0])?);
//! ```

mod candidate;
pub mod oracle;
mod tree;

pub use candidate::Candidate;
pub use oracle::{
    validate_step, ControlSymbols, DecoderInput, Edge, LatentDistribution, ScoringOracle,
    StepOutput, Vocabulary,
};
pub use tree::{NodeId, Tree, TreeNode};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::ast::SynthesizedAst;
use crate::error::{CoreError, Result};
use crate::evidence::EvidenceSet;

/// Round cap when no candidate stops on its own.
pub const DEFAULT_MAX_ROUNDS: usize = 20;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeamConfig {
    /// Candidates kept per round; must equal the oracle batch size.
    pub beam_width: usize,
    pub max_rounds: usize,
}

impl BeamConfig {
    pub fn new(beam_width: usize) -> Self {
        Self {
            beam_width,
            max_rounds: DEFAULT_MAX_ROUNDS,
        }
    }

    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds;
        self
    }
}

/// Final beam and the number of rounds run.
#[derive(Debug)]
pub struct BeamOutcome<S> {
    pub candidates: Vec<Candidate<S>>,
    pub rounds: usize,
}

impl<S: Clone> BeamOutcome<S> {
    /// Stopped candidates with a finite score, best first.
    pub fn finished(&self) -> Vec<&Candidate<S>> {
        let mut finished: Vec<_> = self.candidates.iter().filter(|c| c.is_finished()).collect();
        finished.sort_by(|a, b| b.log_prob.total_cmp(&a.log_prob));
        finished
    }
}

pub struct BeamSearch<'a, O: ScoringOracle> {
    oracle: &'a O,
    config: BeamConfig,
    control: ControlSymbols,
}

impl<'a, O: ScoringOracle> BeamSearch<'a, O> {
    pub fn new(oracle: &'a O, config: BeamConfig) -> Result<Self> {
        if config.beam_width == 0 {
            return Err(CoreError::contract("beam width must be at least 1"));
        }
        if config.beam_width != oracle.batch_size() {
            return Err(CoreError::contract(format!(
                "beam width {} does not match oracle batch size {}",
                config.beam_width,
                oracle.batch_size()
            )));
        }
        Ok(Self {
            oracle,
            config,
            control: oracle.vocabulary().control(),
        })
    }

    /// Decode from `initial_state` until every live candidate has stopped or
    /// the round cap is reached.
    pub fn run(&self, initial_state: O::State) -> Result<BeamOutcome<O::State>> {
        let width = self.config.beam_width;
        let mut beam: Vec<Candidate<O::State>> = (0..width)
            .map(|slot| {
                let log_prob = if slot == 0 { 0.0 } else { f32::NEG_INFINITY };
                Candidate::new(&self.control, initial_state.clone(), log_prob)
            })
            .collect();

        let mut rounds = 0;
        while rounds < self.config.max_rounds {
            beam = self.round(&beam)?;
            rounds += 1;

            let live = beam.iter().filter(|c| c.is_live()).count();
            let rolling = beam.iter().filter(|c| c.is_live() && c.rolling).count();
            debug!("Beam round {}: {} live, {} rolling", rounds, live, rolling);
            if rolling == 0 {
                break;
            }
        }

        Ok(BeamOutcome {
            candidates: beam,
            rounds,
        })
    }

    fn round(&self, beam: &[Candidate<O::State>]) -> Result<Vec<Candidate<O::State>>> {
        let width = self.config.beam_width;
        let inputs: Vec<DecoderInput<'_, O::State>> = beam
            .iter()
            .map(|c| DecoderInput {
                symbol: c.last_symbol,
                edge: c.last_edge,
                state: &c.state,
            })
            .collect();
        let output = self.oracle.step(&inputs)?;
        validate_step(&output, width, width, self.oracle.vocabulary().len())?;

        // (score, parent, column); row-major so a stable sort keeps first-seen on ties
        let mut extensions: Vec<(f32, usize, usize)> = Vec::with_capacity(width * width);
        for (row, candidate) in beam.iter().enumerate() {
            for col in 0..width {
                let step = if candidate.rolling {
                    output.log_probs[row][col]
                } else if col == 0 {
                    0.0
                } else {
                    f32::NEG_INFINITY
                };
                extensions.push((candidate.log_prob + step, row, col));
            }
        }
        extensions.sort_by(|a, b| b.0.total_cmp(&a.0));

        Ok(extensions
            .into_iter()
            .take(width)
            .map(|(score, row, col)| {
                let mut next = beam[row].clone();
                // a stopped parent's other columns are -inf, leaving the copy dead
                next.log_prob = score;
                if next.rolling {
                    next.state = output.states[row].clone();
                    next.grow(output.indices[row][col], &self.control);
                }
                next
            })
            .collect())
    }
}

/// Encode evidence, decode with beam search and convert the finished trees.
///
/// The latent mean is used as the intent vector. Results are ordered by
/// probability, best first.
pub fn synthesize<O: ScoringOracle>(
    oracle: &O,
    evidence: &EvidenceSet,
    config: BeamConfig,
) -> Result<Vec<SynthesizedAst>> {
    let search = BeamSearch::new(oracle, config)?;
    let latent = oracle.encode(evidence)?;
    let state = oracle.initial_state(&latent.mean)?;
    let outcome = search.run(state)?;

    let finished = outcome.finished();
    if finished.is_empty() {
        return Err(CoreError::BeamExhausted {
            rounds: outcome.rounds,
        });
    }
    info!(
        "Beam search finished {} of {} candidates in {} rounds",
        finished.len(),
        config.beam_width,
        outcome.rounds
    );

    let vocabulary = oracle.vocabulary();
    finished
        .into_iter()
        .map(|c| SynthesizedAst::from_candidate(c, vocabulary))
        .collect()
}
