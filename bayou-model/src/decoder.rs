//! Tree decoder: one GRU cell per edge type over a shared symbol embedding.

use bayou_core::beam::{DecoderInput, Edge, StepOutput};
use candle_core::{Device, Tensor, D};
use candle_nn::{embedding, linear, Embedding, Linear, Module, VarBuilder};

use crate::config::ModelConfig;
use crate::error::{ModelError, Result};

/// GRU cell built from two fused linear maps (`r`, `z`, `n` gates).
struct GruCell {
    input: Linear,
    hidden: Linear,
}

impl GruCell {
    fn new(input_size: usize, units: usize, vb: VarBuilder) -> Result<Self> {
        Ok(Self {
            input: linear(input_size, 3 * units, vb.pp("input"))?,
            hidden: linear(units, 3 * units, vb.pp("hidden"))?,
        })
    }

    fn forward(&self, x: &Tensor, h: &Tensor) -> Result<Tensor> {
        let gi = self.input.forward(x)?.chunk(3, 1)?;
        let gh = self.hidden.forward(h)?.chunk(3, 1)?;
        let r = candle_nn::ops::sigmoid(&(&gi[0] + &gh[0])?)?;
        let z = candle_nn::ops::sigmoid(&(&gi[1] + &gh[1])?)?;
        let n = (&gi[2] + (&r * &gh[2])?)?.tanh()?;
        // h' = (1 - z) * n + z * h
        let keep = (&z * h)?;
        let update = (z.affine(-1.0, 1.0)? * n)?;
        Ok((update + keep)?)
    }
}

pub struct Decoder {
    lift: Linear,
    embedding: Embedding,
    child: GruCell,
    sibling: GruCell,
    projection: Linear,
    units: usize,
    batch_size: usize,
    device: Device,
}

impl Decoder {
    /// Weights live under `decoder.{lift,embedding,child,sibling,projection}`.
    pub fn new(config: &ModelConfig, vocab_size: usize, vb: VarBuilder) -> Result<Self> {
        Ok(Self {
            lift: linear(config.latent_size, config.units, vb.pp("lift"))?,
            embedding: embedding(vocab_size, config.embedding_size, vb.pp("embedding"))?,
            child: GruCell::new(config.embedding_size, config.units, vb.pp("child"))?,
            sibling: GruCell::new(config.embedding_size, config.units, vb.pp("sibling"))?,
            projection: linear(config.units, vocab_size, vb.pp("projection"))?,
            units: config.units,
            batch_size: config.batch_size,
            device: vb.device().clone(),
        })
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub(crate) fn set_batch_size(&mut self, batch_size: usize) {
        self.batch_size = batch_size;
    }

    /// Initial decoder state for a latent vector.
    pub fn lift(&self, psi: &[f32]) -> Result<Vec<f32>> {
        let x = Tensor::from_slice(psi, (1, psi.len()), &self.device)?;
        Ok(self.lift.forward(&x)?.squeeze(0)?.to_vec1::<f32>()?)
    }

    /// One step for exactly `batch_size` rows; keeps the top `batch_size`
    /// symbols per row.
    pub fn step(&self, inputs: &[DecoderInput<'_, Vec<f32>>]) -> Result<StepOutput<Vec<f32>>> {
        let rows = inputs.len();
        if rows != self.batch_size {
            return Err(ModelError::BatchSizeMismatch {
                expected: self.batch_size,
                actual: rows,
            });
        }

        let mut states = Vec::with_capacity(rows * self.units);
        for input in inputs {
            if input.state.len() != self.units {
                return Err(ModelError::DimensionMismatch {
                    expected: self.units,
                    actual: input.state.len(),
                });
            }
            states.extend_from_slice(input.state);
        }
        let symbols: Vec<u32> = inputs.iter().map(|i| i.symbol as u32).collect();
        let mask: Vec<f32> = inputs
            .iter()
            .map(|i| if i.edge == Edge::Child { 1.0 } else { 0.0 })
            .collect();

        let h = Tensor::from_vec(states, (rows, self.units), &self.device)?;
        let x = self
            .embedding
            .forward(&Tensor::from_vec(symbols, rows, &self.device)?)?;
        let mask = Tensor::from_vec(mask, (rows, 1), &self.device)?;

        let child = self.child.forward(&x, &h)?;
        let sibling = self.sibling.forward(&x, &h)?;
        let next = (mask.broadcast_mul(&child)? + mask.affine(-1.0, 1.0)?.broadcast_mul(&sibling)?)?;

        let logits = self.projection.forward(&next)?;
        let log_probs = candle_nn::ops::log_softmax(&logits, D::Minus1)?;

        let (log_probs, indices) = top_k_rows(log_probs.to_vec2::<f32>()?, self.batch_size);
        Ok(StepOutput {
            states: next.to_vec2::<f32>()?,
            log_probs,
            indices,
        })
    }
}

/// Best `k` entries of each row, descending; ties keep the lower id.
/// Rows shorter than `k` are padded with id 0 at `-inf`.
pub fn top_k_rows(rows: Vec<Vec<f32>>, k: usize) -> (Vec<Vec<f32>>, Vec<Vec<usize>>) {
    rows.into_iter()
        .map(|row| {
            let mut order: Vec<usize> = (0..row.len()).collect();
            order.sort_by(|&a, &b| row[b].total_cmp(&row[a]));
            order.truncate(k);
            let mut scores: Vec<f32> = order.iter().map(|&i| row[i]).collect();
            scores.resize(k, f32::NEG_INFINITY);
            order.resize(k, 0);
            (scores, order)
        })
        .unzip()
}
