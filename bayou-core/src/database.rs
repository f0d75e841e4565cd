//! Column-oriented program database.
//!
//! Programs are stored in shards. Each shard holds a bounded batch of
//! records together with a dense row-major embedding matrix, so a scan over
//! a shard is a straight walk over contiguous `f32` memory. The database is
//! the ordered list of shards in load order; that order is the tie-break
//! order used by the scanner.

use std::sync::Arc;

use crate::error::{CoreError, Result};
use crate::types::ProgramRecord;

/// Default number of records per shard.
pub const DEFAULT_SHARD_CAPACITY: usize = 10_000;

/// A bounded batch of records with their embedding matrix.
#[derive(Clone, Debug)]
pub struct ColumnShard {
    dimension: usize,
    records: Vec<Arc<ProgramRecord>>,
    matrix: Vec<f32>,
    norms: Vec<f32>,
}

impl ColumnShard {
    /// Number of rows.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn records(&self) -> &[Arc<ProgramRecord>] {
        &self.records
    }

    pub fn record(&self, row: usize) -> Option<&Arc<ProgramRecord>> {
        self.records.get(row)
    }

    /// Embedding of `row`. Panics if `row` is out of range.
    pub fn embedding(&self, row: usize) -> &[f32] {
        let start = row * self.dimension;
        &self.matrix[start..start + self.dimension]
    }

    /// Euclidean norm of the embedding at `row`.
    pub fn norm(&self, row: usize) -> f32 {
        self.norms[row]
    }

    /// Iterate over `(row, embedding)` pairs.
    pub fn rows(&self) -> impl Iterator<Item = (usize, &[f32])> {
        // chunks_exact panics on a zero chunk size
        self.matrix
            .chunks_exact(self.dimension.max(1))
            .take(self.records.len())
            .enumerate()
    }
}

/// Accumulates records into a single shard.
#[derive(Debug)]
pub struct ShardBuilder {
    dimension: usize,
    capacity: usize,
    records: Vec<Arc<ProgramRecord>>,
    matrix: Vec<f32>,
    norms: Vec<f32>,
    skipped: usize,
}

impl ShardBuilder {
    pub fn new(dimension: usize, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            dimension,
            capacity,
            records: Vec::new(),
            matrix: Vec::new(),
            norms: Vec::new(),
            skipped: 0,
        }
    }

    /// Append a record and its embedding.
    ///
    /// A vector of the wrong length or with non-finite values is rejected:
    /// the record is excluded and counted in [`ShardBuilder::skipped`].
    pub fn push(&mut self, record: ProgramRecord, embedding: &[f32]) -> Result<()> {
        self.push_shared(Arc::new(record), embedding)
    }

    pub(crate) fn push_shared(
        &mut self,
        record: Arc<ProgramRecord>,
        embedding: &[f32],
    ) -> Result<()> {
        if self.is_full() {
            return Err(CoreError::ShardFull {
                capacity: self.capacity,
            });
        }
        if embedding.len() != self.dimension {
            self.skipped += 1;
            return Err(CoreError::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.len(),
            });
        }
        if let Some(position) = embedding.iter().position(|v| !v.is_finite()) {
            self.skipped += 1;
            return Err(CoreError::NonFiniteEmbedding { position });
        }

        let norm = embedding.iter().map(|v| v * v).sum::<f32>().sqrt();
        self.matrix.extend_from_slice(embedding);
        self.norms.push(norm);
        self.records.push(record);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.records.len() >= self.capacity
    }

    /// Number of records rejected so far.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn finish(self) -> ColumnShard {
        ColumnShard {
            dimension: self.dimension,
            records: self.records,
            matrix: self.matrix,
            norms: self.norms,
        }
    }
}

/// Ordered collection of shards sharing one embedding dimension.
#[derive(Clone, Debug)]
pub struct ColumnDatabase {
    dimension: usize,
    shards: Vec<ColumnShard>,
    len: usize,
}

impl ColumnDatabase {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            shards: Vec::new(),
            len: 0,
        }
    }

    /// Append a shard at the end of the scan order.
    pub fn push_shard(&mut self, shard: ColumnShard) -> Result<()> {
        if shard.dimension != self.dimension {
            return Err(CoreError::DimensionMismatch {
                expected: self.dimension,
                actual: shard.dimension,
            });
        }
        self.len += shard.len();
        self.shards.push(shard);
        Ok(())
    }

    /// Remove the most recently added shard.
    pub fn pop_shard(&mut self) -> Option<ColumnShard> {
        let shard = self.shards.pop()?;
        self.len -= shard.len();
        Some(shard)
    }

    /// Build shards of `capacity` rows from in-memory records and append them.
    ///
    /// Returns the number of records that were skipped.
    pub fn add_records<I>(&mut self, records: I, capacity: usize) -> Result<usize>
    where
        I: IntoIterator<Item = (ProgramRecord, Vec<f32>)>,
    {
        let mut builder = ShardBuilder::new(self.dimension, capacity);
        let mut skipped = 0;
        for (record, embedding) in records {
            if builder.is_full() {
                skipped += builder.skipped();
                let full = std::mem::replace(
                    &mut builder,
                    ShardBuilder::new(self.dimension, capacity),
                );
                self.push_shard(full.finish())?;
            }
            match builder.push(record, &embedding) {
                Ok(()) => {}
                Err(CoreError::DimensionMismatch { .. })
                | Err(CoreError::NonFiniteEmbedding { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        skipped += builder.skipped();
        if !builder.is_empty() {
            self.push_shard(builder.finish())?;
        }
        Ok(skipped)
    }

    pub fn shards(&self) -> &[ColumnShard] {
        &self.shards
    }

    pub fn num_shards(&self) -> usize {
        self.shards.len()
    }

    /// Total number of records across all shards.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }
}
