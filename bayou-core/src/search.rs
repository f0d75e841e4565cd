//! Parallel top-K scanner over a [`ColumnDatabase`].
//!
//! Shards are split into contiguous chunks, one per worker. Each worker keeps
//! a bounded min-heap per query over its chunk, then the sorted worker lists
//! are merged K-way on the calling thread. Hits are ordered by score
//! descending; equal scores keep scan order (shard, then row), so the result
//! is identical to a stable full sort of every score in the database.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::database::{ColumnDatabase, ColumnShard};
use crate::error::{CoreError, Result};
use crate::query::{QueryBatch, QueryEntry};
use crate::types::ProgramRecord;

/// Default number of hits per query.
pub const DEFAULT_TOP_K: usize = 5;

/// Similarity measure. Scores are always "higher is better".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Negated squared Euclidean distance.
    #[default]
    SquaredEuclidean,
    /// Dot product.
    InnerProduct,
    /// Cosine similarity; zero vectors score 0.
    Cosine,
}

impl Metric {
    /// Score `row` against `query`. Norms are only read by [`Metric::Cosine`].
    pub fn score(&self, query: &[f32], query_norm: f32, row: &[f32], row_norm: f32) -> f32 {
        let score = match self {
            Metric::SquaredEuclidean => -query
                .iter()
                .zip(row)
                .map(|(q, x)| (q - x) * (q - x))
                .sum::<f32>(),
            Metric::InnerProduct => dot(query, row),
            Metric::Cosine => {
                let denom = query_norm * row_norm;
                if denom == 0.0 {
                    0.0
                } else {
                    dot(query, row) / denom
                }
            }
        };
        // -0.0 and 0.0 must tie
        score + 0.0
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn norm(v: &[f32]) -> f32 {
    dot(v, v).sqrt()
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Metric::SquaredEuclidean => "squared_euclidean",
            Metric::InnerProduct => "inner_product",
            Metric::Cosine => "cosine",
        };
        f.write_str(name)
    }
}

impl FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "squared_euclidean" | "euclidean" | "l2" => Ok(Metric::SquaredEuclidean),
            "inner_product" | "dot" | "ip" => Ok(Metric::InnerProduct),
            "cosine" | "cos" => Ok(Metric::Cosine),
            _ => Err(format!("Unknown metric: '{}'", s)),
        }
    }
}

/// A retrieved program.
#[derive(Clone, Debug)]
pub struct Hit {
    pub record: Arc<ProgramRecord>,
    pub score: f32,
    pub shard: usize,
    pub row: usize,
}

/// Ranked hits for one query, best first.
#[derive(Clone, Debug)]
pub struct RankedResult {
    /// Slot of the query in its batch, or its position in the input list.
    pub query_index: usize,
    pub hits: Vec<Hit>,
}

impl RankedResult {
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &ProgramRecord> {
        self.hits.iter().map(|h| h.record.as_ref())
    }
}

/// Heap entry. Greater means better: higher score, then earlier position.
#[derive(Clone, Copy, Debug)]
struct Scored {
    score: f32,
    shard: usize,
    row: usize,
}

impl PartialEq for Scored {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Scored {}

impl PartialOrd for Scored {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scored {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| other.shard.cmp(&self.shard))
            .then_with(|| other.row.cmp(&self.row))
    }
}

/// Brute-force top-K scanner.
pub struct Scanner<'a> {
    database: &'a ColumnDatabase,
    top_k: usize,
    metric: Metric,
}

impl<'a> Scanner<'a> {
    pub fn new(database: &'a ColumnDatabase, top_k: usize) -> Self {
        Self {
            database,
            top_k,
            metric: Metric::default(),
        }
    }

    pub fn with_metric(mut self, metric: Metric) -> Self {
        self.metric = metric;
        self
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    /// Embedding dimension queries must have.
    pub fn dimension(&self) -> usize {
        self.database.dimension()
    }

    /// Rank the database against every non-padding slot of `batch`.
    ///
    /// Returns one result per query, in slot order. `num_threads == 0` uses
    /// the rayon default pool.
    pub fn search_and_top_k_parallel(
        &self,
        batch: &QueryBatch,
        num_threads: usize,
    ) -> Result<Vec<RankedResult>> {
        if batch.dimension() != self.database.dimension() {
            return Err(CoreError::DimensionMismatch {
                expected: self.database.dimension(),
                actual: batch.dimension(),
            });
        }

        let queries: Vec<(usize, &QueryEntry)> = batch.queries().collect();
        let vectors: Vec<&[f32]> = queries.iter().map(|(_, q)| q.embedding.as_slice()).collect();
        let ranked = self.rank(&vectors, num_threads);

        Ok(queries
            .iter()
            .zip(ranked)
            .map(|((slot, _), hits)| RankedResult {
                query_index: *slot,
                hits,
            })
            .collect())
    }

    /// Rank a single query vector.
    pub fn search_one(&self, query: &[f32]) -> Result<RankedResult> {
        self.check_query(query)?;
        let hits = self.rank(&[query], 1).pop().unwrap_or_default();
        Ok(RankedResult {
            query_index: 0,
            hits,
        })
    }

    /// Rank many queries; a malformed query fails only its own slot.
    pub fn search_many(&self, queries: &[Vec<f32>], num_threads: usize) -> Vec<Result<RankedResult>> {
        let valid: Vec<&[f32]> = queries
            .iter()
            .filter(|q| self.check_query(q).is_ok())
            .map(|q| q.as_slice())
            .collect();
        let mut ranked = self.rank(&valid, num_threads).into_iter();

        queries
            .iter()
            .enumerate()
            .map(|(index, query)| {
                self.check_query(query)?;
                Ok(RankedResult {
                    query_index: index,
                    hits: ranked.next().unwrap_or_default(),
                })
            })
            .collect()
    }

    fn check_query(&self, query: &[f32]) -> Result<()> {
        if query.len() != self.database.dimension() {
            return Err(CoreError::DimensionMismatch {
                expected: self.database.dimension(),
                actual: query.len(),
            });
        }
        if let Some(position) = query.iter().position(|v| !v.is_finite()) {
            return Err(CoreError::NonFiniteEmbedding { position });
        }
        Ok(())
    }

    /// Top-K hits for each query vector, in input order.
    fn rank(&self, queries: &[&[f32]], num_threads: usize) -> Vec<Vec<Hit>> {
        if queries.is_empty() {
            return Vec::new();
        }
        let shards = self.database.shards();
        if self.top_k == 0 || shards.is_empty() {
            return vec![Vec::new(); queries.len()];
        }

        let query_norms: Vec<f32> = queries.iter().map(|q| norm(q)).collect();
        let workers = if num_threads == 0 {
            rayon::current_num_threads()
        } else {
            num_threads
        };
        let chunk_size = shards.len().div_ceil(workers.max(1));
        let chunks: Vec<(usize, &[ColumnShard])> = shards
            .chunks(chunk_size)
            .enumerate()
            .map(|(i, chunk)| (i * chunk_size, chunk))
            .collect();
        debug!(
            "Scanning {} shards in {} chunks for {} queries",
            shards.len(),
            chunks.len(),
            queries.len()
        );

        let scan = |(offset, chunk): &(usize, &[ColumnShard])| {
            self.scan_chunk(*offset, chunk, queries, &query_norms)
        };
        let partials: Vec<Vec<Vec<Scored>>> = if num_threads > 0 {
            match rayon::ThreadPoolBuilder::new().num_threads(num_threads).build() {
                Ok(pool) => pool.install(|| chunks.par_iter().map(scan).collect()),
                Err(e) => {
                    warn!("Failed to build scan pool, using global pool: {}", e);
                    chunks.par_iter().map(scan).collect()
                }
            }
        } else {
            chunks.par_iter().map(scan).collect()
        };

        (0..queries.len())
            .map(|q| {
                let lists: Vec<&[Scored]> = partials.iter().map(|p| p[q].as_slice()).collect();
                merge_sorted(&lists, self.top_k)
                    .into_iter()
                    .filter_map(|s| {
                        shards[s.shard].record(s.row).map(|record| Hit {
                            record: Arc::clone(record),
                            score: s.score,
                            shard: s.shard,
                            row: s.row,
                        })
                    })
                    .collect()
            })
            .collect()
    }

    /// Per-query top-K over one contiguous chunk, each list best first.
    fn scan_chunk(
        &self,
        offset: usize,
        chunk: &[ColumnShard],
        queries: &[&[f32]],
        query_norms: &[f32],
    ) -> Vec<Vec<Scored>> {
        let mut heaps: Vec<BinaryHeap<Reverse<Scored>>> = queries
            .iter()
            .map(|_| BinaryHeap::with_capacity(self.top_k + 1))
            .collect();

        for (i, shard) in chunk.iter().enumerate() {
            for (row, embedding) in shard.rows() {
                let row_norm = shard.norm(row);
                for (q, heap) in heaps.iter_mut().enumerate() {
                    let score = self.metric.score(queries[q], query_norms[q], embedding, row_norm);
                    heap.push(Reverse(Scored {
                        score,
                        shard: offset + i,
                        row,
                    }));
                    if heap.len() > self.top_k {
                        heap.pop();
                    }
                }
            }
        }

        heaps
            .into_iter()
            .map(|heap| {
                let mut list: Vec<Scored> = heap.into_iter().map(|r| r.0).collect();
                list.sort_by(|a, b| b.cmp(a));
                list
            })
            .collect()
    }
}

/// K-way merge of best-first lists, keeping the first `k` entries.
fn merge_sorted(lists: &[&[Scored]], k: usize) -> Vec<Scored> {
    let mut heap: BinaryHeap<(Scored, usize, usize)> = lists
        .iter()
        .enumerate()
        .filter_map(|(l, list)| list.first().map(|s| (*s, l, 0)))
        .collect();

    let mut merged = Vec::with_capacity(k);
    while merged.len() < k {
        let Some((best, l, pos)) = heap.pop() else {
            break;
        };
        merged.push(best);
        if let Some(next) = lists[l].get(pos + 1) {
            heap.push((*next, l, pos + 1));
        }
    }
    merged
}
