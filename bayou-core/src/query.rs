//! Fixed-size query batches.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CoreError, Result};

/// Default number of slots per batch.
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// A query embedding with pass-through metadata.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueryEntry {
    pub embedding: Vec<f32>,
    #[serde(default)]
    pub metadata: Value,
}

impl QueryEntry {
    pub fn new(embedding: Vec<f32>) -> Self {
        Self {
            embedding,
            metadata: Value::Null,
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Check the embedding has `dimension` finite values.
    pub fn check(&self, dimension: usize) -> Result<()> {
        if self.embedding.len() != dimension {
            return Err(CoreError::DimensionMismatch {
                expected: dimension,
                actual: self.embedding.len(),
            });
        }
        if let Some(position) = self.embedding.iter().position(|v| !v.is_finite()) {
            return Err(CoreError::NonFiniteEmbedding { position });
        }
        Ok(())
    }
}

/// One slot of a batch.
#[derive(Clone, Debug, PartialEq)]
pub enum QuerySlot {
    Query(QueryEntry),
    Padding,
}

impl QuerySlot {
    pub fn is_padding(&self) -> bool {
        matches!(self, QuerySlot::Padding)
    }
}

/// What to do with a final batch that is not full.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PaddingPolicy {
    /// Fill the remaining slots with padding.
    #[default]
    Pad,
    /// Fail with [`CoreError::InvalidBatch`].
    Reject,
}

/// An immutable, fixed-size batch of query slots.
#[derive(Clone, Debug)]
pub struct QueryBatch {
    dimension: usize,
    slots: Vec<QuerySlot>,
}

impl QueryBatch {
    /// Split `entries` into batches of exactly `batch_size` slots.
    pub fn batches(
        entries: Vec<QueryEntry>,
        batch_size: usize,
        dimension: usize,
        policy: PaddingPolicy,
    ) -> Result<Vec<QueryBatch>> {
        if batch_size == 0 {
            return Err(CoreError::invalid_batch("batch size must be at least 1"));
        }
        if let Some((index, entry)) = entries
            .iter()
            .enumerate()
            .find(|(_, e)| e.embedding.len() != dimension)
        {
            return Err(CoreError::invalid_batch(format!(
                "query {} has dimension {}, expected {}",
                index,
                entry.embedding.len(),
                dimension
            )));
        }
        if let Some((index, position)) = entries.iter().enumerate().find_map(|(i, e)| {
            e.embedding
                .iter()
                .position(|v| !v.is_finite())
                .map(|p| (i, p))
        }) {
            return Err(CoreError::invalid_batch(format!(
                "query {} has a non-finite value at position {}",
                index, position
            )));
        }
        let remainder = entries.len() % batch_size;
        if remainder != 0 && policy == PaddingPolicy::Reject {
            return Err(CoreError::invalid_batch(format!(
                "{} queries do not fill batches of {}",
                entries.len(),
                batch_size
            )));
        }

        let mut batches = Vec::with_capacity(entries.len().div_ceil(batch_size));
        let mut slots = Vec::with_capacity(batch_size);
        for entry in entries {
            slots.push(QuerySlot::Query(entry));
            if slots.len() == batch_size {
                batches.push(QueryBatch {
                    dimension,
                    slots: std::mem::replace(&mut slots, Vec::with_capacity(batch_size)),
                });
            }
        }
        if !slots.is_empty() {
            slots.resize(batch_size, QuerySlot::Padding);
            batches.push(QueryBatch { dimension, slots });
        }
        Ok(batches)
    }

    /// Build a single batch with no padding.
    pub fn single(entries: Vec<QueryEntry>, dimension: usize) -> Result<QueryBatch> {
        let size = entries.len().max(1);
        let mut batches = Self::batches(entries, size, dimension, PaddingPolicy::Reject)?;
        Ok(batches.pop().unwrap_or(QueryBatch {
            dimension,
            slots: Vec::new(),
        }))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn slots(&self) -> &[QuerySlot] {
        &self.slots
    }

    /// Non-padding entries with their slot index.
    pub fn queries(&self) -> impl Iterator<Item = (usize, &QueryEntry)> {
        self.slots.iter().enumerate().filter_map(|(i, slot)| match slot {
            QuerySlot::Query(entry) => Some((i, entry)),
            QuerySlot::Padding => None,
        })
    }

    /// Number of padding slots.
    pub fn padding(&self) -> usize {
        self.slots.iter().filter(|s| s.is_padding()).count()
    }

    pub fn is_padded(&self) -> bool {
        self.padding() > 0
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum QueryFile {
    Encodings {
        psis_encs: Vec<Vec<f32>>,
    },
    Programs {
        programs: Vec<Value>,
    },
}

/// Read query entries from a JSON file.
///
/// Accepts `{"psis_encs": [[...], ...]}` or `{"programs": [{...}, ...]}`
/// where each program carries its embedding under `field`. For the second
/// shape the whole program object is kept as metadata.
pub fn read_query_file(path: &Path, field: &str) -> Result<Vec<QueryEntry>> {
    let content = std::fs::read_to_string(path)?;
    parse_queries(&content, field)
}

pub fn parse_queries(content: &str, field: &str) -> Result<Vec<QueryEntry>> {
    match serde_json::from_str::<QueryFile>(content)? {
        QueryFile::Encodings { psis_encs } => {
            Ok(psis_encs.into_iter().map(QueryEntry::new).collect())
        }
        QueryFile::Programs { programs } => programs
            .into_iter()
            .enumerate()
            .map(|(index, program)| {
                let embedding = program
                    .get(field)
                    .cloned()
                    .ok_or_else(|| {
                        CoreError::invalid_batch(format!(
                            "query {} has no '{}' field",
                            index, field
                        ))
                    })
                    .and_then(|v| Ok(serde_json::from_value::<Vec<f32>>(v)?))?;
                Ok(QueryEntry::new(embedding).with_metadata(program))
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(n: usize) -> Vec<QueryEntry> {
        (0..n).map(|i| QueryEntry::new(vec![i as f32, 0.0])).collect()
    }

    #[test]
    fn test_final_batch_is_padded() {
        let batches = QueryBatch::batches(entries(5), 2, 2, PaddingPolicy::Pad).unwrap();
        assert_eq!(batches.len(), 3);
        assert!(batches.iter().all(|b| b.len() == 2));
        assert!(!batches[1].is_padded());
        assert_eq!(batches[2].padding(), 1);
        assert!(batches[2].slots()[1].is_padding());

        let last: Vec<_> = batches[2].queries().map(|(i, e)| (i, e.embedding[0])).collect();
        assert_eq!(last, vec![(0, 4.0)]);
    }

    #[test]
    fn test_reject_policy() {
        let err = QueryBatch::batches(entries(3), 2, 2, PaddingPolicy::Reject).unwrap_err();
        assert!(matches!(err, CoreError::InvalidBatch { .. }));

        let ok = QueryBatch::batches(entries(4), 2, 2, PaddingPolicy::Reject).unwrap();
        assert_eq!(ok.len(), 2);
    }

    #[test]
    fn test_invalid_batches() {
        assert!(QueryBatch::batches(entries(2), 0, 2, PaddingPolicy::Pad).is_err());

        let mut bad = entries(2);
        bad[1].embedding.push(1.0);
        let err = QueryBatch::batches(bad, 2, 2, PaddingPolicy::Pad).unwrap_err();
        assert!(err.to_string().contains("query 1"));

        let mut nan = entries(3);
        nan[2].embedding[1] = f32::NAN;
        assert!(matches!(
            nan[2].check(2),
            Err(CoreError::NonFiniteEmbedding { position: 1 })
        ));
        assert!(matches!(
            nan[0].check(3),
            Err(CoreError::DimensionMismatch { expected: 3, actual: 2 })
        ));
        assert!(nan[1].check(2).is_ok());
        let err = QueryBatch::batches(nan, 2, 2, PaddingPolicy::Pad).unwrap_err();
        assert!(matches!(err, CoreError::InvalidBatch { .. }));
        assert!(err.to_string().contains("query 2"));
    }

    #[test]
    fn test_parse_encodings() {
        let queries = parse_queries(r#"{"psis_encs": [[1.0, 2.0], [3.0, 4.0]]}"#, "b2").unwrap();
        assert_eq!(queries.len(), 2);
        assert_eq!(queries[1].embedding, vec![3.0, 4.0]);
        assert!(queries[0].metadata.is_null());
    }

    #[test]
    fn test_parse_programs_keeps_metadata() {
        let queries = parse_queries(
            r#"{"programs": [{"body": "x", "b2": [0.5, 0.5], "testapicalls": ["a"]}]}"#,
            "b2",
        )
        .unwrap();
        assert_eq!(queries[0].embedding, vec![0.5, 0.5]);
        assert_eq!(queries[0].metadata["body"], "x");

        assert!(parse_queries(r#"{"programs": [{"body": "x"}]}"#, "b2").is_err());
    }
}
