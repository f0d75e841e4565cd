//! Retrieval quality over labelled queries.
//!
//! For every query the desired program (body, API calls, call sequence, AST)
//! is compared with each ranked hit. The tracker accumulates first-hit
//! ranks, reciprocal ranks, precision at a list of cut-offs and the average
//! Jaccard similarity of API-call and sequence sets.
//!
//! A query without a match counts rank `top_k` and reciprocal rank
//! `1 / top_k`.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use xxhash_rust::xxh3::xxh3_64;

use crate::corpus::longest_sequence;
use crate::search::RankedResult;
use crate::types::ProgramRecord;

/// Default cut-offs: the first ten ranks.
pub const DEFAULT_HIT_POINTS: [usize; 10] = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10];

static JAVADOC: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)/\*\*.*?\*/").unwrap());

/// Drop JavaDoc comments and collapse whitespace.
pub fn normalize_body(body: &str) -> String {
    JAVADOC
        .replace_all(body, "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Fingerprint of a normalized body.
pub fn body_fingerprint(body: &str) -> u64 {
    xxh3_64(normalize_body(body).as_bytes())
}

/// `|A ∩ B| / |A ∪ B|`; two empty sets are identical.
pub fn jaccard_similarity(a: &[String], b: &[String]) -> f64 {
    let a: HashSet<&str> = a.iter().map(String::as_str).collect();
    let b: HashSet<&str> = b.iter().map(String::as_str).collect();
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    a.intersection(&b).count() as f64 / a.union(&b).count() as f64
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Api,
    Sequence,
    Ast,
    Body,
}

impl MatchKind {
    pub const ALL: [MatchKind; 4] = [
        MatchKind::Api,
        MatchKind::Sequence,
        MatchKind::Ast,
        MatchKind::Body,
    ];
}

/// The program a query is expected to retrieve.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Desired {
    pub body_fingerprint: u64,
    pub api_calls: Vec<String>,
    pub sequence: Vec<String>,
    pub ast: Option<Value>,
}

impl Desired {
    /// Read from a query program object (`body`, `testapicalls` or
    /// `apicalls`, `sequences`, `ast`).
    pub fn from_json(program: &Value) -> Self {
        let strings = |v: &Value| -> Vec<String> {
            v.as_array()
                .map(|a| a.iter().filter_map(|s| s.as_str().map(str::to_string)).collect())
                .unwrap_or_default()
        };
        let mut api_calls = program
            .get("testapicalls")
            .or_else(|| program.get("apicalls"))
            .map(strings)
            .unwrap_or_default();
        api_calls.sort();
        api_calls.dedup();

        Self {
            body_fingerprint: body_fingerprint(
                program.get("body").and_then(|b| b.as_str()).unwrap_or(""),
            ),
            api_calls,
            sequence: program
                .get("sequences")
                .cloned()
                .map(longest_sequence)
                .unwrap_or_default(),
            ast: program.get("ast").filter(|a| !a.is_null()).cloned(),
        }
    }

    pub fn matches(&self, kind: MatchKind, record: &ProgramRecord) -> bool {
        match kind {
            MatchKind::Api => record.labels.api_calls == self.api_calls,
            MatchKind::Sequence => record.labels.sequence == self.sequence,
            MatchKind::Ast => self.ast.is_some() && record.labels.ast == self.ast,
            MatchKind::Body => body_fingerprint(&record.body) == self.body_fingerprint,
        }
    }
}

/// First-hit ranks of one query, 0-based; `top_k` when nothing matched.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueryEvaluation {
    pub first_hit_rank_api: usize,
    pub first_hit_rank_sequence: usize,
    pub first_hit_rank_ast: usize,
    pub first_hit_rank_body: usize,
}

#[derive(Clone, Debug, Default)]
struct KindTotals {
    first_hits: Vec<usize>,
    matches: Vec<usize>,
    rank_total: f64,
    reciprocal_total: f64,
}

/// Accumulates retrieval quality over many queries.
#[derive(Clone, Debug)]
pub struct PrecisionTracker {
    top_k: usize,
    hit_points: Vec<usize>,
    queries: usize,
    kinds: [KindTotals; 4],
    api_jaccard: Vec<f64>,
    sequence_jaccard: Vec<f64>,
}

impl PrecisionTracker {
    pub fn new(top_k: usize, hit_points: &[usize]) -> Self {
        let n = hit_points.len();
        let totals = KindTotals {
            first_hits: vec![0; n],
            matches: vec![0; n],
            ..KindTotals::default()
        };
        Self {
            top_k: top_k.max(1),
            hit_points: hit_points.to_vec(),
            queries: 0,
            kinds: [totals.clone(), totals.clone(), totals.clone(), totals],
            api_jaccard: vec![0.0; n],
            sequence_jaccard: vec![0.0; n],
        }
    }

    pub fn queries(&self) -> usize {
        self.queries
    }

    /// Score one query's ranked hits against its desired program.
    pub fn record(&mut self, desired: &Desired, result: &RankedResult) -> QueryEvaluation {
        self.queries += 1;
        let mut ranks = [self.top_k; 4];

        for (k, kind) in MatchKind::ALL.iter().enumerate() {
            let hits: Vec<bool> = result
                .records()
                .map(|record| desired.matches(*kind, record))
                .collect();
            let first = hits.iter().position(|&m| m);
            let rank = first.unwrap_or(self.top_k);
            ranks[k] = rank;

            let totals = &mut self.kinds[k];
            totals.rank_total += (rank + 1) as f64;
            totals.reciprocal_total += match first {
                Some(j) => 1.0 / (j + 1) as f64,
                None => 1.0 / self.top_k as f64,
            };
            for (i, &point) in self.hit_points.iter().enumerate() {
                if rank < point {
                    totals.first_hits[i] += 1;
                }
                totals.matches[i] += hits.iter().take(point).filter(|&&m| m).count();
            }
        }

        let api: Vec<f64> = result
            .records()
            .map(|r| jaccard_similarity(&r.labels.api_calls, &desired.api_calls))
            .collect();
        let sequence: Vec<f64> = result
            .records()
            .map(|r| jaccard_similarity(&r.labels.sequence, &desired.sequence))
            .collect();
        for (i, &point) in self.hit_points.iter().enumerate() {
            self.api_jaccard[i] += api.iter().take(point).sum::<f64>();
            self.sequence_jaccard[i] += sequence.iter().take(point).sum::<f64>();
        }

        QueryEvaluation {
            first_hit_rank_api: ranks[0],
            first_hit_rank_sequence: ranks[1],
            first_hit_rank_ast: ranks[2],
            first_hit_rank_body: ranks[3],
        }
    }

    pub fn report(&self) -> PrecisionReport {
        let queries = self.queries as f64;
        let ratio = |value: f64, denom: f64| if denom > 0.0 { value / denom } else { 0.0 };
        let per_point = |values: &[f64]| -> Vec<f64> {
            values
                .iter()
                .zip(&self.hit_points)
                .map(|(v, &p)| ratio(*v, p as f64 * queries))
                .collect()
        };

        let kinds = MatchKind::ALL
            .iter()
            .zip(&self.kinds)
            .map(|(kind, totals)| KindReport {
                kind: *kind,
                first_hit_cdf: totals
                    .first_hits
                    .iter()
                    .map(|&c| ratio(c as f64, queries))
                    .collect(),
                precision: per_point(
                    &totals.matches.iter().map(|&m| m as f64).collect::<Vec<_>>(),
                ),
                average_first_hit_rank: ratio(totals.rank_total, queries),
                mean_reciprocal_rank: ratio(totals.reciprocal_total, queries),
            })
            .collect();

        PrecisionReport {
            queries: self.queries,
            top_k: self.top_k,
            hit_points: self.hit_points.clone(),
            kinds,
            api_jaccard: per_point(&self.api_jaccard),
            sequence_jaccard: per_point(&self.sequence_jaccard),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KindReport {
    pub kind: MatchKind,
    /// Share of queries whose first match is within each cut-off.
    pub first_hit_cdf: Vec<f64>,
    /// Matches within each cut-off over `cut-off × queries`.
    pub precision: Vec<f64>,
    /// Mean 1-based first-hit rank.
    pub average_first_hit_rank: f64,
    pub mean_reciprocal_rank: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PrecisionReport {
    pub queries: usize,
    pub top_k: usize,
    pub hit_points: Vec<usize>,
    pub kinds: Vec<KindReport>,
    /// Mean API-call Jaccard similarity within each cut-off.
    pub api_jaccard: Vec<f64>,
    /// Mean sequence Jaccard similarity within each cut-off.
    pub sequence_jaccard: Vec<f64>,
}

impl PrecisionReport {
    pub fn kind(&self, kind: MatchKind) -> Option<&KindReport> {
        self.kinds.iter().find(|k| k.kind == kind)
    }
}
