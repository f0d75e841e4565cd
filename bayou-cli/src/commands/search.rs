//! Search command - rank corpus programs for each query embedding

use std::path::Path;
use std::time::Instant;

use anyhow::{bail, Context as _};
use bayou_core::query::read_query_file;
use bayou_core::{CoreError, Metric, PaddingPolicy, QueryBatch, QueryEntry, RankedResult, Scanner};
use colored::Colorize;
use serde::Serialize;
use tracing::{info, warn};

use super::{load_corpus, run_blocking, spinner, Context, CorpusArgs};
use crate::constants::BODY_PREVIEW_WIDTH;
use crate::output::{Column, Output, OutputConfig, Outputter, TableOutput};

/// Per-invocation overrides of the `[search]` section.
pub struct SearchOptions<'a> {
    pub top_k: Option<usize>,
    pub batch_size: Option<usize>,
    pub metric: Option<&'a str>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HitRow {
    pub rank: usize,
    pub file: String,
    pub method: String,
    pub score: f32,
    pub shard: usize,
    pub row: usize,
    pub body: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryHits {
    pub query: usize,
    pub hits: Vec<HitRow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueryHits {
    pub fn from_outcome(query: usize, outcome: &bayou_core::Result<RankedResult>) -> Self {
        match outcome {
            Ok(result) => Self {
                query,
                hits: hit_rows(result),
                error: None,
            },
            Err(e) => Self {
                query,
                hits: Vec::new(),
                error: Some(e.to_string()),
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SearchResults {
    pub metric: Metric,
    pub top_k: usize,
    pub queries: Vec<QueryHits>,
    pub duration_ms: u64,
}

impl Outputter for SearchResults {
    fn to_table(&self, config: &OutputConfig) -> String {
        let columns = [
            Column::new("#", "rank").right_aligned(),
            Column::new("File", "file"),
            Column::new("Method", "method"),
            Column::new("Score", "score").right_aligned(),
            Column::new("Body", "body").truncated(BODY_PREVIEW_WIDTH),
        ];

        let mut output = format!(
            "{} {} queries, top {} by {} in {}ms\n",
            "SEARCH:".cyan().bold(),
            self.queries.len().to_string().green(),
            self.top_k,
            self.metric,
            self.duration_ms
        );
        for query in &self.queries {
            output.push_str(&format!("\n{} {}\n", "Query".bold(), query.query));
            match &query.error {
                Some(error) => output.push_str(&format!("{} {}", "error:".red().bold(), error)),
                None => output.push_str(&TableOutput::format_with_columns(&query.hits, &columns, config)),
            }
            output.push('\n');
        }
        output
    }
}

/// Rank all entries in padded batches of `batch_size`.
///
/// Returns one outcome per entry, in input order. An entry with the wrong
/// dimension or non-finite values fails only its own slot.
pub fn rank_batches(
    scanner: &Scanner<'_>,
    entries: Vec<QueryEntry>,
    batch_size: usize,
    num_threads: usize,
) -> anyhow::Result<Vec<bayou_core::Result<RankedResult>>> {
    let dimension = scanner.dimension();
    let mut outcomes: Vec<Option<bayou_core::Result<RankedResult>>> = Vec::with_capacity(entries.len());
    let mut positions = Vec::new();
    let mut valid = Vec::new();
    for (index, entry) in entries.into_iter().enumerate() {
        match entry.check(dimension) {
            Ok(()) => {
                positions.push(index);
                valid.push(entry);
                outcomes.push(None);
            }
            Err(e) => {
                warn!("Query {} not ranked: {}", index, e);
                outcomes.push(Some(Err(e)));
            }
        }
    }

    let batches = QueryBatch::batches(valid, batch_size, dimension, PaddingPolicy::Pad)?;
    for (b, batch) in batches.iter().enumerate() {
        for mut result in scanner.search_and_top_k_parallel(batch, num_threads)? {
            let index = positions[b * batch_size + result.query_index];
            result.query_index = index;
            outcomes[index] = Some(Ok(result));
        }
    }

    Ok(outcomes
        .into_iter()
        .map(|outcome| {
            outcome.unwrap_or_else(|| {
                Err(CoreError::InvalidBatch {
                    reason: "query was not ranked".to_string(),
                })
            })
        })
        .collect())
}

pub fn hit_rows(result: &RankedResult) -> Vec<HitRow> {
    result
        .hits
        .iter()
        .enumerate()
        .map(|(i, hit)| HitRow {
            rank: i + 1,
            file: hit.record.file_name.clone(),
            method: hit.record.method_name.clone(),
            score: hit.score,
            shard: hit.shard,
            row: hit.row,
            body: hit.record.body.split_whitespace().collect::<Vec<_>>().join(" "),
        })
        .collect()
}

pub async fn run(
    ctx: &Context,
    db: &Path,
    queries: &Path,
    corpus: &CorpusArgs,
    options: SearchOptions<'_>,
) -> anyhow::Result<()> {
    let settings = &ctx.config.search;
    let top_k = options.top_k.unwrap_or(settings.top_k);
    let batch_size = options.batch_size.unwrap_or(settings.batch_size);
    let metric = match options.metric {
        Some(name) => name.parse::<Metric>().map_err(anyhow::Error::msg)?,
        None => settings.metric,
    };

    let loader = corpus.loader_config(db, &ctx.config.database);
    let threads = loader.num_threads;
    let entries = read_query_file(queries, &loader.embedding_field)
        .with_context(|| format!("Failed to read queries from {}", queries.display()))?;
    if entries.is_empty() {
        bail!("No queries in {}", queries.display());
    }

    let loaded = load_corpus(loader, ctx.quiet).await?;
    let spinner = spinner(&format!("Ranking {} queries...", entries.len()), ctx.quiet);
    let start = Instant::now();
    let result = run_blocking(options.timeout_secs, move || {
        let scanner = Scanner::new(&loaded.database, top_k).with_metric(metric);
        rank_batches(&scanner, entries, batch_size, threads)
    })
    .await;
    spinner.finish_and_clear();
    let ranked = result?;
    let duration_ms = start.elapsed().as_millis() as u64;
    let failed = ranked.iter().filter(|r| r.is_err()).count();
    if failed == ranked.len() {
        bail!("None of the {} queries could be ranked", failed);
    }
    info!(
        "Ranked {} queries in {}ms ({} failed)",
        ranked.len() - failed,
        duration_ms,
        failed
    );

    let results = SearchResults {
        metric,
        top_k,
        queries: ranked
            .iter()
            .enumerate()
            .map(|(i, outcome)| QueryHits::from_outcome(i, outcome))
            .collect(),
        duration_ms,
    };
    Output::new(results, ctx.format).render()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bayou_core::{ColumnDatabase, ProgramRecord};

    fn database() -> ColumnDatabase {
        let mut db = ColumnDatabase::new(2);
        let records = vec![
            (ProgramRecord::new("A.java", "a", "void a() {\n}"), vec![1.0, 0.0]),
            (ProgramRecord::new("A.java", "b", ""), vec![0.0, 1.0]),
            (ProgramRecord::new("B.java", "c", ""), vec![0.9, 0.1]),
        ];
        db.add_records(records, 2).unwrap();
        db
    }

    #[test]
    fn test_rank_batches_numbers_queries_globally() {
        let db = database();
        let scanner = Scanner::new(&db, 2);
        let entries: Vec<_> = (0..5).map(|_| QueryEntry::new(vec![1.0, 0.0])).collect();
        let ranked = rank_batches(&scanner, entries, 2, 1).unwrap();

        let indices: Vec<_> = ranked.iter().map(|r| r.as_ref().unwrap().query_index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
        let last = ranked[4].as_ref().unwrap();
        let methods: Vec<_> = last.records().map(|r| r.method_name.as_str()).collect();
        assert_eq!(methods, vec!["a", "c"]);
    }

    #[test]
    fn test_bad_query_fails_only_its_slot() {
        let db = database();
        let scanner = Scanner::new(&db, 1);
        let entries = vec![
            QueryEntry::new(vec![0.0, 1.0]),
            QueryEntry::new(vec![1.0, 0.0, 0.0]),
            QueryEntry::new(vec![f32::NAN, 0.0]),
            QueryEntry::new(vec![1.0, 0.0]),
        ];
        let ranked = rank_batches(&scanner, entries, 2, 1).unwrap();

        assert_eq!(ranked.len(), 4);
        assert!(matches!(
            ranked[1],
            Err(CoreError::DimensionMismatch { expected: 2, actual: 3 })
        ));
        assert!(matches!(ranked[2], Err(CoreError::NonFiniteEmbedding { .. })));
        let first = ranked[0].as_ref().unwrap();
        assert_eq!(first.query_index, 0);
        assert_eq!(first.records().next().unwrap().method_name, "b");
        let last = ranked[3].as_ref().unwrap();
        assert_eq!(last.query_index, 3);
        assert_eq!(last.records().next().unwrap().method_name, "a");

        let rows: Vec<_> = ranked
            .iter()
            .enumerate()
            .map(|(i, r)| QueryHits::from_outcome(i, r))
            .collect();
        assert!(rows[0].error.is_none());
        assert!(rows[1].error.as_deref().unwrap().contains("Dimension mismatch"));
        let json = serde_json::to_value(&rows).unwrap();
        assert!(json[0].get("error").is_none());
        assert!(json[2]["error"].as_str().unwrap().contains("non-finite"));
        assert!(json[2]["hits"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_hit_rows_collapse_body() {
        let db = database();
        let result = Scanner::new(&db, 1).search_one(&[1.0, 0.0]).unwrap();
        let rows = hit_rows(&result);
        assert_eq!(rows[0].rank, 1);
        assert_eq!(rows[0].body, "void a() { }");
    }
}
