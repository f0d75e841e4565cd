//! Precision command - evaluate retrieval against labelled queries

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context as _};
use bayou_core::evaluation::{QueryEvaluation, DEFAULT_HIT_POINTS};
use bayou_core::query::read_query_file;
use bayou_core::{Desired, PrecisionReport, PrecisionTracker, RankedResult, Scanner};
use colored::Colorize;
use serde::Serialize;
use tracing::info;

use super::search::{hit_rows, rank_batches, HitRow};
use super::{load_corpus, run_blocking, spinner, Context, CorpusArgs};
use crate::output::{Column, JsonOutput, Output, OutputConfig, Outputter, TableOutput};

pub struct PrecisionOptions {
    pub top_k: Option<usize>,
    pub hit_points: Vec<usize>,
    pub output: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
}

/// One line of the `--output` dump.
#[derive(Debug, Serialize)]
struct QueryDump {
    query: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    evaluation: Option<QueryEvaluation>,
    hits: Vec<HitRow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct KindRow {
    kind: String,
    mrr: String,
    first_hit: String,
    precision: String,
    cdf: String,
}

fn fixed(values: &[f64]) -> String {
    values
        .iter()
        .map(|v| format!("{:.3}", v))
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Serialize)]
pub struct PrecisionResult {
    #[serde(flatten)]
    pub report: PrecisionReport,
    /// Queries left out of the report because they could not be ranked.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed_queries: Vec<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl Outputter for PrecisionResult {
    fn to_table(&self, config: &OutputConfig) -> String {
        let report = &self.report;
        let mut output = format!(
            "{} {} queries, top {}, cut-offs {:?}\n",
            "PRECISION:".cyan().bold(),
            report.queries.to_string().green(),
            report.top_k,
            report.hit_points
        );

        let rows: Vec<KindRow> = report
            .kinds
            .iter()
            .map(|k| KindRow {
                kind: format!("{:?}", k.kind).to_lowercase(),
                mrr: format!("{:.3}", k.mean_reciprocal_rank),
                first_hit: format!("{:.2}", k.average_first_hit_rank),
                precision: fixed(&k.precision),
                cdf: fixed(&k.first_hit_cdf),
            })
            .collect();
        let columns = [
            Column::new("Match", "kind"),
            Column::new("MRR", "mrr").right_aligned(),
            Column::new("Avg first hit", "first_hit").right_aligned(),
            Column::new("Precision@k", "precision"),
            Column::new("First-hit CDF@k", "cdf"),
        ];
        output.push_str(&TableOutput::format_with_columns(&rows, &columns, config));

        output.push_str(&format!(
            "\n{} api {}\n{} sequence {}",
            "Jaccard:".dimmed(),
            fixed(&report.api_jaccard),
            "Jaccard:".dimmed(),
            fixed(&report.sequence_jaccard)
        ));
        if !self.failed_queries.is_empty() {
            output.push_str(&format!(
                "\n{} {} queries not ranked: {:?}",
                "error:".red().bold(),
                self.failed_queries.len(),
                self.failed_queries
            ));
        }
        if let Some(path) = &self.output {
            output.push_str(&format!("\n{} {}", "Wrote".dimmed(), path));
        }
        output
    }
}

/// Cut-offs to report: explicit ones, or 1..=10 limited to `top_k`.
fn resolve_hit_points(explicit: Vec<usize>, top_k: usize) -> Vec<usize> {
    if !explicit.is_empty() {
        return explicit;
    }
    DEFAULT_HIT_POINTS
        .iter()
        .copied()
        .filter(|&p| p <= top_k)
        .collect()
}

/// Score every ranked result against its desired program.
///
/// Failed queries get a dump line with their error and are left out of the
/// report.
fn evaluate(
    desired: &[Desired],
    ranked: &[bayou_core::Result<RankedResult>],
    top_k: usize,
    hit_points: &[usize],
) -> (PrecisionReport, Vec<QueryDump>) {
    let mut tracker = PrecisionTracker::new(top_k, hit_points);
    let dumps: Vec<QueryDump> = ranked
        .iter()
        .zip(desired)
        .enumerate()
        .map(|(query, (outcome, desired))| match outcome {
            Ok(result) => QueryDump {
                query,
                evaluation: Some(tracker.record(desired, result)),
                hits: hit_rows(result),
                error: None,
            },
            Err(e) => QueryDump {
                query,
                evaluation: None,
                hits: Vec::new(),
                error: Some(e.to_string()),
            },
        })
        .collect();
    (tracker.report(), dumps)
}

pub async fn run(
    ctx: &Context,
    db: &Path,
    queries: &Path,
    corpus: &CorpusArgs,
    options: PrecisionOptions,
) -> anyhow::Result<()> {
    let top_k = options.top_k.unwrap_or(ctx.config.search.top_k);
    let batch_size = ctx.config.search.batch_size;
    let metric = ctx.config.search.metric;
    let hit_points = resolve_hit_points(options.hit_points, top_k);

    let loader = corpus.loader_config(db, &ctx.config.database);
    let threads = loader.num_threads;
    let entries = read_query_file(queries, &loader.embedding_field)
        .with_context(|| format!("Failed to read queries from {}", queries.display()))?;
    if entries.is_empty() {
        bail!("No queries in {}", queries.display());
    }
    if entries.iter().any(|e| !e.metadata.is_object()) {
        bail!(
            "{} has no labelled programs; precision needs the `programs` layout",
            queries.display()
        );
    }
    let desired: Vec<Desired> = entries.iter().map(|e| Desired::from_json(&e.metadata)).collect();

    let loaded = load_corpus(loader, ctx.quiet).await?;
    let spinner = spinner(&format!("Evaluating {} queries...", entries.len()), ctx.quiet);
    let result = run_blocking(options.timeout_secs, move || {
        let scanner = Scanner::new(&loaded.database, top_k).with_metric(metric);
        let ranked = rank_batches(&scanner, entries, batch_size, threads)?;
        Ok(evaluate(&desired, &ranked, top_k, &hit_points))
    })
    .await;
    spinner.finish_and_clear();
    let (report, dumps) = result?;
    let failed_queries: Vec<usize> = dumps
        .iter()
        .filter(|d| d.error.is_some())
        .map(|d| d.query)
        .collect();
    if report.queries == 0 {
        bail!("None of the {} queries could be ranked", failed_queries.len());
    }
    info!(
        "Evaluated {} queries ({} failed)",
        report.queries,
        failed_queries.len()
    );

    let output = match &options.output {
        Some(path) => {
            fs::write(path, JsonOutput::format_lines(&dumps) + "\n")
                .with_context(|| format!("Failed to write {}", path.display()))?;
            Some(path.display().to_string())
        }
        None => None,
    };
    Output::new(
        PrecisionResult {
            report,
            failed_queries,
            output,
        },
        ctx.format,
    )
    .render()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bayou_core::evaluation::MatchKind;
    use bayou_core::{ColumnDatabase, EvalLabels, ProgramRecord, QueryEntry};
    use serde_json::json;

    #[test]
    fn test_default_hit_points_follow_top_k() {
        assert_eq!(resolve_hit_points(Vec::new(), 3), vec![1, 2, 3]);
        assert_eq!(resolve_hit_points(vec![2, 4], 3), vec![2, 4]);
    }

    #[test]
    fn test_evaluate_finds_desired_program() {
        let labels = |calls: &[&str]| EvalLabels {
            api_calls: calls.iter().map(|c| c.to_string()).collect(),
            ..EvalLabels::default()
        };
        let mut db = ColumnDatabase::new(2);
        db.add_records(
            vec![
                (
                    ProgramRecord::new("A.java", "a", "int a() { return 1; }").with_labels(labels(&["x"])),
                    vec![1.0, 0.0],
                ),
                (
                    ProgramRecord::new("B.java", "b", "int b() { return 2; }").with_labels(labels(&["y"])),
                    vec![0.8, 0.0],
                ),
            ],
            10,
        )
        .unwrap();

        let program = json!({"body": "int b() {\n return 2; }", "apicalls": ["y"], "embedding": [1.0, 0.0]});
        let desired = vec![Desired::from_json(&program)];
        let scanner = Scanner::new(&db, 2);
        let ranked = rank_batches(&scanner, vec![QueryEntry::new(vec![1.0, 0.0])], 1, 1).unwrap();

        let (report, dumps) = evaluate(&desired, &ranked, 2, &[1, 2]);
        assert_eq!(dumps[0].evaluation.as_ref().unwrap().first_hit_rank_body, 1);
        let body = report.kind(MatchKind::Body).unwrap();
        assert_eq!(body.first_hit_cdf, vec![0.0, 1.0]);
        assert!((body.mean_reciprocal_rank - 0.5).abs() < 1e-12);

        let line = JsonOutput::format_lines(&dumps);
        assert!(line.contains("\"method\":\"b\""));
    }

    #[test]
    fn test_failed_query_is_left_out_of_report() {
        let mut db = ColumnDatabase::new(2);
        db.add_records(
            vec![(ProgramRecord::new("A.java", "a", "void a() {}"), vec![1.0, 0.0])],
            10,
        )
        .unwrap();
        let program = json!({"body": "void a() {}"});
        let desired = vec![Desired::from_json(&program), Desired::from_json(&program)];
        let entries = vec![
            QueryEntry::new(vec![1.0]),
            QueryEntry::new(vec![1.0, 0.0]),
        ];
        let ranked = rank_batches(&Scanner::new(&db, 1), entries, 2, 1).unwrap();

        let (report, dumps) = evaluate(&desired, &ranked, 1, &[1]);
        assert_eq!(report.queries, 1);
        assert_eq!(dumps.len(), 2);
        assert!(dumps[0].evaluation.is_none());
        assert!(dumps[0].error.as_deref().unwrap().contains("Dimension mismatch"));
        assert_eq!(dumps[1].query, 1);
        assert_eq!(dumps[1].evaluation.as_ref().unwrap().first_hit_rank_body, 0);

        let lines = JsonOutput::format_lines(&dumps);
        assert!(lines.lines().next().unwrap().contains("\"error\""));
    }
}
