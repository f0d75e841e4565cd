//! Load command - read a corpus and report what was accepted

use std::path::Path;

use bayou_core::LoadReport;
use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::Serialize;

use super::{load_corpus, Context, CorpusArgs};
use crate::output::{Output, OutputConfig, Outputter, TableOutput};

/// Load report with where and when the corpus was read.
#[derive(Debug, Serialize)]
pub struct LoadSummary {
    pub location: String,
    pub loaded_at: DateTime<Utc>,
    pub dimension: usize,
    #[serde(flatten)]
    pub report: LoadReport,
}

impl Outputter for LoadSummary {
    fn to_table(&self, config: &OutputConfig) -> String {
        let r = &self.report;
        let mut output = format!(
            "{} {}\n",
            "CORPUS:".cyan().bold(),
            self.location
        );
        let pairs = [
            ("Files seen", r.files_seen.to_string()),
            ("Files parsed", r.files_parsed.to_string()),
            ("Files failed", r.files_failed.to_string()),
            ("Files skipped", r.files_skipped.to_string()),
            ("Records", r.records_accepted.to_string()),
            ("Records skipped", r.records_skipped.to_string()),
            ("Shards", r.shards.to_string()),
            ("Dimension", self.dimension.to_string()),
            ("Duration", format!("{:.1}ms", r.duration_ms)),
            ("Loaded at", self.loaded_at.format("%Y-%m-%d %H:%M:%S UTC").to_string()),
        ];
        output.push_str(&TableOutput::format_key_value(&pairs, config));
        if r.timed_out {
            output.push_str(&format!(
                "\n{} load deadline passed; remaining files were skipped",
                "WARNING:".yellow().bold()
            ));
        }
        output
    }
}

pub async fn run(ctx: &Context, db: &Path, corpus: &CorpusArgs) -> anyhow::Result<()> {
    let loader = corpus.loader_config(db, &ctx.config.database);
    let dimension = loader.dimension;
    let loaded = load_corpus(loader, ctx.quiet).await?;

    let summary = LoadSummary {
        location: db.display().to_string(),
        loaded_at: Utc::now(),
        dimension,
        report: loaded.report,
    };
    Output::new(summary, ctx.format).render()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::OutputFormat;

    fn summary(timed_out: bool) -> LoadSummary {
        LoadSummary {
            location: "corpus/".to_string(),
            loaded_at: Utc::now(),
            dimension: 2,
            report: LoadReport {
                files_seen: 3,
                files_parsed: 2,
                records_accepted: 40,
                records_skipped: 1,
                shards: 2,
                timed_out,
                ..LoadReport::default()
            },
        }
    }

    #[test]
    fn test_json_is_flat() {
        let config = OutputConfig {
            format: OutputFormat::Json,
            wrap: None,
        };
        let json: serde_json::Value = serde_json::from_str(&summary(false).render(&config)).unwrap();
        assert_eq!(json["records_accepted"], 40);
        assert_eq!(json["location"], "corpus/");
    }

    #[test]
    fn test_table_warns_on_timeout() {
        let config = OutputConfig {
            format: OutputFormat::Table,
            wrap: None,
        };
        assert!(!summary(false).render(&config).contains("deadline"));
        assert!(summary(true).render(&config).contains("deadline"));
    }
}
