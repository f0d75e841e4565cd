//! Synthesize command - beam-search ASTs for an evidence query

use std::path::Path;
use std::time::Instant;

use anyhow::{bail, Context as _};
use bayou_core::{synthesize, BeamConfig, EvidenceSet, ScoringOracle, SynthesizedAst};
use bayou_model::BayouModel;
use colored::Colorize;
use serde::Serialize;
use tracing::info;

use super::{run_blocking, spinner, Context};
use crate::output::{Output, TableDisplay};

#[derive(Debug, Serialize)]
pub struct SynthesisResult {
    pub evidence: EvidenceSet,
    pub beam_width: usize,
    pub asts: Vec<SynthesizedAst>,
    pub duration_ms: u64,
}

impl TableDisplay for SynthesisResult {
    fn to_table(&self) -> String {
        let mut output = format!(
            "{} {} programs from beam width {} in {}ms\n",
            "SYNTHESIS:".cyan().bold(),
            self.asts.len().to_string().green(),
            self.beam_width,
            self.duration_ms
        );
        for item in self.evidence.iter() {
            output.push_str(&format!(
                "  {} {}\n",
                format!("{}:", item.kind).dimmed(),
                item.tokens.join(", ")
            ));
        }

        for (i, ast) in self.asts.iter().enumerate() {
            output.push_str(&format!(
                "\n{:2}. {} {}\n",
                i + 1,
                format!("p={:.4}", ast.probability).green(),
                format!("(log p {:.3})", ast.log_probability).dimmed()
            ));
            let calls = ast.ast.api_calls();
            if calls.is_empty() {
                output.push_str(&format!("    {}\n", "(no calls)".dimmed()));
            }
            for call in calls {
                output.push_str(&format!("    {}\n", call));
            }
        }
        output
    }
}

/// Read the evidence object; a `{"programs": [...]}` file uses its first program.
fn read_evidence(path: &Path) -> anyhow::Result<EvidenceSet> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    let program = match value.get("programs").and_then(|p| p.get(0)) {
        Some(first) => first,
        None => &value,
    };
    let evidence = EvidenceSet::from_json(program);
    if evidence.is_empty() {
        bail!("No evidence found in {}", path.display());
    }
    Ok(evidence)
}

pub async fn run(
    ctx: &Context,
    model_dir: &Path,
    evidence_path: &Path,
    beam_width: Option<usize>,
    max_rounds: Option<usize>,
) -> anyhow::Result<()> {
    let evidence = read_evidence(evidence_path)?;
    let settings = &ctx.config.beam;
    let max_rounds = max_rounds.unwrap_or(settings.max_rounds);
    let requested_width = beam_width.or(settings.beam_width);

    let spinner = spinner("Loading model...", ctx.quiet);
    let dir = model_dir.to_path_buf();
    let model = run_blocking(None, move || Ok(BayouModel::load(&dir)?)).await;
    let model = match model {
        Ok(model) => model,
        Err(e) => {
            spinner.finish_and_clear();
            return Err(e.context(format!("Failed to load model from {}", model_dir.display())));
        }
    };

    let model = match requested_width {
        Some(width) if width != model.batch_size() => match model.with_batch_size(width) {
            Ok(model) => model,
            Err(e) => {
                spinner.finish_and_clear();
                return Err(anyhow::Error::from(e).context(format!("Invalid beam width {}", width)));
            }
        },
        _ => model,
    };
    let beam_width = model.batch_size();
    let config = BeamConfig::new(beam_width).with_max_rounds(max_rounds);
    spinner.set_message("Decoding...");
    let start = Instant::now();
    let query = evidence.clone();
    let result = run_blocking(None, move || Ok(synthesize(&model, &query, config)?)).await;
    spinner.finish_and_clear();
    let asts = result?;
    let duration_ms = start.elapsed().as_millis() as u64;
    info!("Synthesized {} programs in {}ms", asts.len(), duration_ms);

    let result = SynthesisResult {
        evidence,
        beam_width,
        asts,
        duration_ms,
    };
    Output::new(result, ctx.format).render()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bayou_core::{AstNode, EvidenceKind};
    use tempfile::tempdir;

    #[test]
    fn test_read_evidence_object_and_programs() {
        let dir = tempdir().unwrap();
        let plain = dir.path().join("plain.json");
        std::fs::write(&plain, r#"{"apicalls": ["readLine"], "types": ["BufferedReader"]}"#).unwrap();
        let evidence = read_evidence(&plain).unwrap();
        assert_eq!(evidence.len(), 2);

        let wrapped = dir.path().join("wrapped.json");
        std::fs::write(&wrapped, r#"{"programs": [{"keywords": ["read", "file"]}]}"#).unwrap();
        let evidence = read_evidence(&wrapped).unwrap();
        assert!(evidence.get(EvidenceKind::Keywords).is_some());

        let empty = dir.path().join("empty.json");
        std::fs::write(&empty, "{}").unwrap();
        assert!(read_evidence(&empty).is_err());
    }

    #[test]
    fn test_table_lists_calls() {
        let result = SynthesisResult {
            evidence: EvidenceSet::new(),
            beam_width: 2,
            asts: vec![SynthesizedAst {
                ast: AstNode::DSubTree {
                    nodes: vec![AstNode::call("java.io.File.exists()")],
                },
                probability: 0.5,
                log_probability: 0.5f32.ln(),
            }],
            duration_ms: 3,
        };
        let table = TableDisplay::to_table(&result);
        assert!(table.contains("java.io.File.exists()"));
        assert!(table.contains("p=0.5000"));
    }
}
