//! Shared data types for indexed programs.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Labels attached to a program for offline evaluation.
///
/// Not used by retrieval itself.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EvalLabels {
    /// Set of API calls made by the program, sorted and de-duplicated.
    #[serde(default)]
    pub api_calls: Vec<String>,

    /// Longest observed call sequence.
    #[serde(default)]
    pub sequence: Vec<String>,

    /// Program AST in the output AST JSON shape.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ast: Option<Value>,
}

impl EvalLabels {
    /// Check whether no label is present.
    pub fn is_empty(&self) -> bool {
        self.api_calls.is_empty() && self.sequence.is_empty() && self.ast.is_none()
    }
}

/// An indexed program.
///
/// The embedding lives in the owning shard's matrix row, aligned with the
/// record position. Records are shared read-only with ranked results.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgramRecord {
    /// Source file the method was extracted from.
    pub file_name: String,

    /// Method name.
    pub method_name: String,

    /// Method body text.
    pub body: String,

    /// Evaluation labels.
    #[serde(default, skip_serializing_if = "EvalLabels::is_empty")]
    pub labels: EvalLabels,
}

impl ProgramRecord {
    pub fn new(
        file_name: impl Into<String>,
        method_name: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            method_name: method_name.into(),
            body: body.into(),
            labels: EvalLabels::default(),
        }
    }

    /// Attach evaluation labels.
    pub fn with_labels(mut self, labels: EvalLabels) -> Self {
        self.labels = labels;
        self
    }
}
