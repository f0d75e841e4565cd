//! Evidence read from a query program.
//!
//! Each [`EvidenceKind`] knows which field of a program object it reads and
//! how to turn it into tokens. Tokens are passed to the scoring oracle as-is.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The closed set of evidence kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceKind {
    ApiCalls,
    Types,
    Keywords,
    ReturnType,
    FormalParams,
    ClassTypes,
    JavaDoc,
}

/// Tokens of one evidence kind.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    pub kind: EvidenceKind,
    pub tokens: Vec<String>,
}

impl EvidenceKind {
    pub const ALL: [EvidenceKind; 7] = [
        EvidenceKind::ApiCalls,
        EvidenceKind::Types,
        EvidenceKind::Keywords,
        EvidenceKind::ReturnType,
        EvidenceKind::FormalParams,
        EvidenceKind::ClassTypes,
        EvidenceKind::JavaDoc,
    ];

    /// Field name in a program object.
    pub fn field(&self) -> &'static str {
        match self {
            EvidenceKind::ApiCalls => "apicalls",
            EvidenceKind::Types => "types",
            EvidenceKind::Keywords => "keywords",
            EvidenceKind::ReturnType => "returnType",
            EvidenceKind::FormalParams => "formalParam",
            EvidenceKind::ClassTypes => "classTypes",
            EvidenceKind::JavaDoc => "javaDoc",
        }
    }

    /// Snake-case name used in configuration files.
    pub fn name(&self) -> &'static str {
        match self {
            EvidenceKind::ApiCalls => "api_calls",
            EvidenceKind::Types => "types",
            EvidenceKind::Keywords => "keywords",
            EvidenceKind::ReturnType => "return_type",
            EvidenceKind::FormalParams => "formal_params",
            EvidenceKind::ClassTypes => "class_types",
            EvidenceKind::JavaDoc => "java_doc",
        }
    }

    /// Whether token order matters to the encoder.
    pub fn is_sequence(&self) -> bool {
        matches!(self, EvidenceKind::FormalParams | EvidenceKind::JavaDoc)
    }

    /// Read this kind from a program object. Missing or empty fields give `None`.
    pub fn read(&self, program: &Value) -> Option<Evidence> {
        let value = program.get(self.field())?;
        let mut tokens = match (self, value) {
            (EvidenceKind::JavaDoc, Value::String(text)) => text
                .split_whitespace()
                .map(|w| w.to_lowercase())
                .collect(),
            (_, Value::String(token)) => vec![token.clone()],
            (_, Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        };
        if !self.is_sequence() {
            tokens.sort();
            tokens.dedup();
        }
        if tokens.is_empty() {
            return None;
        }
        Some(Evidence {
            kind: *self,
            tokens,
        })
    }
}

impl fmt::Display for EvidenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.field())
    }
}

impl FromStr for EvidenceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EvidenceKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.field().eq_ignore_ascii_case(s) || kind.name() == s)
            .ok_or_else(|| format!("Unknown evidence kind: '{}'", s))
    }
}

/// All evidence available for one query, in [`EvidenceKind::ALL`] order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceSet {
    items: Vec<Evidence>,
}

impl EvidenceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read every known kind present in a program object.
    pub fn from_json(program: &Value) -> Self {
        Self {
            items: EvidenceKind::ALL
                .iter()
                .filter_map(|kind| kind.read(program))
                .collect(),
        }
    }

    /// Add or replace the evidence of one kind.
    pub fn insert(&mut self, evidence: Evidence) {
        match self.items.iter_mut().find(|e| e.kind == evidence.kind) {
            Some(existing) => *existing = evidence,
            None => {
                self.items.push(evidence);
                self.items.sort_by_key(|e| e.kind);
            }
        }
    }

    pub fn get(&self, kind: EvidenceKind) -> Option<&Evidence> {
        self.items.iter().find(|e| e.kind == kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Evidence> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_reads_known_fields() {
        let program = json!({
            "apicalls": ["readLine", "close", "readLine"],
            "returnType": "String",
            "formalParam": ["File", "int"],
            "javaDoc": "Reads  the FIRST line",
            "types": [],
            "unrelated": 3
        });
        let set = EvidenceSet::from_json(&program);

        assert_eq!(set.len(), 4);
        assert_eq!(
            set.get(EvidenceKind::ApiCalls).unwrap().tokens,
            vec!["close", "readLine"]
        );
        assert_eq!(set.get(EvidenceKind::ReturnType).unwrap().tokens, vec!["String"]);
        assert_eq!(
            set.get(EvidenceKind::FormalParams).unwrap().tokens,
            vec!["File", "int"]
        );
        assert_eq!(
            set.get(EvidenceKind::JavaDoc).unwrap().tokens,
            vec!["reads", "the", "first", "line"]
        );
        assert!(set.get(EvidenceKind::Types).is_none());
    }

    #[test]
    fn test_insert_keeps_kind_order() {
        let mut set = EvidenceSet::new();
        set.insert(Evidence {
            kind: EvidenceKind::Keywords,
            tokens: vec!["file".into()],
        });
        set.insert(Evidence {
            kind: EvidenceKind::ApiCalls,
            tokens: vec!["open".into()],
        });
        set.insert(Evidence {
            kind: EvidenceKind::Keywords,
            tokens: vec!["read".into()],
        });

        let kinds: Vec<_> = set.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![EvidenceKind::ApiCalls, EvidenceKind::Keywords]);
        assert_eq!(set.get(EvidenceKind::Keywords).unwrap().tokens, vec!["read"]);
    }

    #[test]
    fn test_kind_from_str() {
        assert_eq!("apicalls".parse::<EvidenceKind>().unwrap(), EvidenceKind::ApiCalls);
        assert_eq!("api_calls".parse::<EvidenceKind>().unwrap(), EvidenceKind::ApiCalls);
        assert_eq!("returnType".parse::<EvidenceKind>().unwrap(), EvidenceKind::ReturnType);
        assert!("sorrounding".parse::<EvidenceKind>().is_err());
    }
}
