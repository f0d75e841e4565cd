//! Vocabularies read from `vocab.json`.
//!
//! ```json
//! {"decoder": ["DSubTree", "STOP", "DBranch", "DLoop", "DExcept", "java.io.File.exists()"],
//!  "evidence": {"api_calls": ["exists", "read"], "types": ["File"]}}
//! ```
//!
//! Evidence keys accept either the program field name (`apicalls`) or the
//! snake-case kind name (`api_calls`).

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use bayou_core::{EvidenceKind, Vocabulary};
use serde::Deserialize;

use crate::error::{ModelError, Result};

/// Token index of one evidence kind; unknown tokens are ignored.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenIndex {
    index: HashMap<String, usize>,
}

impl TokenIndex {
    pub fn new(tokens: &[String]) -> Self {
        let mut index = HashMap::with_capacity(tokens.len());
        for token in tokens {
            let next = index.len();
            index.entry(token.clone()).or_insert(next);
        }
        Self { index }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Multi-hot bag over the index. `None` when no token is known.
    pub fn bag(&self, tokens: &[String]) -> Option<Vec<f32>> {
        let mut bag = vec![0.0f32; self.index.len()];
        let mut known = false;
        for token in tokens {
            if let Some(&i) = self.index.get(token) {
                bag[i] = 1.0;
                known = true;
            }
        }
        known.then_some(bag)
    }
}

#[derive(Deserialize)]
struct RawVocab {
    decoder: Vec<String>,
    #[serde(default)]
    evidence: BTreeMap<String, Vec<String>>,
}

/// Decoder vocabulary plus one token index per evidence kind.
#[derive(Debug, Clone)]
pub struct ModelVocabulary {
    pub decoder: Vocabulary,
    pub evidence: BTreeMap<EvidenceKind, TokenIndex>,
}

impl ModelVocabulary {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&content)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let raw: RawVocab = serde_json::from_str(json)?;
        let decoder = Vocabulary::new(raw.decoder).map_err(|e| ModelError::VocabularyError {
            message: e.to_string(),
        })?;

        let mut evidence = BTreeMap::new();
        for (key, tokens) in raw.evidence {
            let kind: EvidenceKind = key
                .parse()
                .map_err(|message| ModelError::VocabularyError { message })?;
            evidence.insert(kind, TokenIndex::new(&tokens));
        }
        Ok(Self { decoder, evidence })
    }

    /// Index for `kind`, or an error naming the missing kind.
    pub fn evidence_index(&self, kind: EvidenceKind) -> Result<&TokenIndex> {
        self.evidence
            .get(&kind)
            .filter(|index| !index.is_empty())
            .ok_or_else(|| ModelError::VocabularyError {
                message: format!("no vocabulary for evidence '{}'", kind),
            })
    }
}
