//! Output AST in the Bayou JSON shape.
//!
//! A finished beam candidate is a chain of sibling links under the
//! `DSubTree` root. Constructs keep their nested chains under child links:
//!
//! | Construct | first part            | second part                 |
//! |-----------|-----------------------|-----------------------------|
//! | `DBranch` | `_then` = chain(child) | `_else` = chain(child.child) |
//! | `DExcept` | `_try` = chain(child)  | `_catch` = chain(child.child) |
//! | `DLoop`   | `_cond` = chain(child) | `_body` = chain(child.child)  |
//!
//! `DBranch._cond` is always empty. A chain ends at `STOP` or at a missing link.

use serde::{Deserialize, Serialize};

use crate::beam::{Candidate, NodeId, Tree, Vocabulary};
use crate::error::{CoreError, Result};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "node")]
pub enum AstNode {
    DSubTree {
        #[serde(rename = "_nodes")]
        nodes: Vec<AstNode>,
    },
    #[serde(rename = "DAPICall")]
    DApiCall {
        #[serde(rename = "_call")]
        call: String,
    },
    DBranch {
        #[serde(rename = "_cond")]
        cond: Vec<AstNode>,
        #[serde(rename = "_then")]
        then_branch: Vec<AstNode>,
        #[serde(rename = "_else")]
        else_branch: Vec<AstNode>,
    },
    DExcept {
        #[serde(rename = "_try")]
        try_block: Vec<AstNode>,
        #[serde(rename = "_catch")]
        catch_block: Vec<AstNode>,
    },
    DLoop {
        #[serde(rename = "_cond")]
        cond: Vec<AstNode>,
        #[serde(rename = "_body")]
        body: Vec<AstNode>,
    },
}

impl AstNode {
    pub fn call(name: impl Into<String>) -> Self {
        AstNode::DApiCall { call: name.into() }
    }

    /// Direct children, in field order.
    pub fn children(&self) -> Vec<&AstNode> {
        match self {
            AstNode::DSubTree { nodes } => nodes.iter().collect(),
            AstNode::DApiCall { .. } => Vec::new(),
            AstNode::DBranch {
                cond,
                then_branch,
                else_branch,
            } => cond.iter().chain(then_branch).chain(else_branch).collect(),
            AstNode::DExcept {
                try_block,
                catch_block,
            } => try_block.iter().chain(catch_block).collect(),
            AstNode::DLoop { cond, body } => cond.iter().chain(body).collect(),
        }
    }

    /// API calls in depth-first order, duplicates kept.
    pub fn api_calls(&self) -> Vec<&str> {
        let mut calls = Vec::new();
        self.collect_calls(&mut calls);
        calls
    }

    fn collect_calls<'a>(&'a self, out: &mut Vec<&'a str>) {
        if let AstNode::DApiCall { call } = self {
            out.push(call);
        }
        for child in self.children() {
            child.collect_calls(out);
        }
    }

    /// Convert a decoded tree, starting from the root's sibling chain.
    pub fn from_tree(tree: &Tree, vocabulary: &Vocabulary) -> Result<Self> {
        let first = tree.node(tree.root()).sibling;
        Ok(AstNode::DSubTree {
            nodes: chain(tree, first, vocabulary)?,
        })
    }
}

fn chain(tree: &Tree, start: Option<NodeId>, vocabulary: &Vocabulary) -> Result<Vec<AstNode>> {
    let control = vocabulary.control();
    let mut nodes = Vec::new();
    for id in tree.siblings(start) {
        let node = tree.node(id);
        if node.symbol == control.stop {
            break;
        }
        let first = node.child;
        let second = first.and_then(|c| tree.node(c).child);

        let ast = if node.symbol == control.branch {
            AstNode::DBranch {
                cond: Vec::new(),
                then_branch: chain(tree, first, vocabulary)?,
                else_branch: chain(tree, second, vocabulary)?,
            }
        } else if node.symbol == control.except {
            AstNode::DExcept {
                try_block: chain(tree, first, vocabulary)?,
                catch_block: chain(tree, second, vocabulary)?,
            }
        } else if node.symbol == control.loop_ {
            AstNode::DLoop {
                cond: chain(tree, first, vocabulary)?,
                body: chain(tree, second, vocabulary)?,
            }
        } else {
            let symbol = vocabulary
                .symbol(node.symbol)
                .ok_or_else(|| CoreError::InvalidVocabulary {
                    message: format!("symbol id {} is not in the vocabulary", node.symbol),
                })?;
            AstNode::call(symbol)
        };
        nodes.push(ast);
    }
    Ok(nodes)
}

/// A ranked synthesis result.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SynthesizedAst {
    pub ast: AstNode,
    /// `exp(log_probability)`.
    pub probability: f64,
    pub log_probability: f32,
}

impl SynthesizedAst {
    pub fn from_candidate<S: Clone>(candidate: &Candidate<S>, vocabulary: &Vocabulary) -> Result<Self> {
        Ok(Self {
            ast: AstNode::from_tree(&candidate.tree, vocabulary)?,
            probability: f64::from(candidate.log_prob).exp(),
            log_probability: candidate.log_prob,
        })
    }
}
