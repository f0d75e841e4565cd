//! Arena-allocated partial ASTs.

/// Index of a node in its [`Tree`].
pub type NodeId = usize;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TreeNode {
    pub symbol: usize,
    pub child: Option<NodeId>,
    pub sibling: Option<NodeId>,
}

/// A tree whose nodes live in one vector and link by index.
///
/// Cloning a tree is a flat copy, which is what beam selection needs when a
/// parent is picked by several successors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tree {
    nodes: Vec<TreeNode>,
}

impl Tree {
    pub fn new(root_symbol: usize) -> Self {
        Self {
            nodes: vec![TreeNode {
                symbol: root_symbol,
                child: None,
                sibling: None,
            }],
        }
    }

    pub fn root(&self) -> NodeId {
        0
    }

    pub fn node(&self, id: NodeId) -> &TreeNode {
        &self.nodes[id]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Attach a new node as the child of `parent`, replacing any existing link.
    pub fn add_child(&mut self, parent: NodeId, symbol: usize) -> NodeId {
        let id = self.push(symbol);
        self.nodes[parent].child = Some(id);
        id
    }

    /// Attach a new node as the sibling of `node`, replacing any existing link.
    pub fn add_sibling(&mut self, node: NodeId, symbol: usize) -> NodeId {
        let id = self.push(symbol);
        self.nodes[node].sibling = Some(id);
        id
    }

    fn push(&mut self, symbol: usize) -> NodeId {
        self.nodes.push(TreeNode {
            symbol,
            child: None,
            sibling: None,
        });
        self.nodes.len() - 1
    }

    /// Whether any node has a child link.
    pub fn has_children(&self) -> bool {
        self.nodes.iter().any(|n| n.child.is_some())
    }

    /// Follow sibling links from `start`.
    pub fn siblings(&self, start: Option<NodeId>) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(start, move |&id| self.nodes[id].sibling)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_links() {
        let mut tree = Tree::new(0);
        let a = tree.add_sibling(tree.root(), 1);
        let b = tree.add_sibling(a, 2);
        let c = tree.add_child(a, 3);

        assert_eq!(tree.len(), 4);
        assert_eq!(tree.node(a).child, Some(c));
        let chain: Vec<_> = tree.siblings(Some(tree.root())).collect();
        assert_eq!(chain, vec![0, a, b]);
        assert!(tree.has_children());
        assert_eq!(tree.siblings(None).count(), 0);
    }
}
