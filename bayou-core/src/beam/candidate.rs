use super::oracle::{ControlSymbols, Edge};
use super::tree::{NodeId, Tree};

/// One beam slot: a partial tree and where decoding continues from.
#[derive(Clone, Debug)]
pub struct Candidate<S> {
    pub tree: Tree,
    /// Node the next symbol is attached to.
    pub cursor: NodeId,
    /// Open constructs to return to on `STOP`.
    pub branch_stack: Vec<NodeId>,
    pub last_symbol: usize,
    pub last_edge: Edge,
    pub log_prob: f32,
    pub length: usize,
    pub state: S,
    /// False once the outermost chain has been closed.
    pub rolling: bool,
}

impl<S: Clone> Candidate<S> {
    pub fn new(control: &ControlSymbols, state: S, log_prob: f32) -> Self {
        let tree = Tree::new(control.subtree);
        Self {
            cursor: tree.root(),
            tree,
            branch_stack: Vec::new(),
            last_symbol: control.subtree,
            last_edge: Edge::Sibling,
            log_prob,
            length: 1,
            state,
            rolling: true,
        }
    }

    /// Finite log-probability.
    pub fn is_live(&self) -> bool {
        self.log_prob.is_finite()
    }

    pub fn is_finished(&self) -> bool {
        !self.rolling && self.is_live()
    }

    /// Attach `symbol` through the last edge and update the decoding position.
    ///
    /// The first symbol under a construct and every construct symbol are
    /// pushed and grow children. `STOP` closes the innermost open construct,
    /// or ends decoding when none is open. Anything else continues the
    /// sibling chain.
    pub fn grow(&mut self, symbol: usize, control: &ControlSymbols) {
        let node = match self.last_edge {
            Edge::Sibling => self.tree.add_sibling(self.cursor, symbol),
            Edge::Child => self.tree.add_child(self.cursor, symbol),
        };
        self.cursor = node;
        self.length += 1;

        let opens_child = self.last_edge == Edge::Child && control.is_construct(self.last_symbol);
        if opens_child || control.is_construct(symbol) {
            self.branch_stack.push(node);
            self.last_edge = Edge::Child;
            self.last_symbol = symbol;
        } else if symbol == control.stop {
            match self.branch_stack.pop() {
                None => self.rolling = false,
                Some(open) => {
                    self.cursor = open;
                    self.last_symbol = self.tree.node(open).symbol;
                    self.last_edge = Edge::Sibling;
                }
            }
        } else {
            self.last_edge = Edge::Sibling;
            self.last_symbol = symbol;
        }
    }
}
