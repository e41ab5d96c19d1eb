use std::fmt::Debug;
use std::hash::Hash;
use std::ops::Index;

use crate::Id;

/// Enode type stored in an [`EGraph`](crate::EGraph).
///
/// Equality and hashing must cover the operator and the children ids, so two enodes with
/// the same operator over the same canonical classes hash-cons to one.
pub trait Language: Debug + Clone + Eq + Hash {
    fn children(&self) -> &[Id];

    fn children_mut(&mut self) -> &mut [Id];

    fn is_leaf(&self) -> bool {
        self.children().is_empty()
    }

    /// Copy of `self` with every child replaced by `f(child)`.
    fn map_children(&self, mut f: impl FnMut(Id) -> Id) -> Self {
        let mut node = self.clone();
        for child in node.children_mut() {
            *child = f(*child);
        }
        node
    }
}

/// Term stored as a flat list of enodes; children always point at earlier entries.
///
/// The last node is the root.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecExpr<L> {
    nodes: Vec<L>,
}

impl<L> Default for RecExpr<L> {
    fn default() -> Self {
        Self { nodes: Vec::new() }
    }
}

impl<L: Language> RecExpr<L> {
    /// Appends `node`, whose children must already be in the expression.
    pub fn add(&mut self, node: L) -> Id {
        debug_assert!(
            node.children().iter().all(|&child| usize::from(child) < self.nodes.len()),
            "RecExpr::add: {node:?} references a later node"
        );
        self.nodes.push(node);
        Id::from(self.nodes.len() - 1)
    }

    pub fn root(&self) -> Option<Id> {
        self.nodes.len().checked_sub(1).map(Id::from)
    }

    pub fn nodes(&self) -> &[L] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl<L> Index<Id> for RecExpr<L> {
    type Output = L;

    fn index(&self, id: Id) -> &L {
        &self.nodes[usize::from(id)]
    }
}
