//! Tree rendering of expression DAGs.
//!
//! Shared operands are printed once; later occurrences show `%id -> (see above)`.

use std::borrow::Cow;
use std::cell::RefCell;
use std::collections::HashSet;
use std::{fmt, io};
use std::rc::Rc;

use ptree::{Style, TreeItem};

use crate::expr::{ExprId, Graph, Node};

#[derive(Clone)]
pub struct ExprTree<'g> {
    graph: &'g Graph,
    id: ExprId,
    visited: Rc<RefCell<HashSet<ExprId>>>,
    is_backref: RefCell<bool>,
}

impl<'g> ExprTree<'g> {
    pub fn new(graph: &'g Graph, id: ExprId) -> Self {
        Self { graph, id, visited: Rc::default(), is_backref: RefCell::new(false) }
    }

    fn child(&self, id: ExprId) -> Self {
        Self { graph: self.graph, id, visited: Rc::clone(&self.visited), is_backref: RefCell::new(false) }
    }
}

impl TreeItem for ExprTree<'_> {
    type Child = Self;

    fn write_self<W: io::Write>(&self, f: &mut W, _style: &Style) -> io::Result<()> {
        if !self.visited.borrow_mut().insert(self.id) {
            *self.is_backref.borrow_mut() = true;
            return write!(f, "{} -> (see above)", self.id);
        }
        write!(f, "{}", format_node(self.graph, self.id))
    }

    fn children(&self) -> Cow<'_, [Self::Child]> {
        if *self.is_backref.borrow() {
            return Cow::Borrowed(&[]);
        }
        Cow::Owned(self.graph.operands(self.id).iter().map(|&op| self.child(op)).collect())
    }
}

fn format_node(graph: &Graph, id: ExprId) -> String {
    let expr = &graph[id];
    let head = match &expr.node {
        Node::Var { name, .. } => format!("var '{name}'"),
        Node::Const(literal) => format!("const {literal}"),
        Node::Tuple(fields) => format!("tuple({})", fields.len()),
        Node::Call { op, .. } => op.to_string(),
    };
    let name = match (&expr.node, &expr.name) {
        (Node::Var { .. }, _) | (_, None) => String::new(),
        (_, Some(name)) => format!(" '{name}'"),
    };
    format!("{id} {head}{name} : {}", expr.ty)
}

/// Lazily rendered tree of the DAG rooted at `root`; see [`render_tree`].
#[derive(Clone, Copy)]
pub struct RenderedTree<'g> {
    graph: &'g Graph,
    root: ExprId,
}

impl fmt::Display for RenderedTree<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut buf = Vec::new();
        ptree::write_tree(&ExprTree::new(self.graph, self.root), &mut buf).map_err(|_| fmt::Error)?;
        f.write_str(&String::from_utf8_lossy(&buf))
    }
}

/// Renders the DAG rooted at `root` as an ASCII tree when formatted.
pub fn render_tree(graph: &Graph, root: ExprId) -> RenderedTree<'_> {
    RenderedTree { graph, root }
}
