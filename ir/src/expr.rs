//! Expression arena.
//!
//! Expressions form an immutable operand DAG stored in a [`Graph`]. Nodes are addressed
//! by [`ExprId`]; two structurally equal nodes created separately are still distinct, so
//! memo tables keyed by `ExprId` see reference identity. Users are not stored on nodes,
//! see [`UseTable`](crate::UseTable).

use std::ops::Index;

use smallvec::SmallVec;
use tracing::trace;

use crate::error::{AlreadyDisposedSnafu, Result, UnknownExprSnafu};
use crate::infer;
use crate::op::Op;
use crate::types::{IrType, Literal};

/// Handle of an expression inside a [`Graph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
#[display("%{_0}")]
pub struct ExprId(u32);

impl ExprId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

pub type Operands = SmallVec<[ExprId; 4]>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Node {
    /// Function parameter or free variable.
    Var { name: String, ty: IrType },
    Const(Literal),
    Tuple(Operands),
    Call { op: Op, args: Operands },
}

impl Node {
    pub fn operands(&self) -> &[ExprId] {
        match self {
            Node::Var { .. } | Node::Const(_) => &[],
            Node::Tuple(fields) => fields,
            Node::Call { args, .. } => args,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Var { .. } | Node::Const(_))
    }

    pub fn as_call(&self) -> Option<(&Op, &[ExprId])> {
        match self {
            Node::Call { op, args } => Some((op, args)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExprData {
    pub node: Node,
    /// Checked type, computed once at construction.
    pub ty: IrType,
    pub name: Option<String>,
    alive: bool,
}

impl ExprData {
    pub fn is_alive(&self) -> bool {
        self.alive
    }
}

/// Arena owning every expression of a program.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    exprs: Vec<ExprData>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, node: Node, ty: IrType) -> ExprId {
        let id = ExprId(self.exprs.len() as u32);
        trace!(%id, %ty, "expr.new");
        self.exprs.push(ExprData { node, ty, name: None, alive: true });
        id
    }

    pub fn var(&mut self, name: impl Into<String>, ty: impl Into<IrType>) -> ExprId {
        let name = name.into();
        let ty = ty.into();
        let id = self.push(Node::Var { name: name.clone(), ty: ty.clone() }, ty);
        self.exprs[id.index()].name = Some(name);
        id
    }

    pub fn constant(&mut self, literal: Literal) -> ExprId {
        let ty = IrType::Tensor(literal.ty.clone());
        self.push(Node::Const(literal), ty)
    }

    pub fn tuple(&mut self, fields: impl IntoIterator<Item = ExprId>) -> ExprId {
        let fields: Operands = fields.into_iter().collect();
        let ty = infer::infer_tuple(self, &fields);
        self.push(Node::Tuple(fields), ty)
    }

    /// Builds a call and runs type inference on it.
    ///
    /// Inference failures are not errors: the node gets an [`IrType::Invalid`] type.
    pub fn call(&mut self, op: Op, args: impl IntoIterator<Item = ExprId>) -> ExprId {
        let args: Operands = args.into_iter().collect();
        let ty = infer::infer_call(self, &op, &args);
        self.push(Node::Call { op, args }, ty)
    }

    pub fn try_get(&self, id: ExprId) -> Result<&ExprData> {
        self.exprs.get(id.index()).ok_or_else(|| UnknownExprSnafu { id }.build())
    }

    pub fn node(&self, id: ExprId) -> &Node {
        &self[id].node
    }

    pub fn ty(&self, id: ExprId) -> &IrType {
        &self[id].ty
    }

    pub fn operands(&self, id: ExprId) -> &[ExprId] {
        self[id].node.operands()
    }

    pub fn literal(&self, id: ExprId) -> Option<&Literal> {
        match &self[id].node {
            Node::Const(literal) => Some(literal),
            _ => None,
        }
    }

    pub fn name(&self, id: ExprId) -> Option<&str> {
        self[id].name.as_deref()
    }

    pub fn set_name(&mut self, id: ExprId, name: impl Into<String>) {
        self.exprs[id.index()].name = Some(name.into());
    }

    pub fn is_alive(&self, id: ExprId) -> bool {
        self.exprs.get(id.index()).is_some_and(|e| e.alive)
    }

    pub(crate) fn mark_dead(&mut self, id: ExprId) -> Result<()> {
        let expr = self.exprs.get_mut(id.index()).ok_or_else(|| UnknownExprSnafu { id }.build())?;
        if !expr.alive {
            return AlreadyDisposedSnafu { id }.fail();
        }
        expr.alive = false;
        Ok(())
    }

    /// Total number of nodes ever created, disposed ones included.
    pub fn len(&self) -> usize {
        self.exprs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exprs.is_empty()
    }

    pub fn live_count(&self) -> usize {
        self.exprs.iter().filter(|e| e.alive).count()
    }

    /// Same node kind with `operands` substituted.
    ///
    /// Returns `id` itself when nothing changed. Calls are re-inferred.
    pub fn with_operands(&mut self, id: ExprId, operands: &[ExprId]) -> ExprId {
        if self.operands(id) == operands {
            return id;
        }
        let rebuilt = match self.node(id).clone() {
            Node::Tuple(_) => self.tuple(operands.iter().copied()),
            Node::Call { op, .. } => self.call(op, operands.iter().copied()),
            Node::Var { .. } | Node::Const(_) => return id,
        };
        if let Some(name) = self[id].name.clone() {
            self.set_name(rebuilt, name);
        }
        rebuilt
    }

    /// Nodes reachable from `roots`, operands before users, each once.
    pub fn post_order(&self, roots: &[ExprId]) -> Vec<ExprId> {
        let mut order = Vec::new();
        let mut visited = vec![false; self.exprs.len()];
        let mut stack: Vec<(ExprId, bool)> = roots.iter().rev().map(|&r| (r, false)).collect();

        while let Some((id, expanded)) = stack.pop() {
            if expanded {
                order.push(id);
                continue;
            }
            if visited[id.index()] {
                continue;
            }
            visited[id.index()] = true;
            stack.push((id, true));
            for &operand in self.operands(id).iter().rev() {
                if !visited[operand.index()] {
                    stack.push((operand, false));
                }
            }
        }
        order
    }

    pub fn iter(&self) -> impl Iterator<Item = (ExprId, &ExprData)> {
        self.exprs.iter().enumerate().map(|(i, e)| (ExprId(i as u32), e))
    }
}

impl Index<ExprId> for Graph {
    type Output = ExprData;

    fn index(&self, id: ExprId) -> &ExprData {
        &self.exprs[id.index()]
    }
}

/// A body together with the parameters it is closed over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    pub name: String,
    pub params: Vec<ExprId>,
    pub body: ExprId,
}

impl Function {
    pub fn new(name: impl Into<String>, params: impl IntoIterator<Item = ExprId>, body: ExprId) -> Self {
        Self { name: name.into(), params: params.into_iter().collect(), body }
    }

    pub fn ty<'g>(&self, graph: &'g Graph) -> &'g IrType {
        graph.ty(self.body)
    }
}
