use smallvec::SmallVec;
use strata_egraph::{Id, Language};
use strata_ir::{ExprId, Op};

/// E-graph view of an expression.
///
/// Leaves keep their identity so distinct parameters never merge. Calls and tuples
/// hash-cons on their operator and child classes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IrNode {
    Leaf(ExprId),
    Tuple(SmallVec<[Id; 4]>),
    Call { op: Op, args: SmallVec<[Id; 4]> },
}

impl Language for IrNode {
    fn children(&self) -> &[Id] {
        match self {
            IrNode::Leaf(_) => &[],
            IrNode::Tuple(fields) => fields,
            IrNode::Call { args, .. } => args,
        }
    }

    fn children_mut(&mut self) -> &mut [Id] {
        match self {
            IrNode::Leaf(_) => &mut [],
            IrNode::Tuple(fields) => fields,
            IrNode::Call { args, .. } => args,
        }
    }
}
