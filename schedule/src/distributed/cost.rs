//! Cost model guiding extraction.
//!
//! Compute nodes cost the element count of their per-device output, scaled by the
//! contraction length for matmul and convolution. Boxing nodes cost the bytes of the
//! moved tensor times a factor of their [`BoxingKind`]. Leaves and tuples are free.

use std::collections::HashMap;

use smallvec::SmallVec;
use strata_egraph::{CostFunction, EGraph, Id, Language};
use strata_ir::{IrType, Op, Sbp, Shape};

use super::enode::IrNode;

/// Data movement performed by a boxing node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum BoxingKind {
    Nop,
    /// Plain tensor laid out onto the placement.
    Scatter,
    /// Split shards collected into a plain tensor.
    Gather,
    AllReduce,
    AllGather,
    /// Local slicing of a broadcast value.
    Slice,
    AllToAll,
    ReduceScatter,
    /// Hierarchy axes need different collectives.
    Mixed,
}

impl BoxingKind {
    pub fn classify(source: &IrType, target: &IrType) -> Self {
        match (source, target) {
            (IrType::Tensor(_), IrType::Tensor(_)) => BoxingKind::Nop,
            (IrType::Tensor(_), IrType::Distributed(_)) => BoxingKind::Scatter,
            (IrType::Distributed(src), IrType::Tensor(_)) => {
                if src.ndsbp.iter().any(Sbp::is_split) {
                    BoxingKind::Gather
                } else {
                    BoxingKind::Nop
                }
            }
            (IrType::Distributed(src), IrType::Distributed(dst)) => {
                let mut kinds = src
                    .ndsbp
                    .iter()
                    .zip(&dst.ndsbp)
                    .map(|(&from, &to)| Self::classify_axis(from, to))
                    .filter(|&kind| kind != BoxingKind::Nop);
                let Some(first) = kinds.next() else { return BoxingKind::Nop };
                if kinds.all(|kind| kind == first) { first } else { BoxingKind::Mixed }
            }
            _ => BoxingKind::Mixed,
        }
    }

    fn classify_axis(from: Sbp, to: Sbp) -> Self {
        use Sbp::{Broadcast as B, PartialSum as P, Split as S};
        match (from, to) {
            _ if from == to => BoxingKind::Nop,
            (P, B) => BoxingKind::AllReduce,
            (P, S(_)) => BoxingKind::ReduceScatter,
            (S(_), B) => BoxingKind::AllGather,
            (B, S(_)) => BoxingKind::Slice,
            (S(_), S(_)) => BoxingKind::AllToAll,
            _ => BoxingKind::Mixed,
        }
    }

    /// Multiplier on the bytes of the moved tensor.
    pub fn factor(self) -> usize {
        match self {
            BoxingKind::Nop | BoxingKind::Slice => 0,
            BoxingKind::Scatter
            | BoxingKind::Gather
            | BoxingKind::AllGather
            | BoxingKind::AllToAll
            | BoxingKind::ReduceScatter => 1,
            BoxingKind::AllReduce | BoxingKind::Mixed => 2,
        }
    }
}

/// Per-device shape of a tensor-like type.
pub fn local_shape(ty: &IrType) -> Option<Shape> {
    match ty {
        IrType::Tensor(t) => Some(t.shape.clone()),
        IrType::Distributed(d) => d.local_shape(),
        _ => None,
    }
}

pub fn boxing_cost(source: &IrType, target: &IrType) -> usize {
    let bytes = target.logical_tensor().map_or(0, |t| t.bytes());
    bytes.saturating_mul(BoxingKind::classify(source, target).factor())
}

pub fn compute_cost(op: &Op, out: &IrType, args: &[&IrType]) -> usize {
    let elements: usize = local_shape(out).map_or(0, |shape| shape.iter().product());
    let contraction = match op {
        Op::MatMul => args.first().and_then(|ty| local_shape(ty)).and_then(|s| s.last().copied()),
        Op::Conv2D { .. } => args.get(1).and_then(|ty| local_shape(ty)).map(|s| s.iter().skip(1).product()),
        _ => None,
    };
    elements.saturating_mul(contraction.unwrap_or(1))
}

/// [`CostFunction`] over the auto-distribution e-graph.
///
/// Types are looked up per canonical enode and per class, so the graph must be rebuilt
/// before this is constructed.
#[derive(Debug, Clone)]
pub struct DistributedCost {
    node_types: HashMap<IrNode, IrType>,
    class_types: HashMap<Id, IrType>,
}

/// Type of every canonical enode, taken from its class.
pub fn node_types(egraph: &EGraph<IrNode>, class_types: &HashMap<Id, IrType>) -> HashMap<IrNode, IrType> {
    let mut node_types = HashMap::new();
    for class in egraph.classes() {
        let Some(ty) = class_types.get(&class.id) else { continue };
        for node in class.iter() {
            node_types.insert(node.clone(), ty.clone());
        }
    }
    node_types
}

impl DistributedCost {
    pub fn new(egraph: &EGraph<IrNode>, class_types: HashMap<Id, IrType>) -> Self {
        Self { node_types: node_types(egraph, &class_types), class_types }
    }

    pub fn local_cost(&self, enode: &IrNode) -> usize {
        match enode {
            IrNode::Leaf(_) | IrNode::Tuple(_) => 0,
            IrNode::Call { op: Op::Boxing { target }, args } => {
                args.first().and_then(|arg| self.class_types.get(arg)).map_or(0, |source| boxing_cost(source, target))
            }
            IrNode::Call { op, args } => {
                let Some(out) = self.node_types.get(enode) else { return 0 };
                let arg_types: SmallVec<[&IrType; 4]> = args.iter().filter_map(|arg| self.class_types.get(arg)).collect();
                compute_cost(op, out, &arg_types)
            }
        }
    }
}

impl CostFunction<IrNode> for DistributedCost {
    type Cost = usize;

    fn cost<C>(&mut self, enode: &IrNode, mut costs: C) -> usize
    where
        C: FnMut(Id) -> usize,
    {
        let own = self.local_cost(enode);
        enode.children().iter().fold(own, |sum, &child| sum.saturating_add(costs(child)))
    }
}
