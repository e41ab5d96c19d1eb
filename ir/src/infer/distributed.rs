//! SBP propagation for calls on distributed tensors.
//!
//! The logical output is inferred by [`super::tensor`]. The output SBP is then derived
//! one placement hierarchy axis at a time from the input SBPs on that axis. A layout
//! with no rule is rejected, and so is an output whose splits do not divide its extents.

use smallvec::SmallVec;

use super::tensor::{self, SliceSpec};
use super::{Infer, inputs};
use crate::expr::{ExprId, Graph};
use crate::op::{BinaryOp, Op, ParameterKind, ReduceOp};
use crate::types::{DistributedType, NdSbp, Placement, Sbp, TensorType};

pub fn infer(graph: &Graph, op: &Op, args: &[ExprId]) -> Infer<DistributedType> {
    let mut operands: SmallVec<[&DistributedType; 4]> = SmallVec::new();
    for id in inputs(op, args) {
        let ty = graph.ty(id).as_distributed().ok_or_else(|| format!("{op}: mixes plain and distributed inputs"))?;
        operands.push(ty);
    }
    for (index, &id) in args.iter().enumerate() {
        if op.parameter_kind(index) == ParameterKind::Attribute && graph.ty(id).is_distributed() {
            return Err(format!("{op}: attribute {id} cannot be distributed"));
        }
    }
    let placement = &operands[0].placement;
    if let Some(other) = operands.iter().find(|d| &d.placement != placement) {
        return Err(format!("{op}: placement {} differs from {placement}", other.placement));
    }

    let tensor = tensor::infer(graph, op, args)?;
    let rule = Rule::new(graph, op, args, &operands, &tensor)?;
    let mut ndsbp = NdSbp::with_capacity(placement.rank());
    for axis in 0..placement.rank() {
        let sbps: SmallVec<[Sbp; 4]> = operands.iter().map(|d| d.ndsbp[axis]).collect();
        let sbp = rule.apply(&sbps).ok_or_else(|| format!("{op}: no rule for {}", fmt_sbps(&sbps)))?;
        ndsbp.push(sbp);
    }

    let out = DistributedType { tensor, ndsbp, placement: placement.clone() };
    if !out.is_divisible() {
        return Err(format!("{op}: output {out} is not divisible"));
    }
    Ok(out)
}

fn fmt_sbps(sbps: &[Sbp]) -> String {
    let parts: Vec<String> = sbps.iter().map(ToString::to_string).collect();
    format!("({})", parts.join(", "))
}

/// Per-op SBP rule with the op's shape facts precomputed.
enum Rule {
    Unary { linear: bool },
    Elementwise { op: BinaryOp, ranks: [usize; 2], shapes: [TensorType; 2], out: TensorType },
    MatMul { lhs_rank: usize, rhs_rank: usize, out_rank: usize },
    Reduce { op: ReduceOp, axes: SmallVec<[usize; 4]>, keep_dims: bool },
    Reshape { input: TensorType, out: TensorType },
    Transpose { perm: SmallVec<[usize; 4]> },
    Slice { sliced: SmallVec<[usize; 4]> },
    Concat { axis: usize },
    Conv2D,
    Normalize { first_fixed: usize, allow_partial: bool },
    LayerNorm { axis: usize },
    Unsupported,
}

impl Rule {
    fn new(graph: &Graph, op: &Op, args: &[ExprId], operands: &[&DistributedType], out: &TensorType) -> Infer<Self> {
        Ok(match op {
            Op::Unary(uop) => Rule::Unary { linear: uop.is_linear() },
            Op::Binary(bop) => Rule::Elementwise {
                op: *bop,
                ranks: [operands[0].tensor.rank(), operands[1].tensor.rank()],
                shapes: [operands[0].tensor.clone(), operands[1].tensor.clone()],
                out: out.clone(),
            },
            Op::MatMul => Rule::MatMul {
                lhs_rank: operands[0].tensor.rank(),
                rhs_rank: operands[1].tensor.rank(),
                out_rank: out.rank(),
            },
            Op::Reduce { op, axes, keep_dims } => Rule::Reduce { op: *op, axes: axes.clone(), keep_dims: *keep_dims },
            Op::Reshape => Rule::Reshape { input: operands[0].tensor.clone(), out: out.clone() },
            Op::Transpose { perm } => Rule::Transpose { perm: perm.clone() },
            Op::Slice => {
                let spec = SliceSpec::from_args(graph, args)?;
                Rule::Slice { sliced: spec.normalized_axes(operands[0].tensor.rank())? }
            }
            Op::Concat { axis } => Rule::Concat { axis: *axis },
            Op::Conv2D { .. } => Rule::Conv2D,
            Op::Softmax { axis } => Rule::Normalize { first_fixed: *axis, allow_partial: false },
            Op::LayerNorm { axis, .. } => Rule::LayerNorm { axis: *axis },
            Op::Cast { .. } | Op::Pad { .. } | Op::Gather { .. } | Op::Boxing { .. } => Rule::Unsupported,
        })
    }

    fn apply(&self, sbps: &[Sbp]) -> Option<Sbp> {
        use Sbp::{Broadcast as B, PartialSum as P, Split as S};

        match self {
            Rule::Unary { linear } => match sbps[0] {
                P if !linear => None,
                sbp => Some(sbp),
            },

            Rule::Elementwise { op, ranks, shapes, out } => {
                let out_rank = out.rank();
                match (sbps[0], sbps[1]) {
                    (B, B) => Some(B),
                    (P, P) if matches!(op, BinaryOp::Add | BinaryOp::Sub) => Some(P),
                    (P, B) if matches!(op, BinaryOp::Mul | BinaryOp::Div) => Some(P),
                    (B, P) if *op == BinaryOp::Mul => Some(P),
                    (lhs, rhs) => {
                        // Each split input must map to the same output axis; a broadcast
                        // partner must not carry that axis.
                        let mut target = None;
                        for (i, sbp) in [lhs, rhs].into_iter().enumerate() {
                            match sbp {
                                S(axis) => {
                                    let mapped = axis + out_rank - ranks[i];
                                    if shapes[i].shape[axis] != out.shape[mapped] {
                                        return None;
                                    }
                                    if target.is_some_and(|t| t != mapped) {
                                        return None;
                                    }
                                    target = Some(mapped);
                                }
                                B => {}
                                P => return None,
                            }
                        }
                        let target = target?;
                        for (i, sbp) in [lhs, rhs].into_iter().enumerate() {
                            if sbp == B {
                                let offset = out_rank - ranks[i];
                                if target >= offset && shapes[i].shape[target - offset] != 1 {
                                    return None;
                                }
                            }
                        }
                        Some(S(target))
                    }
                }
            }

            Rule::MatMul { lhs_rank, rhs_rank, out_rank } => {
                let (l_m, l_k) = (lhs_rank - 2, lhs_rank - 1);
                let (r_k, r_n) = (rhs_rank - 2, rhs_rank - 1);
                match (sbps[0], sbps[1]) {
                    (B, B) => Some(B),
                    (S(a), B) if a == l_m => Some(S(out_rank - 2)),
                    (B, S(b)) if b == r_n => Some(S(out_rank - 1)),
                    (S(a), S(b)) if a == l_k && b == r_k => Some(P),
                    (P, B) | (B, P) => Some(P),
                    (S(a), S(b)) if a < l_m && b < r_k && a + out_rank - lhs_rank == b + out_rank - rhs_rank => {
                        Some(S(a + out_rank - lhs_rank))
                    }
                    _ => None,
                }
            }

            Rule::Reduce { op, axes, keep_dims } => match sbps[0] {
                B => Some(B),
                P if matches!(op, ReduceOp::Sum | ReduceOp::Mean) => Some(P),
                P => None,
                S(axis) if axes.contains(&axis) => (*op == ReduceOp::Sum).then_some(P),
                S(axis) => {
                    let removed = if *keep_dims { 0 } else { axes.iter().filter(|&&a| a < axis).count() };
                    Some(S(axis - removed))
                }
            },

            Rule::Reshape { input, out } => match sbps[0] {
                S(axis) => reshape_split_axis(&input.shape, &out.shape, axis).map(S),
                sbp => Some(sbp),
            },

            Rule::Transpose { perm } => match sbps[0] {
                S(axis) => perm.iter().position(|&p| p == axis).map(S),
                sbp => Some(sbp),
            },

            Rule::Slice { sliced } => match sbps[0] {
                S(axis) if sliced.contains(&axis) => None,
                sbp => Some(sbp),
            },

            Rule::Concat { axis } => {
                let first = sbps[0];
                if sbps.iter().any(|&sbp| sbp != first) || first == S(*axis) {
                    return None;
                }
                Some(first)
            }

            Rule::Conv2D => match (sbps[0], sbps[1], sbps[2]) {
                (B, B, B) => Some(B),
                (S(0), B, B) => Some(S(0)),
                (B, S(0), S(0)) => Some(S(1)),
                _ => None,
            },

            Rule::Normalize { first_fixed, allow_partial } => match sbps[0] {
                S(axis) if axis == *first_fixed => None,
                P if !allow_partial => None,
                sbp => Some(sbp),
            },

            Rule::LayerNorm { axis } => match (sbps[0], sbps[1], sbps[2]) {
                (B, B, B) => Some(B),
                (S(a), B, B) if a < *axis => Some(S(a)),
                _ => None,
            },

            Rule::Unsupported => None,
        }
    }
}

/// Output axis whose leading elements coincide with the split input axis.
///
/// A split on input axis `axis` survives a reshape when some output axis `b` starts at
/// the same flat offset (equal prefix products) and is not a unit axis.
pub fn reshape_split_axis(input: &[usize], out: &[usize], axis: usize) -> Option<usize> {
    let prefix: usize = input[..axis].iter().product();
    let mut acc = 1usize;
    for (b, &dim) in out.iter().enumerate() {
        if acc == prefix && dim != 1 {
            return Some(b);
        }
        if acc > prefix {
            return None;
        }
        acc *= dim;
    }
    None
}

/// Every leaf layout of `tensor` on `placement`.
///
/// Per hierarchy axis the choices are `B` and `S(a)` for every tensor axis `a` the axis
/// size divides. The product is filtered by combined divisibility.
pub fn leaf_layouts(tensor: &TensorType, placement: &Placement) -> Vec<NdSbp> {
    let mut per_axis: Vec<SmallVec<[Sbp; 4]>> = Vec::with_capacity(placement.rank());
    for &size in placement.hierarchy() {
        let mut choices: SmallVec<[Sbp; 4]> = smallvec::smallvec![Sbp::Broadcast];
        choices.extend((0..tensor.rank()).filter(|&a| tensor.shape[a] % size == 0).map(Sbp::Split));
        per_axis.push(choices);
    }

    let mut layouts: Vec<NdSbp> = vec![NdSbp::new()];
    for choices in &per_axis {
        layouts = layouts
            .into_iter()
            .flat_map(|prefix| {
                choices.iter().map(move |&sbp| {
                    let mut next = prefix.clone();
                    next.push(sbp);
                    next
                })
            })
            .collect();
    }
    layouts.retain(|ndsbp| crate::types::is_divisible(&tensor.shape, ndsbp, placement));
    layouts
}
