//! Which calls may run on distributed tensors.

use strata_ir::{DType, ExprId, Graph, Op};

/// Static allow-list plus per-op constraints.
pub fn is_supported(graph: &Graph, op: &Op, args: &[ExprId]) -> bool {
    match op {
        Op::Unary(_)
        | Op::Binary(_)
        | Op::MatMul
        | Op::Reshape
        | Op::Transpose { .. }
        | Op::Concat { .. }
        | Op::Softmax { .. }
        | Op::LayerNorm { .. } => true,
        Op::Conv2D { fused_clamp, .. } => fused_clamp.is_identity(),
        Op::Reduce { axes, .. } => {
            let float32 = args
                .first()
                .and_then(|&input| graph.ty(input).logical_tensor())
                .is_some_and(|t| t.dtype == DType::Float32);
            float32 && is_contiguous(axes)
        }
        Op::Slice => args.get(1..3).is_some_and(|bounds| {
            bounds.iter().all(|&bound| {
                graph.literal(bound).and_then(|lit| lit.as_ints()).is_some_and(|ints| ints.iter().all(|&v| v >= 0))
            })
        }),
        Op::Cast { .. } | Op::Pad { .. } | Op::Gather { .. } | Op::Boxing { .. } => false,
    }
}

/// Axes form one run `a, a + 1, ..` once sorted.
fn is_contiguous(axes: &[usize]) -> bool {
    let mut sorted = axes.to_vec();
    sorted.sort_unstable();
    sorted.windows(2).all(|w| w[1] == w[0] + 1)
}
