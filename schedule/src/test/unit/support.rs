use smallvec::smallvec;
use strata_ir::{BinaryOp, DType, FusedClamp, Graph, Literal, Op, ReduceOp, TensorType, UnaryOp};
use test_case::test_case;

use crate::distributed::is_supported;
use crate::test::f32_tensor;

fn reduce(axes: &[usize]) -> Op {
    Op::Reduce { op: ReduceOp::Sum, axes: axes.iter().copied().collect(), keep_dims: false }
}

#[test_case(Op::Unary(UnaryOp::Exp) => true ; "unary")]
#[test_case(Op::Binary(BinaryOp::Add) => true ; "binary")]
#[test_case(Op::MatMul => true ; "matmul")]
#[test_case(Op::Transpose { perm: smallvec![1, 0] } => true ; "transpose")]
#[test_case(Op::Softmax { axis: 1 } => true ; "softmax")]
#[test_case(Op::Cast { dtype: DType::Float16 } => false ; "cast")]
#[test_case(Op::Pad { pads: smallvec![(1, 1)] } => false ; "pad")]
#[test_case(Op::Gather { axis: 0 } => false ; "gather")]
#[test_case(reduce(&[0, 1]) => true ; "contiguous reduce")]
#[test_case(reduce(&[0, 2]) => false ; "gapped reduce")]
fn test_allow_list(op: Op) -> bool {
    let mut g = Graph::new();
    let x = g.var("x", f32_tensor(&[2, 3, 4]));
    is_supported(&g, &op, &[x])
}

#[test]
fn test_reduce_requires_float32() {
    let mut g = Graph::new();
    let x = g.var("x", TensorType::new(DType::Int32, [4, 4]));
    assert!(!is_supported(&g, &reduce(&[0]), &[x]));
}

#[test]
fn test_conv_requires_identity_clamp() {
    let g = Graph::new();
    let conv = |fused_clamp| Op::Conv2D { stride: [1, 1], padding: [0; 4], dilation: [1, 1], groups: 1, fused_clamp };
    assert!(is_supported(&g, &conv(FusedClamp::IDENTITY), &[]));
    assert!(!is_supported(&g, &conv(FusedClamp { min: 0.0, max: 6.0 }), &[]));
}

#[test]
fn test_slice_requires_non_negative_bounds() {
    let mut g = Graph::new();
    let x = g.var("x", f32_tensor(&[8]));
    let zero = g.constant(Literal::ints(&[0]));
    let four = g.constant(Literal::ints(&[4]));
    let from_end = g.constant(Literal::ints(&[-1]));
    let axes = g.constant(Literal::ints(&[0]));
    let strides = g.constant(Literal::ints(&[1]));

    assert!(is_supported(&g, &Op::Slice, &[x, zero, four, axes, strides]));
    assert!(!is_supported(&g, &Op::Slice, &[x, zero, from_end, axes, strides]));
}
