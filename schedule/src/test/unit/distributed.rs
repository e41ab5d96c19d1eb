use std::collections::HashMap;

use strata_egraph::{EGraph, Id};
use strata_ir::{
    BinaryOp, DType, DistributedType, ExprId, Function, Graph, IrType, Literal, NameAlloc, Node, Op, Placement, Sbp,
    UnaryOp,
};
use test_case::test_case;

use crate::DistributeConfig;
use crate::distributed::{
    AutoDistributed, Backend, DistributedCost, IrNode, auto_distribute, auto_distribute_with, diagonal_indices,
};
use crate::error::Error;
use crate::test::{binary_function, boxing_source, config, f32_tensor, placement};

/// Split/broadcast layouts in a bucket, in insertion order.
fn layouts(types: impl Iterator<Item = IrType>) -> Vec<Vec<Sbp>> {
    types.filter_map(|ty| ty.as_distributed().map(|d| d.ndsbp.to_vec())).collect()
}

#[test]
fn test_unsupported_op_stays_plain() {
    let mut g = Graph::new();
    let x = g.var("x", f32_tensor(&[4]));
    let cast = g.call(Op::Cast { dtype: DType::Float16 }, [x]);
    let function = Function::new("main", [x], cast);
    let config = config(&[2]);
    let mut names = NameAlloc::new();

    let mut rewriter = AutoDistributed::new(&mut g, &config, &mut names);
    rewriter.visit(cast).unwrap();
    let bucket = rewriter.bucket(cast).unwrap();
    assert_eq!(bucket.len(), 1);
    let (ty, members) = bucket.first().unwrap();
    assert!(ty.is_tensor());
    assert_eq!(members.len(), 1);

    let result = rewriter.run(&function).unwrap();
    match g.node(result.body) {
        Node::Call { op: Op::Cast { .. }, args } => assert_eq!(args.as_slice(), &[x]),
        other => panic!("expected cast(x), got {other:?}"),
    }
}

#[test]
fn test_elementwise_candidates_follow_divisibility() {
    let mut g = Graph::new();
    let function = binary_function(&mut g, Op::Binary(BinaryOp::Add), &[8, 8], &[8, 8]);
    let config = DistributeConfig::builder().placement(strata_ir::Placement::new([2], ["p"]).unwrap()).build();
    let mut names = NameAlloc::new();
    let mut rewriter = AutoDistributed::new(&mut g, &config, &mut names);
    rewriter.visit(function.body).unwrap();
    let bucket = rewriter.bucket(function.body).unwrap();
    assert_eq!(
        layouts(bucket.keys().cloned()),
        vec![vec![Sbp::Broadcast], vec![Sbp::Split(0)], vec![Sbp::Split(1)]]
    );

    let mut g = Graph::new();
    let function = binary_function(&mut g, Op::Binary(BinaryOp::Add), &[3, 8], &[3, 8]);
    let mut names = NameAlloc::new();
    let mut rewriter = AutoDistributed::new(&mut g, &config, &mut names);
    rewriter.visit(function.body).unwrap();
    let found = layouts(rewriter.bucket(function.body).unwrap().keys().cloned());
    assert!(!found.contains(&vec![Sbp::Split(0)]), "{found:?}");
    assert!(found.contains(&vec![Sbp::Split(1)]), "{found:?}");
}

#[test]
fn test_matmul_prefers_contraction_split() {
    let mut g = Graph::new();
    let function = binary_function(&mut g, Op::MatMul, &[1, 64], &[64, 1]);
    let (lhs, rhs) = (function.params[0], function.params[1]);
    let mut names = NameAlloc::new();

    let result = auto_distribute(&mut g, &function, &config(&[2]), &mut names).unwrap();
    assert_eq!(result.params, vec![lhs, rhs]);
    assert_eq!(g.ty(result.body), &IrType::Tensor(f32_tensor(&[1, 1])));

    // Boxing{T}(Boxing{B}(MatMul(Boxing{S(1)}(lhs), Boxing{S(0)}(rhs))))
    let resolved = boxing_source(&g, result.body).unwrap();
    assert_eq!(g.ty(resolved).as_distributed().unwrap().ndsbp.as_slice(), &[Sbp::Broadcast]);
    let matmul = boxing_source(&g, resolved).unwrap();
    assert_eq!(g.ty(matmul).as_distributed().unwrap().ndsbp.as_slice(), &[Sbp::PartialSum]);

    let (op, args) = g.node(matmul).as_call().unwrap();
    assert_eq!(op, &Op::MatMul);
    assert_eq!(boxing_source(&g, args[0]), Some(lhs));
    assert_eq!(boxing_source(&g, args[1]), Some(rhs));
    assert_eq!(g.ty(args[0]).as_distributed().unwrap().ndsbp.as_slice(), &[Sbp::Split(1)]);
    assert_eq!(g.ty(args[1]).as_distributed().unwrap().ndsbp.as_slice(), &[Sbp::Split(0)]);
    assert!(g.name(result.body).is_some_and(|name| name.starts_with("boxing_")));
}

#[test]
fn test_candidates_are_sound() {
    let mut g = Graph::new();
    let x = g.var("x", f32_tensor(&[4, 8]));
    let w = g.var("w", f32_tensor(&[8, 4]));
    let mm = g.call(Op::MatMul, [x, w]);
    let body = g.call(Op::Unary(UnaryOp::Relu), [mm]);
    let config = config(&[2, 2]);
    let mut names = NameAlloc::new();
    let mut rewriter = AutoDistributed::new(&mut g, &config, &mut names);
    rewriter.visit(body).unwrap();

    for original in [x, w, mm, body] {
        let logical = rewriter.graph().ty(original).logical_tensor().cloned().unwrap();
        let bucket = rewriter.bucket(original).unwrap();
        assert!(!bucket.is_empty());
        for (ty, members) in bucket {
            assert_eq!(ty.logical_tensor(), Some(&logical));
            if let Some(d) = ty.as_distributed() {
                assert!(d.is_divisible(), "{ty}");
            }
            for &member in members {
                assert_eq!(rewriter.graph().ty(member), ty);
            }
        }
    }
}

#[test]
fn test_terminals_are_plain_and_branch_cut_is_idempotent() {
    let mut g = Graph::new();
    let function = binary_function(&mut g, Op::MatMul, &[4, 8], &[8, 4]);
    let config = config(&[2]);
    let mut names = NameAlloc::new();
    let mut rewriter = AutoDistributed::new(&mut g, &config, &mut names);
    rewriter.visit(function.body).unwrap();
    rewriter.insert_terminator(function.body).unwrap();

    assert!(!rewriter.terminals().is_empty());
    for &terminal in rewriter.terminals() {
        assert!(rewriter.graph().ty(terminal).is_terminal());
    }

    let live_before = rewriter.graph().live_count();
    let removed = rewriter.branch_cut().unwrap();
    assert!(removed > 0);
    assert!(rewriter.graph().live_count() < live_before);

    let snapshot = rewriter.bucket(function.body).cloned();
    let live = rewriter.graph().live_count();
    assert_eq!(rewriter.branch_cut().unwrap(), 0);
    assert_eq!(rewriter.bucket(function.body).cloned(), snapshot);
    assert_eq!(rewriter.graph().live_count(), live);

    for &terminal in rewriter.terminals() {
        assert!(rewriter.graph().is_alive(terminal));
        assert!(!rewriter.users().is_pinned(terminal));
    }
}

#[test]
fn test_combinations_are_truncated() {
    let mut g = Graph::new();
    let function = binary_function(&mut g, Op::Binary(BinaryOp::Add), &[8, 8], &[8, 8]);
    let config = DistributeConfig::builder().placement(placement(&[2])).max_candidates(1).build();
    let mut names = NameAlloc::new();
    let mut rewriter = AutoDistributed::new(&mut g, &config, &mut names);
    rewriter.visit(function.body).unwrap();

    let bucket = rewriter.bucket(function.body).unwrap();
    assert_eq!(layouts(bucket.keys().cloned()), vec![vec![Sbp::Broadcast]]);
}

#[test]
fn test_partial_results_offer_resolutions() {
    let mut g = Graph::new();
    let function = binary_function(&mut g, Op::MatMul, &[4, 8], &[8, 4]);
    let config = config(&[2]);
    let mut names = NameAlloc::new();
    let mut rewriter = AutoDistributed::new(&mut g, &config, &mut names);
    rewriter.visit(function.body).unwrap();

    let found = layouts(rewriter.bucket(function.body).unwrap().keys().cloned());
    assert!(found.contains(&vec![Sbp::PartialSum]), "{found:?}");
    assert!(found.contains(&vec![Sbp::Broadcast]), "{found:?}");
    assert!(found.contains(&vec![Sbp::Split(0)]), "{found:?}");
    assert!(found.contains(&vec![Sbp::Split(1)]), "{found:?}");
}

#[test]
fn test_ill_typed_input_is_rejected() {
    let mut g = Graph::new();
    let x = g.var("x", f32_tensor(&[4]));
    let y = g.var("y", f32_tensor(&[5]));
    let body = g.call(Op::Binary(BinaryOp::Add), [x, y]);
    let function = Function::new("main", [x, y], body);
    let mut names = NameAlloc::new();

    let err = auto_distribute(&mut g, &function, &config(&[2]), &mut names).unwrap_err();
    assert!(matches!(err, Error::InvalidProgram { expr, .. } if expr == body));
}

#[test]
fn test_tuple_body_is_boxed_field_wise() {
    let mut g = Graph::new();
    let x = g.var("x", f32_tensor(&[4, 4]));
    let e = g.call(Op::Unary(UnaryOp::Exp), [x]);
    let n = g.call(Op::Unary(UnaryOp::Neg), [x]);
    let body = g.tuple([e, n]);
    let function = Function::new("main", [x], body);
    let mut names = NameAlloc::new();

    let result = auto_distribute(&mut g, &function, &config(&[2]), &mut names).unwrap();
    assert!(g.ty(result.body).is_terminal());
    assert_eq!(g.ty(result.body), g.ty(body));
}

/// Target without a reduction step after matmul: partial-sum matmuls are never extracted.
struct NoPartialMatMul;

impl Backend for NoPartialMatMul {
    type Cost = DistributedCost;

    fn cost_function(&self, egraph: &EGraph<IrNode>, class_types: HashMap<Id, IrType>) -> DistributedCost {
        DistributedCost::new(egraph, class_types)
    }

    fn admits(&self, enode: &IrNode, ty: &IrType) -> bool {
        !matches!(enode, IrNode::Call { op: Op::MatMul, .. }) || !ty.contains_partial()
    }
}

fn sbps(g: &Graph, id: ExprId) -> Vec<Sbp> {
    g.ty(id).as_distributed().map(|d| d.ndsbp.to_vec()).unwrap_or_default()
}

#[test]
fn test_backend_constraint_changes_extraction() {
    let mut g = Graph::new();
    let function = binary_function(&mut g, Op::MatMul, &[1, 64], &[64, 1]);
    let (lhs, rhs) = (function.params[0], function.params[1]);
    let mut names = NameAlloc::new();

    let result = auto_distribute_with(&mut g, &function, &config(&[2]), &NoPartialMatMul, &mut names).unwrap();
    assert_eq!(g.ty(result.body), &IrType::Tensor(f32_tensor(&[1, 1])));

    // Boxing{T}(MatMul(Boxing{B}(lhs), Boxing{B}(rhs)))
    let matmul = boxing_source(&g, result.body).unwrap();
    let (op, args) = g.node(matmul).as_call().unwrap();
    assert_eq!(op, &Op::MatMul);
    assert_eq!(sbps(&g, matmul), vec![Sbp::Broadcast]);
    for (&arg, param) in args.iter().zip([lhs, rhs]) {
        assert_eq!(boxing_source(&g, arg), Some(param));
        assert_eq!(sbps(&g, arg), vec![Sbp::Broadcast]);
    }
}

#[test]
fn test_rejected_reshape_is_retried_with_other_layouts() {
    let mut g = Graph::new();
    let placement = placement(&[2]);
    let x = g.var("x", DistributedType::new(f32_tensor(&[8, 8]), [Sbp::Split(1)], placement.clone()));
    let shape = g.constant(Literal::ints(&[64]));
    let config = DistributeConfig::builder().placement(placement).build();
    let mut names = NameAlloc::new();
    let mut rewriter = AutoDistributed::new(&mut g, &config, &mut names);

    let combo = [(rewriter.graph().ty(x).clone(), x), (rewriter.graph().ty(shape).clone(), shape)];
    let calls = rewriter.build_equival_calls(&Op::Reshape, &combo).unwrap();

    let g = rewriter.graph();
    let found: Vec<Vec<Sbp>> = calls.iter().map(|&call| sbps(g, call)).collect();
    assert_eq!(found, vec![vec![Sbp::Broadcast], vec![Sbp::Split(0)]]);
    for &call in &calls {
        let (op, args) = g.node(call).as_call().unwrap();
        assert_eq!(op, &Op::Reshape);
        assert_eq!(boxing_source(g, args[0]), Some(x));
        assert_eq!(args[1], shape);
    }
}

#[test]
fn test_fallback_broadcasts_conflicting_splits() {
    let mut g = Graph::new();
    let placement = placement(&[2]);
    let x = g.var("x", DistributedType::new(f32_tensor(&[4, 4]), [Sbp::Split(0)], placement.clone()));
    let y = g.var("y", DistributedType::new(f32_tensor(&[4, 4]), [Sbp::Split(1)], placement.clone()));
    let p = g.var("p", f32_tensor(&[4, 4]));
    let q = g.var("q", f32_tensor(&[4, 4]));
    let original = g.call(Op::Binary(BinaryOp::Add), [p, q]);
    let config = DistributeConfig::builder().placement(placement).build();
    let mut names = NameAlloc::new();
    let mut rewriter = AutoDistributed::new(&mut g, &config, &mut names);

    let combo = vec![(rewriter.graph().ty(x).clone(), x), (rewriter.graph().ty(y).clone(), y)];
    assert!(rewriter.build_equival_calls(&Op::Binary(BinaryOp::Add), &combo).unwrap().is_empty());
    rewriter.fallback(original, &Op::Binary(BinaryOp::Add), &[combo]).unwrap();

    let bucket = rewriter.bucket(original).unwrap();
    assert_eq!(layouts(bucket.keys().cloned()), vec![vec![Sbp::Broadcast]]);
    let (_, members) = bucket.first().unwrap();
    let g = rewriter.graph();
    let (_, args) = g.node(members[0]).as_call().unwrap();
    assert_eq!(boxing_source(g, args[0]), Some(x));
    assert_eq!(boxing_source(g, args[1]), Some(y));
}

#[test]
fn test_fallback_goes_plain_across_placements() {
    let mut g = Graph::new();
    let left = Placement::new([2], ["left"]).unwrap();
    let right = Placement::new([2], ["right"]).unwrap();
    let x = g.var("x", DistributedType::new(f32_tensor(&[4, 4]), [Sbp::Split(0)], left.clone()));
    let y = g.var("y", DistributedType::new(f32_tensor(&[4, 4]), [Sbp::Split(0)], right));
    let p = g.var("p", f32_tensor(&[4, 4]));
    let original = g.call(Op::Binary(BinaryOp::Mul), [p, p]);
    let config = DistributeConfig::builder().placement(left).build();
    let mut names = NameAlloc::new();
    let mut rewriter = AutoDistributed::new(&mut g, &config, &mut names);

    let combo = vec![(rewriter.graph().ty(x).clone(), x), (rewriter.graph().ty(y).clone(), y)];
    rewriter.fallback(original, &Op::Binary(BinaryOp::Mul), &[combo]).unwrap();

    let bucket = rewriter.bucket(original).unwrap();
    assert_eq!(bucket.len(), 1);
    let (ty, members) = bucket.first().unwrap();
    assert_eq!(ty, &IrType::Tensor(f32_tensor(&[4, 4])));
    let g = rewriter.graph();
    let (_, args) = g.node(members[0]).as_call().unwrap();
    assert!(args.iter().all(|&arg| g.ty(arg).is_tensor()));
    assert_eq!(boxing_source(g, args[0]), Some(x));
    assert_eq!(boxing_source(g, args[1]), Some(y));
}

#[test_case(&[3, 3], 4 => vec![vec![0, 0], vec![0, 1], vec![1, 0], vec![0, 2]] ; "spreads over both arguments")]
#[test_case(&[2, 1, 2], 8 => vec![vec![0, 0, 0], vec![0, 0, 1], vec![1, 0, 0], vec![1, 0, 1]] ; "exhausts below the limit")]
#[test_case(&[3, 0], 4 => Vec::<Vec<usize>>::new() ; "empty argument")]
#[test_case(&[5], 2 => vec![vec![0], vec![1]] ; "single argument")]
fn test_diagonal_indices(lens: &[usize], limit: usize) -> Vec<Vec<usize>> {
    diagonal_indices(lens, limit)
}

#[test]
fn test_truncation_spreads_over_arguments() {
    // With three combinations the row split of the left operand is still tried.
    let mut g = Graph::new();
    let function = binary_function(&mut g, Op::MatMul, &[8, 8], &[8, 8]);
    let config = DistributeConfig::builder().placement(placement(&[2])).max_candidates(3).build();
    let mut names = NameAlloc::new();
    let mut rewriter = AutoDistributed::new(&mut g, &config, &mut names);
    rewriter.visit(function.body).unwrap();

    let found = layouts(rewriter.bucket(function.body).unwrap().keys().cloned());
    assert_eq!(found, vec![vec![Sbp::Broadcast], vec![Sbp::Split(0)]]);
}
