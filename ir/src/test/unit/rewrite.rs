use super::f32_tensor;
use crate::error::Error;
use crate::{
    BinaryOp, FnRule, Graph, MatchResult, Node, Op, Pattern, RuleSet, UnaryOp, collect_rewrites, dce, graph_rewrite,
};

/// Rules count how often they fire in the context.
type Fired = usize;

fn neg(p: Pattern) -> Pattern {
    Pattern::op(Op::Unary(UnaryOp::Neg), [p])
}

fn double_negation() -> FnRule<impl Fn(&mut Graph, &MatchResult, &mut Fired) -> Option<crate::ExprId>> {
    FnRule::new("double_negation", neg(neg(Pattern::var("y"))), |_: &mut Graph, m: &MatchResult, fired: &mut Fired| {
        *fired += 1;
        Some(m["y"])
    })
}

fn sub_to_add() -> FnRule<impl Fn(&mut Graph, &MatchResult, &mut Fired) -> Option<crate::ExprId>> {
    let pattern = Pattern::op(Op::Binary(BinaryOp::Sub), [Pattern::var("a"), Pattern::var("b")]);
    FnRule::new("sub_to_add", pattern, |g: &mut Graph, m: &MatchResult, fired: &mut Fired| {
        *fired += 1;
        let negated = g.call(Op::Unary(UnaryOp::Neg), [m["b"]]);
        Some(g.call(Op::Binary(BinaryOp::Add), [m["a"], negated]))
    })
}

#[test]
fn test_rewrite_reaches_fixed_point() {
    let mut g = Graph::new();
    let x = g.var("x", f32_tensor(&[4]));
    let mut root = x;
    for _ in 0..4 {
        root = g.call(Op::Unary(UnaryOp::Neg), [root]);
    }
    let rules: RuleSet<Fired> = vec![Box::new(double_negation())];
    let mut fired = 0;

    assert_eq!(graph_rewrite(&mut g, root, &rules, &mut fired).unwrap(), x);
    assert_eq!(fired, 2);
}

#[test]
fn test_fresh_nodes_of_a_replacement_are_rewritten() {
    let mut g = Graph::new();
    let x = g.var("x", f32_tensor(&[4]));
    let y = g.var("y", f32_tensor(&[4]));
    let neg_y = g.call(Op::Unary(UnaryOp::Neg), [y]);
    let sub = g.call(Op::Binary(BinaryOp::Sub), [x, neg_y]);
    let rules: RuleSet<Fired> = vec![Box::new(sub_to_add()), Box::new(double_negation())];

    let result = graph_rewrite(&mut g, sub, &rules, &mut 0).unwrap();
    match g.node(result) {
        Node::Call { op: Op::Binary(BinaryOp::Add), args } => assert_eq!(args.as_slice(), &[x, y]),
        other => panic!("expected add(x, y), got {other:?}"),
    }
}

#[test]
fn test_shared_operands_rewritten_once() {
    let mut g = Graph::new();
    let x = g.var("x", f32_tensor(&[4]));
    let inner = g.call(Op::Unary(UnaryOp::Neg), [x]);
    let shared = g.call(Op::Unary(UnaryOp::Neg), [inner]);
    let root = g.call(Op::Binary(BinaryOp::Add), [shared, shared]);
    let rules: RuleSet<Fired> = vec![Box::new(double_negation())];
    let mut fired = 0;

    let result = graph_rewrite(&mut g, root, &rules, &mut fired).unwrap();
    assert_eq!(fired, 1);
    assert_eq!(g.operands(result), &[x, x]);
}

#[test]
fn test_no_rule_keeps_root() {
    let mut g = Graph::new();
    let x = g.var("x", f32_tensor(&[4]));
    let root = g.call(Op::Unary(UnaryOp::Exp), [x]);
    let before = g.len();
    let rules: RuleSet<Fired> = vec![Box::new(double_negation())];

    assert_eq!(graph_rewrite(&mut g, root, &rules, &mut 0).unwrap(), root);
    assert_eq!(g.len(), before);
}

#[test]
fn test_endless_rule_reports_non_convergence() {
    let mut g = Graph::new();
    let x = g.var("x", f32_tensor(&[4]));
    let root = g.call(Op::Unary(UnaryOp::Exp), [x]);
    let pattern = Pattern::op(Op::Unary(UnaryOp::Exp), [Pattern::var("a")]);
    let rules: RuleSet = vec![Box::new(FnRule::new("rebuild", pattern, |g: &mut Graph, m: &MatchResult, _: &mut ()| {
        Some(g.call(Op::Unary(UnaryOp::Exp), [m["a"]]))
    }))];

    let err = graph_rewrite(&mut g, root, &rules, &mut ()).unwrap_err();
    assert!(matches!(err, Error::RewriteDidNotConverge { id, .. } if id == root));
}

#[test]
fn test_collect_rewrites_lists_original_first() {
    let mut g = Graph::new();
    let x = g.var("x", f32_tensor(&[4]));
    let y = g.var("y", f32_tensor(&[4]));
    let sub = g.call(Op::Binary(BinaryOp::Sub), [x, y]);
    let rules: RuleSet<Fired> = vec![Box::new(sub_to_add()), Box::new(double_negation())];

    let alternatives = collect_rewrites(&mut g, sub, &rules, &mut 0);
    assert_eq!(alternatives.len(), 2);
    assert_eq!(alternatives[0], sub);
    assert!(matches!(g.node(alternatives[1]), Node::Call { op: Op::Binary(BinaryOp::Add), .. }));
}

#[test]
fn test_dce_removes_unreachable_nodes() {
    let mut g = Graph::new();
    let x = g.var("x", f32_tensor(&[4]));
    let inner = g.call(Op::Unary(UnaryOp::Neg), [x]);
    let root = g.call(Op::Unary(UnaryOp::Neg), [inner]);
    let rules: RuleSet<Fired> = vec![Box::new(double_negation())];

    let result = graph_rewrite(&mut g, root, &rules, &mut 0).unwrap();
    assert_eq!(dce(&mut g, &[result]), 2);
    assert!(g.is_alive(x));
    assert!(!g.is_alive(root));
    assert_eq!(dce(&mut g, &[result]), 0);
}
