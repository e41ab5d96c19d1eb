//! Folding of redundant boxing chains left over after extraction.

use strata_ir::{ExprId, FnRule, Graph, MatchResult, Pattern, RuleSet};

type Replace = fn(&mut Graph, &MatchResult, &mut ()) -> Option<ExprId>;

/// `boxing(x)` whose target is already the type of `x` -> `x`.
pub fn fold_nop_boxing() -> FnRule<Replace> {
    let replace: Replace = |g, m, _| (g.ty(m["x"]) == g.ty(m["boxing"])).then(|| m["x"]);
    FnRule::new("fold_nop_boxing", Pattern::boxing(Pattern::var("x")).named("boxing"), replace)
}

/// `boxing(boxing(x))` ending at the type of `x` -> `x`.
pub fn fold_boxing_round_trip() -> FnRule<Replace> {
    let replace: Replace = |g, m, _| (g.ty(m["x"]) == g.ty(m["outer"])).then(|| m["x"]);
    FnRule::new("fold_boxing_round_trip", Pattern::boxing(Pattern::boxing(Pattern::var("x"))).named("outer"), replace)
}

pub fn boxing_cleanup() -> RuleSet {
    vec![Box::new(fold_nop_boxing()), Box::new(fold_boxing_round_trip())]
}
