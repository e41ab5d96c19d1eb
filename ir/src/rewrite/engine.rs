//! Bottom-up fixed-point rewriting.
//!
//! Nodes are visited in post-order. Each node is first rebuilt over the rewritten
//! operands, then the rule set is applied until no rule fires. A replacement may contain
//! fresh nodes; those are normalized the same way before the replacement itself is
//! rewritten further. Results are memoized by `ExprId`, so shared operands are rewritten
//! once.

use std::collections::{HashMap, HashSet};

use smallvec::SmallVec;
use tracing::{debug, trace, warn};

use super::RewriteRule;
use crate::error::{Result, RewriteDidNotConvergeSnafu};
use crate::expr::{ExprId, Graph};
use crate::tree::render_tree;

/// Rule applications allowed on a single node before giving up.
const MAX_ITERATIONS: usize = 1000;

struct RewriteEngine<'a, C> {
    graph: &'a mut Graph,
    rules: &'a [Box<dyn RewriteRule<C>>],
    ctx: &'a mut C,
    /// Original node -> fully rewritten node.
    results: HashMap<ExprId, ExprId>,
}

impl<C> RewriteEngine<'_, C> {
    fn resolve(&self, id: ExprId) -> ExprId {
        self.results.get(&id).copied().unwrap_or(id)
    }

    fn apply_rules(&mut self, id: ExprId) -> Option<ExprId> {
        for rule in self.rules {
            if let Some(replacement) = rule.try_rewrite(self.graph, id, self.ctx)
                && replacement != id
            {
                trace!(rule = rule.name(), from = %id, to = %replacement, "rewrite.fire");
                return Some(replacement);
            }
        }
        None
    }

    fn rebuild(&mut self, id: ExprId) -> ExprId {
        let operands: SmallVec<[ExprId; 4]> = self.graph.operands(id).iter().map(|&op| self.resolve(op)).collect();
        self.graph.with_operands(id, &operands)
    }

    fn normalize_fresh(&mut self, root: ExprId) -> Result<()> {
        for id in self.graph.post_order(&[root]) {
            if id != root && !self.results.contains_key(&id) {
                self.rewrite_node(id)?;
            }
        }
        Ok(())
    }

    fn rewrite_node(&mut self, original: ExprId) -> Result<ExprId> {
        let mut current = self.rebuild(original);
        for _ in 0..MAX_ITERATIONS {
            let Some(next) = self.apply_rules(current) else {
                self.results.insert(original, current);
                self.results.insert(current, current);
                return Ok(current);
            };
            self.normalize_fresh(next)?;
            current = self.rebuild(next);
        }
        RewriteDidNotConvergeSnafu { id: original, iterations: MAX_ITERATIONS }.fail()
    }
}

/// Rewrites the DAG rooted at `root` with `rules` until no rule applies anywhere.
///
/// Returns the new root. Untouched subtrees are shared with the input.
#[tracing::instrument(skip_all, fields(root = %root, rules = rules.len()))]
pub fn graph_rewrite<C>(
    graph: &mut Graph,
    root: ExprId,
    rules: &[Box<dyn RewriteRule<C>>],
    ctx: &mut C,
) -> Result<ExprId> {
    let order = graph.post_order(&[root]);
    let mut engine = RewriteEngine { graph, rules, ctx, results: HashMap::new() };
    for id in order {
        if !engine.results.contains_key(&id) {
            engine.rewrite_node(id)?;
        }
    }
    let result = engine.resolve(root);
    debug!(%result, "graph_rewrite.done");
    trace!(tree = %render_tree(engine.graph, result), "graph_rewrite.tree");
    Ok(result)
}

/// Every single-step alternative for `expr`, the original first.
pub fn collect_rewrites<C>(
    graph: &mut Graph,
    expr: ExprId,
    rules: &[Box<dyn RewriteRule<C>>],
    ctx: &mut C,
) -> Vec<ExprId> {
    let mut alternatives = vec![expr];
    for rule in rules {
        if let Some(replacement) = rule.try_rewrite(graph, expr, ctx)
            && !alternatives.contains(&replacement)
        {
            alternatives.push(replacement);
        }
    }
    alternatives
}

/// Marks every live node unreachable from `roots` as dead. Returns how many were removed.
pub fn dce(graph: &mut Graph, roots: &[ExprId]) -> usize {
    let reachable: HashSet<ExprId> = graph.post_order(roots).into_iter().collect();
    let dead: Vec<ExprId> =
        graph.iter().filter(|(id, data)| data.is_alive() && !reachable.contains(id)).map(|(id, _)| id).collect();
    for &id in &dead {
        if let Err(error) = graph.mark_dead(id) {
            warn!(%id, %error, "dce.mark_dead");
        }
    }
    debug!(removed = dead.len(), "dce.done");
    dead.len()
}
